use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{DataType, Range, Reader, Xls, Xlsx};
use tracing::{debug, instrument};

use crate::error::{Result, ToolError};
use crate::model::{CellValue, RawSheet};

/// Workbook container formats accepted for the two exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// Office Open XML, including macro-enabled `.xlsm` files.
    Xlsx,
    /// Legacy BIFF `.xls` files.
    Xls,
}

impl WorkbookFormat {
    /// Resolves the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "xlsx" | "xlsm" => Ok(WorkbookFormat::Xlsx),
            "xls" => Ok(WorkbookFormat::Xls),
            _ => Err(ToolError::UnsupportedFileType(name.to_string())),
        }
    }
}

/// Reads a worksheet from an in-memory workbook. `name` identifies the export
/// and decides the container format. When `sheet` is `None` the first sheet
/// with any content is used.
#[instrument(level = "debug", skip(bytes), fields(size = bytes.len()))]
pub fn read_raw_sheet(name: &str, bytes: &[u8], sheet: Option<&str>) -> Result<RawSheet> {
    let cursor = Cursor::new(bytes);
    match WorkbookFormat::from_file_name(name)? {
        WorkbookFormat::Xlsx => {
            let mut workbook: Xlsx<_> = Xlsx::new(cursor)?;
            read_sheet(&mut workbook, name, sheet)
        }
        WorkbookFormat::Xls => {
            let mut workbook: Xls<_> = Xls::new(cursor)?;
            read_sheet(&mut workbook, name, sheet)
        }
    }
}

/// Reads a worksheet from a workbook on disk.
pub fn read_raw_sheet_from_path(path: &Path, sheet: Option<&str>) -> Result<RawSheet> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    read_raw_sheet(&name, &bytes, sheet)
}

fn read_sheet<RS, R>(workbook: &mut R, source: &str, sheet: Option<&str>) -> Result<RawSheet>
where
    RS: Read + Seek,
    R: Reader<RS>,
    ToolError: From<R::Error>,
{
    if let Some(name) = sheet {
        let range = read_required_sheet(workbook, name)?;
        return Ok(range_to_sheet(source, name, &range));
    }

    let sheet_names = workbook.sheet_names().to_vec();
    for name in &sheet_names {
        let range = read_required_sheet(workbook, name)?;
        if range.used_cells().any(|(_, _, cell)| !matches!(cell, DataType::Empty)) {
            debug!(sheet = %name, "selected first non-empty sheet");
            return Ok(range_to_sheet(source, name, &range));
        }
    }

    Err(ToolError::InvalidWorkbook(format!(
        "{source} contains no non-empty sheet"
    )))
}

fn read_required_sheet<RS, R>(workbook: &mut R, name: &str) -> Result<Range<DataType>>
where
    RS: Read + Seek,
    R: Reader<RS>,
    ToolError: From<R::Error>,
{
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

fn range_to_sheet(source: &str, sheet_name: &str, range: &Range<DataType>) -> RawSheet {
    let (start_row, start_col) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Option<CellValue>>> = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut cells: Vec<Option<CellValue>> = vec![None; start_col];
        cells.extend(row.iter().map(cell_value));
        while matches!(cells.last(), Some(None)) {
            cells.pop();
        }
        rows.push(cells);
    }

    RawSheet::new(source, sheet_name, rows)
}

fn cell_value(cell: &DataType) -> Option<CellValue> {
    match cell {
        DataType::Empty | DataType::Error(_) => None,
        DataType::Int(value) => Some(CellValue::Int(*value)),
        DataType::Float(value) => Some(CellValue::Float(*value)),
        DataType::String(value) if value.trim().is_empty() => None,
        DataType::String(value) => Some(CellValue::Text(value.trim().to_string())),
        DataType::Bool(value) => Some(CellValue::Text(value.to_string())),
        other => Some(CellValue::Text(other.to_string())),
    }
}
