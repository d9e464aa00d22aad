use std::path::Path;

use rust_xlsxwriter::{Table, Workbook, Worksheet};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{CellValue, EstimateBasis, TypeOrigin};
use crate::pipeline::{Analysis, EstimationOutcome, MergeOutcome};

pub const MERGED_SHEET: &str = "Merged Data";
pub const ESTIMATES_SHEET: &str = "Estimates";
pub const ROOM_TYPES_SHEET: &str = "Room Types";

/// Writes the merged rooms of step one.
pub fn write_merged(path: &Path, merge: &MergeOutcome) -> Result<()> {
    let mut workbook = Workbook::new();
    add_merged_sheet(&mut workbook, merge)?;
    workbook.save(path)?;
    Ok(())
}

/// Writes the merged rooms, the per-room estimates, and the room-type
/// breakdown.
#[instrument(level = "info", skip_all, fields(output = %path.display()))]
pub fn write_analysis(path: &Path, analysis: &Analysis) -> Result<()> {
    let mut workbook = build_analysis(analysis)?;
    workbook.save(path)?;
    Ok(())
}

/// In-memory variant of [`write_analysis`].
pub fn analysis_to_buffer(analysis: &Analysis) -> Result<Vec<u8>> {
    let mut workbook = build_analysis(analysis)?;
    Ok(workbook.save_to_buffer()?)
}

fn build_analysis(analysis: &Analysis) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    add_merged_sheet(&mut workbook, &analysis.merge)?;
    add_estimates_sheet(&mut workbook, &analysis.merge, &analysis.estimation)?;
    add_room_types_sheet(&mut workbook, &analysis.estimation)?;
    Ok(workbook)
}

fn add_merged_sheet(workbook: &mut Workbook, merge: &MergeOutcome) -> Result<()> {
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(MERGED_SHEET)?;
    write_table(worksheet, &merge.table.columns, &merge.table.rows)?;
    debug!(rows = merge.table.rows.len(), "merged sheet written");
    Ok(())
}

fn add_estimates_sheet(
    workbook: &mut Workbook,
    merge: &MergeOutcome,
    estimation: &EstimationOutcome,
) -> Result<()> {
    let columns = [
        "RoomNumber",
        "RoomName",
        "RoomTypeCode",
        "RoomType",
        "TypeOrigin",
        "TypeConfidence",
        "Area",
        "AreaAssumed",
        "HeatingWPerM2",
        "CoolingWPerM2",
        "HeatingW",
        "CoolingW",
        "Basis",
    ]
    .map(String::from);

    let rows: Vec<Vec<Option<CellValue>>> = merge
        .rooms
        .iter()
        .zip(&merge.assignments)
        .zip(&estimation.estimates)
        .map(|((room, assignment), estimate)| {
            vec![
                Some(text(room.key.to_string())),
                room.room_name().map(text),
                Some(CellValue::Int(i64::from(assignment.room_type_code))),
                Some(text(assignment.label.clone())),
                Some(text(origin_name(assignment.origin))),
                Some(CellValue::Float(assignment.confidence)),
                Some(CellValue::Float(estimate.area_m2)),
                Some(text(if estimate.area_assumed { "yes" } else { "no" })),
                Some(CellValue::Float(estimate.heating_w_per_m2)),
                Some(CellValue::Float(estimate.cooling_w_per_m2)),
                Some(CellValue::Float(estimate.heating_w())),
                Some(CellValue::Float(estimate.cooling_w())),
                Some(text(match estimate.basis {
                    EstimateBasis::Lookup => "lookup",
                    EstimateBasis::Fallback => "fallback",
                })),
            ]
        })
        .collect();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(ESTIMATES_SHEET)?;
    write_table(worksheet, &columns, &rows)
}

fn add_room_types_sheet(workbook: &mut Workbook, estimation: &EstimationOutcome) -> Result<()> {
    let columns = [
        "RoomType",
        "RoomTypeCode",
        "Rooms",
        "Area",
        "HeatingWPerM2",
        "CoolingWPerM2",
        "SharePercent",
    ]
    .map(String::from);

    let rows: Vec<Vec<Option<CellValue>>> = estimation
        .report
        .breakdown
        .iter()
        .map(|group| {
            vec![
                Some(text(group.room_type.clone())),
                Some(CellValue::Int(i64::from(group.room_type_code))),
                Some(CellValue::Int(group.room_count as i64)),
                Some(CellValue::Float(group.area_m2)),
                Some(CellValue::Float(group.w_per_m2)),
                Some(CellValue::Float(group.cooling_w_per_m2)),
                Some(CellValue::Float(group.share_percent)),
            ]
        })
        .collect();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(ROOM_TYPES_SHEET)?;
    write_table(worksheet, &columns, &rows)
}

fn write_table(
    worksheet: &mut Worksheet,
    columns: &[String],
    rows: &[Vec<Option<CellValue>>],
) -> Result<()> {
    for (col_idx, header) in columns.iter().enumerate() {
        worksheet.write_string(0, col_idx as u16, header)?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        let sheet_row = (row_idx + 1) as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let col = col_idx as u16;
            match cell {
                Some(CellValue::Int(value)) => {
                    worksheet.write_number(sheet_row, col, *value as f64)?;
                }
                Some(CellValue::Float(value)) => {
                    worksheet.write_number(sheet_row, col, *value)?;
                }
                Some(CellValue::Text(value)) => {
                    worksheet.write_string(sheet_row, col, value)?;
                }
                None => {}
            }
        }
    }

    let mut excel_table = Table::new();
    excel_table.set_autofilter(true);
    let col_end = (columns.len() as u16).saturating_sub(1);
    let row_end = if rows.is_empty() { 1 } else { rows.len() as u32 };
    worksheet.add_table(0, 0, row_end, col_end, &excel_table)?;
    Ok(())
}

fn text(value: impl Into<String>) -> CellValue {
    CellValue::Text(value.into())
}

fn origin_name(origin: TypeOrigin) -> &'static str {
    match origin {
        TypeOrigin::FromSource => "source",
        TypeOrigin::FromClassifier => "classifier",
        TypeOrigin::Unresolved => "unresolved",
    }
}
