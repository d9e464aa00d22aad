//! Applies a [`HeaderSpec`] to a [`RawSheet`].

use tracing::{debug, info, instrument};

use crate::model::{CellValue, ColumnBinding, ColumnRole, HeaderSpec, RawSheet, RoleCell, SheetRow};

/// Turns the rows below the header into role-tagged rows.
///
/// Numeric roles are coerced; an area that cannot be parsed is kept as an
/// `Other` cell under its label instead of raising. Rows without any value
/// and repeated header rows (page breaks in printed exports) are dropped.
#[instrument(level = "info", skip_all, fields(source = %sheet.source, header_row = spec.header_row_index))]
pub fn load(sheet: &RawSheet, spec: &HeaderSpec) -> Vec<SheetRow> {
    let mut rows = Vec::new();
    let mut repeated_headers = 0;

    for row_index in (spec.header_row_index + 1)..sheet.rows.len() {
        let raw = sheet.row(row_index);
        let cells: Vec<RoleCell> = spec
            .columns
            .iter()
            .filter_map(|binding| {
                let value = raw.get(binding.index)?.as_ref()?;
                coerce(binding, value)
            })
            .collect();

        if cells.is_empty() {
            continue;
        }
        if cells.iter().all(is_header_echo) {
            repeated_headers += 1;
            continue;
        }
        rows.push(SheetRow { row_index, cells });
    }

    if repeated_headers > 0 {
        debug!(repeated_headers, "skipped repeated header rows");
    }
    info!(rows = rows.len(), "loaded data rows");
    rows
}

fn coerce(binding: &ColumnBinding, value: &CellValue) -> Option<RoleCell> {
    let cell = |role: ColumnRole, value: CellValue| RoleCell {
        role,
        label: binding.label.clone(),
        rank: binding.rank,
        value,
    };

    match binding.role {
        ColumnRole::Area => Some(match value.as_f64() {
            Some(area) => cell(ColumnRole::Area, CellValue::Float(area)),
            None => RoleCell {
                role: ColumnRole::Other,
                label: binding.label.clone(),
                rank: usize::MAX,
                value: value.clone(),
            },
        }),
        ColumnRole::RoomTypeCode => match value.as_i64() {
            Some(code) => Some(cell(ColumnRole::RoomTypeCode, CellValue::Int(code))),
            None => value
                .as_text()
                .map(|text| cell(ColumnRole::RoomTypeCode, CellValue::Text(text))),
        },
        ColumnRole::RoomNumber | ColumnRole::RoomName | ColumnRole::Floor => value
            .as_text()
            .map(|text| cell(binding.role, CellValue::Text(text))),
        ColumnRole::Other => (!value.is_blank()).then(|| cell(ColumnRole::Other, value.clone())),
    }
}

fn is_header_echo(cell: &RoleCell) -> bool {
    matches!(&cell.value, CellValue::Text(text) if *text == cell.label)
}
