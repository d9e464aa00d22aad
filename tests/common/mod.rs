#![allow(dead_code)]

use roomplan_tools::model::{CellValue, RawSheet};
use roomplan_tools::pipeline::SourceFile;
use rust_xlsxwriter::Workbook;

/// Shorthand for a text cell.
pub fn t(value: &str) -> Option<CellValue> {
    Some(CellValue::Text(value.to_string()))
}

/// Shorthand for a numeric cell.
pub fn n(value: f64) -> Option<CellValue> {
    Some(CellValue::Float(value))
}

pub fn sheet(source: &str, rows: Vec<Vec<Option<CellValue>>>) -> RawSheet {
    RawSheet::new(source, "Tabelle1", rows)
}

/// Renders rows into an `.xlsx` workbook held in memory.
pub fn xlsx(rows: &[Vec<Option<CellValue>>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            let (row, col) = (row_idx as u32, col_idx as u16);
            match cell {
                Some(CellValue::Text(value)) => {
                    worksheet.write_string(row, col, value).expect("string written");
                }
                Some(CellValue::Float(value)) => {
                    worksheet.write_number(row, col, *value).expect("number written");
                }
                Some(CellValue::Int(value)) => {
                    worksheet.write_number(row, col, *value as f64).expect("number written");
                }
                None => {}
            }
        }
    }
    workbook.save_to_buffer().expect("workbook saved")
}

pub fn source(name: &str, rows: &[Vec<Option<CellValue>>]) -> SourceFile {
    SourceFile::new(name, xlsx(rows))
}

/// Heating export in the layout of the original tool: title block, blank
/// row, header, data.
pub fn heating_rows() -> Vec<Vec<Option<CellValue>>> {
    vec![
        vec![t("Raumliste Heizung")],
        vec![t("Projekt: Verwaltungsgebäude Nord")],
        vec![],
        vec![
            t("Geschoss"),
            t("Raum-Nr."),
            t("Raum-Bezeichnung"),
            t("Fläche [m²]"),
            t("Nummer Raumtyp"),
            t("Heizlast [W]"),
        ],
        vec![t("EG"), t("0.01"), t("Büro"), n(20.0), n(1.0), n(900.0)],
        vec![t("EG"), t("0.02"), t("Flur"), n(35.5), None, n(400.0)],
        vec![t("EG"), t("0.03"), t("WC Damen"), n(8.0), None, None],
        vec![t("OG"), None, t("Abstellkammer"), n(4.0), None, None],
    ]
}

/// Ventilation export with a shorter title block and different columns.
pub fn ventilation_rows() -> Vec<Vec<Option<CellValue>>> {
    vec![
        vec![t("Lüftung - Raumbuch")],
        vec![
            t("Raumnummer"),
            t("Raumname"),
            t("Flaeche"),
            t("Volumenstrom [m³/h]"),
        ],
        vec![t("0.01"), t("Einzelbüro"), n(21.0), n(120.0)],
        vec![t("0.03"), t("WC"), n(8.0), n(60.0)],
        vec![t("1.10"), t("Besprechungsraum"), n(30.0), n(450.0)],
    ]
}
