//! Workbook adapters: reading raw exports and writing analysis results.

pub mod excel_read;
pub mod excel_write;
