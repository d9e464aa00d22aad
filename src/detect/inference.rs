//! Boundary to the external structure-inference collaborator.
//!
//! The collaborator only ever sees a bounded [`SheetExcerpt`] and its answer is
//! treated as untrusted input: [`InferredStructure::into_header_spec`] checks
//! it against the sheet before anything downstream uses it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::synonyms;
use crate::model::{ColumnBinding, ColumnRole, DetectionMethod, HeaderSpec, RawSheet};

/// Longest cell text forwarded to the collaborator.
const MAX_CELL_CHARS: usize = 60;

/// Collision rank for roles assigned by the collaborator to labels the
/// synonym table does not know; they lose against any known synonym.
const INFERRED_RANK_BASE: usize = 1_000;

/// Failure modes of a structure-inference call.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// No collaborator is configured (e.g. missing API key).
    #[error("structure inference is unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within the configured timeout.
    #[error("structure inference timed out after {0}s")]
    Timeout(u64),

    /// The service answered with a non-success status.
    #[error("structure inference service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport failure before a response was received.
    #[error("structure inference request failed: {0}")]
    Network(String),

    /// The answer could not be parsed or does not fit the sheet.
    #[error("malformed structure inference response: {0}")]
    Malformed(String),
}

/// Capability to infer the header row and column roles of a sheet.
pub trait StructureInference: Send + Sync {
    fn detect_structure(&self, excerpt: &SheetExcerpt) -> Result<InferredStructure, InferenceError>;
}

/// Text rendering of the top-left corner of a sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetExcerpt {
    pub source: String,
    pub sheet_name: String,
    /// Rows as displayed text; index 0 is sheet row 0.
    pub rows: Vec<Vec<String>>,
}

impl SheetExcerpt {
    /// Renders at most `max_rows` × `max_columns` cells of the sheet.
    pub fn from_sheet(sheet: &RawSheet, max_rows: usize, max_columns: usize) -> Self {
        let rows = sheet
            .rows
            .iter()
            .take(max_rows)
            .map(|row| {
                row.iter()
                    .take(max_columns)
                    .map(|cell| {
                        cell.as_ref()
                            .map(|value| value.to_string().chars().take(MAX_CELL_CHARS).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        Self {
            source: sheet.source.clone(),
            sheet_name: sheet.sheet_name.clone(),
            rows,
        }
    }

    /// Tab-separated rendering with row numbers, as sent in prompts.
    pub fn to_text(&self) -> String {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| format!("{index}\t{}", row.join("\t")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Answer of the collaborator: a header row and raw label → role names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredStructure {
    pub header_row_index: usize,
    #[serde(default)]
    pub column_roles: BTreeMap<String, String>,
}

impl InferredStructure {
    /// Validates the answer against the sheet it was asked about.
    ///
    /// The header row must exist inside the excerpt, every labelled column
    /// must exist in that row, and every role name must be known. Labels the
    /// collaborator left out fall back to synonym matching.
    pub fn into_header_spec(
        self,
        sheet: &RawSheet,
        excerpt: &SheetExcerpt,
    ) -> Result<HeaderSpec, InferenceError> {
        if self.header_row_index >= excerpt.rows.len() {
            return Err(InferenceError::Malformed(format!(
                "header row {} lies outside the {} excerpt rows",
                self.header_row_index,
                excerpt.rows.len()
            )));
        }

        let mut roles: BTreeMap<String, ColumnRole> = BTreeMap::new();
        for (label, role_name) in &self.column_roles {
            let role = ColumnRole::parse(role_name).ok_or_else(|| {
                InferenceError::Malformed(format!("unknown role '{role_name}' for '{label}'"))
            })?;
            roles.insert(label.trim().to_string(), role);
        }

        let header_cells = sheet.row(self.header_row_index);
        for label in roles.keys() {
            let present = header_cells.iter().flatten().any(|cell| {
                cell.as_text().is_some_and(|text| text == *label)
            });
            if !present {
                return Err(InferenceError::Malformed(format!(
                    "label '{label}' is not in header row {}",
                    self.header_row_index
                )));
            }
        }

        let mut columns = header_columns(sheet, self.header_row_index);
        for binding in &mut columns {
            if let Some(role) = roles.get(&binding.label) {
                if binding.role != *role {
                    binding.role = *role;
                    binding.rank = INFERRED_RANK_BASE + binding.index;
                }
            }
        }

        if !columns.iter().any(|binding| binding.role != ColumnRole::Other) {
            return Err(InferenceError::Malformed(
                "no column was assigned a canonical role".into(),
            ));
        }

        let recognised = columns
            .iter()
            .filter(|binding| binding.role != ColumnRole::Other)
            .count();
        let confidence = recognised as f64 / columns.len().max(1) as f64;

        Ok(HeaderSpec {
            header_row_index: self.header_row_index,
            columns,
            method: DetectionMethod::Inferred,
            confidence,
        })
    }
}

/// Builds synonym-based bindings for every column of a header row. Blank
/// header cells get a positional placeholder label.
pub fn header_columns(sheet: &RawSheet, header_row: usize) -> Vec<ColumnBinding> {
    let width = sheet
        .rows
        .iter()
        .skip(header_row)
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let header = sheet.row(header_row);

    (0..width)
        .map(|index| {
            let label = header
                .get(index)
                .and_then(|cell| cell.as_ref())
                .and_then(|value| value.as_text())
                .unwrap_or_else(|| format!("column_{}", index + 1));
            let (role, rank) = synonyms::role_for(&label);
            ColumnBinding {
                index,
                label,
                role,
                rank,
            }
        })
        .collect()
}
