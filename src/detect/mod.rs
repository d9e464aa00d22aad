//! Header-row and column-role detection for human-authored exports.
//!
//! Exports start with an unknown number of title, project, and legend rows
//! before the real header. The heuristic scores the leading rows by how many
//! of their cells are known header synonyms; ambiguous sheets are escalated to
//! an optional [`StructureInference`] collaborator.

pub mod gemini;
pub mod inference;
pub mod synonyms;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::DetectionSettings;
use crate::error::{Result, ToolError};
use crate::model::{CellValue, ColumnRole, DetectionMethod, HeaderSpec, RawSheet};

pub use inference::{
    InferenceError, InferredStructure, SheetExcerpt, StructureInference, header_columns,
};

const TIE_EPSILON: f64 = 1e-9;

/// Score of one row as a header candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCandidate {
    pub row: usize,
    /// Share of the row's filled cells that are known header synonyms.
    pub ratio: f64,
    /// Number of distinct canonical roles recognised in the row.
    pub roles: usize,
}

/// Caller-side knobs for a single detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectOptions {
    /// Header row declared by the caller; skips heuristic and inference.
    pub declared_header_row: Option<usize>,
    /// Whether ambiguous sheets may be escalated to the collaborator.
    pub auto_detect: bool,
}

/// Locates the header row and column roles of a [`RawSheet`].
#[derive(Clone)]
pub struct StructureDetector {
    settings: DetectionSettings,
    inference: Option<Arc<dyn StructureInference>>,
}

impl StructureDetector {
    pub fn new(settings: DetectionSettings, inference: Option<Arc<dyn StructureInference>>) -> Self {
        Self {
            settings,
            inference,
        }
    }

    /// Produces the header specification for `sheet`.
    #[instrument(level = "info", skip_all, fields(source = %sheet.source, sheet = %sheet.sheet_name))]
    pub fn detect(&self, sheet: &RawSheet, options: DetectOptions) -> Result<HeaderSpec> {
        if let Some(row) = options.declared_header_row {
            return self.declared(sheet, row);
        }

        let candidates = score_rows(sheet, &self.settings);
        let best_ratio = candidates
            .iter()
            .map(|candidate| candidate.ratio)
            .fold(0.0_f64, f64::max);
        let top: Vec<&HeaderCandidate> = candidates
            .iter()
            .filter(|candidate| best_ratio - candidate.ratio < TIE_EPSILON)
            .collect();
        let confident = !top.is_empty() && best_ratio >= self.settings.min_confidence;
        debug!(
            candidates = candidates.len(),
            best_ratio,
            tied = top.len(),
            "scored header candidates"
        );

        if confident && top.len() == 1 {
            let row = top[0].row;
            info!(header_row = row, confidence = best_ratio, "header row detected");
            return Ok(build_spec(sheet, row, DetectionMethod::Heuristic, best_ratio));
        }

        if let (true, Some(inference)) = (options.auto_detect, self.inference.as_ref()) {
            warn!(best_ratio, tied = top.len(), "header ambiguous, escalating to structure inference");
            return self.infer(sheet, inference.as_ref());
        }

        if confident {
            let row = top[0].row;
            warn!(header_row = row, tied = top.len(), "header rows tie, using the earliest");
            return Ok(build_spec(sheet, row, DetectionMethod::Heuristic, best_ratio));
        }

        Err(ToolError::StructureDetection {
            file: sheet.source.clone(),
            reason: format!(
                "no header row among the first {} rows reached confidence {:.2} (best {:.2}) \
                 and structure inference is not available",
                self.settings.scan_rows, self.settings.min_confidence, best_ratio
            ),
        })
    }

    fn declared(&self, sheet: &RawSheet, row: usize) -> Result<HeaderSpec> {
        if row >= sheet.rows.len() {
            return Err(ToolError::StructureDetection {
                file: sheet.source.clone(),
                reason: format!(
                    "declared header row {row} is past the last row ({})",
                    sheet.rows.len()
                ),
            });
        }
        let ratio = row_score(sheet, row).map(|(ratio, _)| ratio).unwrap_or(0.0);
        info!(header_row = row, "using declared header row");
        Ok(build_spec(sheet, row, DetectionMethod::Declared, ratio))
    }

    fn infer(&self, sheet: &RawSheet, inference: &dyn StructureInference) -> Result<HeaderSpec> {
        let excerpt = SheetExcerpt::from_sheet(
            sheet,
            self.settings.excerpt_rows,
            self.settings.excerpt_columns,
        );
        let spec = inference
            .detect_structure(&excerpt)
            .and_then(|answer| answer.into_header_spec(sheet, &excerpt))
            .map_err(|err| ToolError::StructureDetection {
                file: sheet.source.clone(),
                reason: err.to_string(),
            })?;
        info!(header_row = spec.header_row_index, "header row inferred");
        Ok(spec)
    }
}

/// Scores the leading rows of a sheet as header candidates. Rows with fewer
/// than `min_roles` distinct recognised roles are not candidates.
pub fn score_rows(sheet: &RawSheet, settings: &DetectionSettings) -> Vec<HeaderCandidate> {
    (0..sheet.rows.len().min(settings.scan_rows))
        .filter_map(|row| {
            let (ratio, roles) = row_score(sheet, row)?;
            (roles >= settings.min_roles).then_some(HeaderCandidate { row, ratio, roles })
        })
        .collect()
}

fn row_score(sheet: &RawSheet, row: usize) -> Option<(f64, usize)> {
    let filled = sheet.filled_cells(row);
    if filled == 0 {
        return None;
    }

    let mut matched = 0;
    let mut roles = BTreeSet::new();
    for cell in sheet.row(row).iter().flatten() {
        let CellValue::Text(text) = cell else {
            continue;
        };
        if let Some(found) = synonyms::match_label(text) {
            matched += 1;
            roles.insert(found.role);
        }
    }
    roles.remove(&ColumnRole::Other);

    Some((matched as f64 / filled as f64, roles.len()))
}

fn build_spec(sheet: &RawSheet, row: usize, method: DetectionMethod, confidence: f64) -> HeaderSpec {
    HeaderSpec {
        header_row_index: row,
        columns: header_columns(sheet, row),
        method,
        confidence,
    }
}
