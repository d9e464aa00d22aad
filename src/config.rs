//! Pipeline configuration.
//!
//! Every section has working defaults, so an empty TOML file (or no file at
//! all) yields the stock behaviour. Empty `room_types` or `reference` lists
//! select the built-in taxonomy and density table.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::{RoomType, RoomTypeTaxonomy};
use crate::error::{Result, ToolError};
use crate::estimate::{
    DEFAULT_AREA_M2, Density, FALLBACK_COOLING_W_PER_M2, FALLBACK_HEATING_W_PER_M2,
    ReferenceEntry, ReferenceTable,
};
use crate::report::{
    DEFAULT_BASELINE_FACTOR, DEFAULT_COOLING_HOURS, DEFAULT_HEATING_HOURS, DEFAULT_PRICE_PER_KWH,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detection: DetectionSettings,
    pub inference: InferenceSettings,
    pub classification: ClassificationSettings,
    pub estimation: EstimationSettings,
    pub report: ReportSettings,
}

/// Header heuristic knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Leading rows considered as header candidates.
    pub scan_rows: usize,
    /// Minimum share of recognised labels for a confident pick.
    pub min_confidence: f64,
    /// Minimum number of distinct roles a candidate row must show.
    pub min_roles: usize,
    /// Rows handed to the inference collaborator.
    pub excerpt_rows: usize,
    /// Columns handed to the inference collaborator.
    pub excerpt_columns: usize,
    /// Worksheet to read; the first non-empty sheet when unset.
    pub sheet: Option<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            scan_rows: 25,
            min_confidence: 0.34,
            min_roles: 2,
            excerpt_rows: 30,
            excerpt_columns: 40,
            sheet: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub enabled: bool,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationSettings {
    /// Keyword matches below this confidence leave the room unresolved.
    pub min_confidence: f64,
    pub room_types: Vec<RoomType>,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.55,
            room_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationSettings {
    pub default_area_m2: f64,
    pub fallback: Density,
    pub reference: Vec<ReferenceEntry>,
}

impl Default for EstimationSettings {
    fn default() -> Self {
        Self {
            default_area_m2: DEFAULT_AREA_M2,
            fallback: Density::new(FALLBACK_HEATING_W_PER_M2, FALLBACK_COOLING_W_PER_M2),
            reference: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub heating_hours: f64,
    pub cooling_hours: f64,
    pub baseline_factor: f64,
    pub price_per_kwh: f64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            heating_hours: DEFAULT_HEATING_HOURS,
            cooling_hours: DEFAULT_COOLING_HOURS,
            baseline_factor: DEFAULT_BASELINE_FACTOR,
            price_per_kwh: DEFAULT_PRICE_PER_KWH,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let detection = &self.detection;
        if detection.scan_rows == 0 {
            return invalid("detection.scan_rows must be at least 1");
        }
        if detection.min_roles == 0 {
            return invalid("detection.min_roles must be at least 1");
        }
        if !(0.0..=1.0).contains(&detection.min_confidence) {
            return invalid("detection.min_confidence must lie in [0, 1]");
        }
        if detection.excerpt_rows == 0 || detection.excerpt_columns == 0 {
            return invalid("detection excerpt must have at least one row and column");
        }
        if self.inference.timeout_secs == 0 {
            return invalid("inference.timeout_secs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.classification.min_confidence) {
            return invalid("classification.min_confidence must lie in [0, 1]");
        }
        let area = self.estimation.default_area_m2;
        if !area.is_finite() || area <= 0.0 {
            return invalid("estimation.default_area_m2 must be positive");
        }
        if let Some(problem) = self.reference_table().validate() {
            return Err(ToolError::InvalidConfig(problem));
        }

        let report = &self.report;
        for (name, value) in [
            ("report.heating_hours", report.heating_hours),
            ("report.cooling_hours", report.cooling_hours),
            ("report.price_per_kwh", report.price_per_kwh),
        ] {
            non_negative(name, value)?;
        }
        if !report.baseline_factor.is_finite() || report.baseline_factor <= 1.0 {
            return invalid("report.baseline_factor must be greater than 1");
        }
        Ok(())
    }

    pub fn taxonomy(&self) -> RoomTypeTaxonomy {
        if self.classification.room_types.is_empty() {
            RoomTypeTaxonomy::default()
        } else {
            RoomTypeTaxonomy::new(self.classification.room_types.clone())
        }
    }

    pub fn reference_table(&self) -> ReferenceTable {
        if self.estimation.reference.is_empty() {
            ReferenceTable::default().with_fallback(self.estimation.fallback)
        } else {
            ReferenceTable::from_entries(&self.estimation.reference, self.estimation.fallback)
        }
    }
}

/// Checks an energy price given per request rather than in the file.
pub fn validate_price(price_per_kwh: f64) -> Result<()> {
    non_negative("price_per_kwh", price_per_kwh)
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ToolError::InvalidConfig(format!(
            "{name} must be finite and not negative"
        )))
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(ToolError::InvalidConfig(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = PipelineConfig::from_toml_str("").expect("defaults parse");
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.taxonomy().types().len(), 21);
        assert!(config.reference_table().get(18).is_some());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [report]
            price_per_kwh = 0.42

            [[estimation.reference]]
            code = 1
            heating_w_per_m2 = 50.0
            cooling_w_per_m2 = 20.0
            "#,
        )
        .expect("config parses");
        assert_eq!(config.report.price_per_kwh, 0.42);
        assert_eq!(config.report.heating_hours, DEFAULT_HEATING_HOURS);
        let table = config.reference_table();
        assert_eq!(table.get(1), Some(Density::new(50.0, 20.0)));
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = PipelineConfig::from_toml_str("[report]\nbaseline_factor = 0.5\n")
            .expect_err("factor below one");
        assert!(matches!(err, ToolError::InvalidConfig(_)));

        let err = PipelineConfig::from_toml_str(
            "[estimation.fallback]\nheating_w_per_m2 = -1.0\ncooling_w_per_m2 = 0.0\n",
        )
        .expect_err("negative fallback");
        assert!(matches!(err, ToolError::InvalidConfig(_)));
    }

    #[test]
    fn request_prices_must_be_finite_and_not_negative() {
        assert!(validate_price(0.0).is_ok());
        assert!(validate_price(0.42).is_ok());
        for price in [-0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(validate_price(price), Err(ToolError::InvalidConfig(_))));
        }
    }
}
