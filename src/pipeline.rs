use std::path::Path;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::classify::RoomTypeClassifier;
use crate::config::{self, PipelineConfig};
use crate::detect::{DetectOptions, StructureDetector, StructureInference};
use crate::error::{Result, ToolError};
use crate::estimate::PowerEstimator;
use crate::io::excel_read;
use crate::load;
use crate::merge::{self, JoinKind, MergedTable};
use crate::model::{HeaderSpec, MergedRoom, PowerEstimate, RoomTypeAssignment, SheetRow, SourceTag};
use crate::reconcile;
use crate::report::{self, AggregationReporter, ClassificationSummary, PortfolioReport, RoomMetrics};

/// One uploaded export: its file name (which decides the workbook format)
/// and its raw bytes.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, std::fs::read(path)?))
    }
}

/// Project name recorded when a request does not carry one.
pub const DEFAULT_PROJECT_NAME: &str = "Unnamed Project";

fn default_project_name() -> String {
    DEFAULT_PROJECT_NAME.to_string()
}

/// Inputs of step one.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub heating: SourceFile,
    pub ventilation: SourceFile,
    pub project_name: Option<String>,
    /// Header row applied to both exports, skipping detection.
    pub header_row: Option<usize>,
    /// Whether ambiguous headers may be escalated to structure inference.
    pub auto_detect: bool,
    pub how: JoinKind,
}

impl MergeRequest {
    pub fn new(heating: SourceFile, ventilation: SourceFile) -> Self {
        Self {
            heating,
            ventilation,
            project_name: None,
            header_row: None,
            auto_detect: true,
            how: JoinKind::Outer,
        }
    }
}

/// Result of step one: merged and typed rooms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    pub heating_file: String,
    pub ventilation_file: String,
    pub heating_header: HeaderSpec,
    pub ventilation_header: HeaderSpec,
    pub rooms: Vec<MergedRoom>,
    /// Index-aligned with `rooms`.
    pub assignments: Vec<RoomTypeAssignment>,
    pub table: MergedTable,
    pub metrics: RoomMetrics,
    pub classification: ClassificationSummary,
}

/// Result of step two for one energy price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationOutcome {
    /// Index-aligned with the rooms of the merge.
    pub estimates: Vec<PowerEstimate>,
    pub report: PortfolioReport,
}

/// Both steps in one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub merge: MergeOutcome,
    pub estimation: EstimationOutcome,
}

/// The reconciliation and estimation pipeline.
///
/// A pipeline owns its configuration and holds no per-request state, so one
/// instance can serve concurrent requests.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    detector: StructureDetector,
    classifier: RoomTypeClassifier,
    estimator: PowerEstimator,
    reporter: AggregationReporter,
}

impl Pipeline {
    /// Validates `config` and wires the components. `inference` is consulted
    /// only for ambiguous headers of requests that allow auto-detection.
    pub fn new(
        config: PipelineConfig,
        inference: Option<Arc<dyn StructureInference>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detector: StructureDetector::new(config.detection.clone(), inference),
            classifier: RoomTypeClassifier::new(
                config.taxonomy(),
                config.classification.min_confidence,
            ),
            estimator: PowerEstimator::new(
                config.reference_table(),
                config.estimation.default_area_m2,
            ),
            reporter: AggregationReporter::new(
                config.report.heating_hours,
                config.report.cooling_hours,
            ),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Step one: reads both exports, detects their structure, and merges and
    /// classifies the rooms.
    #[instrument(
        level = "info",
        skip_all,
        fields(heating = %request.heating.name, ventilation = %request.ventilation.name)
    )]
    pub fn merge(&self, request: &MergeRequest) -> Result<MergeOutcome> {
        let options = DetectOptions {
            declared_header_row: request.header_row,
            auto_detect: request.auto_detect,
        };

        let (heating, ventilation) = thread::scope(|scope| {
            let ventilation = scope.spawn(|| self.prepare(&request.ventilation, options));
            let heating = self.prepare(&request.heating, options);
            let ventilation = ventilation
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (heating, ventilation)
        });
        let (heating_header, heating_rows) = heating?;
        let (ventilation_header, ventilation_rows) = ventilation?;

        let rooms = merge::merge(
            reconcile::reconcile(heating_rows, SourceTag::Heating),
            reconcile::reconcile(ventilation_rows, SourceTag::Ventilation),
            request.how,
        )?;
        let assignments = self.classifier.classify_all(&rooms);
        let table = MergedTable::from_rooms(&rooms);
        let metrics = report::room_metrics(&rooms);
        let classification = report::classification_summary(&rooms, &assignments);
        info!(
            rooms = rooms.len(),
            columns = table.columns.len(),
            total_area = metrics.total_area_m2,
            "merge complete"
        );

        let project_name = request
            .project_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PROJECT_NAME)
            .to_string();

        Ok(MergeOutcome {
            project_name,
            heating_file: request.heating.name.clone(),
            ventilation_file: request.ventilation.name.clone(),
            heating_header,
            ventilation_header,
            rooms,
            assignments,
            table,
            metrics,
            classification,
        })
    }

    /// Step two: estimates every merged room and aggregates the portfolio.
    /// Uses the configured energy price when `price_per_kwh` is `None`.
    ///
    /// Rooms of a merge whose assignments no longer line up with its rooms
    /// are classified again before estimating.
    #[instrument(level = "info", skip(self, merged), fields(rooms = merged.rooms.len()))]
    pub fn estimate(
        &self,
        merged: &MergeOutcome,
        price_per_kwh: Option<f64>,
    ) -> Result<EstimationOutcome> {
        let price = match price_per_kwh {
            Some(price) => {
                config::validate_price(price)?;
                price
            }
            None => self.config.report.price_per_kwh,
        };

        let estimates = if merged.assignments.len() == merged.rooms.len() {
            self.estimator.estimate_all(&merged.rooms, &merged.assignments)?
        } else {
            warn!(
                assignments = merged.assignments.len(),
                "room-type assignments out of step with rooms, classifying again"
            );
            let assignments = self.classifier.classify_all(&merged.rooms);
            self.estimator.estimate_all(&merged.rooms, &assignments)?
        };
        let report = self
            .reporter
            .aggregate(&estimates, price, self.config.report.baseline_factor);
        info!(
            heating_kw = report.heating_power_kw,
            cooling_kw = report.cooling_power_kw,
            savings_kwh = report.savings_kwh,
            "estimation complete"
        );
        Ok(EstimationOutcome { estimates, report })
    }

    /// Runs both steps.
    pub fn merge_and_estimate(
        &self,
        request: &MergeRequest,
        price_per_kwh: Option<f64>,
    ) -> Result<Analysis> {
        let merge = self.merge(request)?;
        let estimation = self.estimate(&merge, price_per_kwh)?;
        Ok(Analysis { merge, estimation })
    }

    fn prepare(
        &self,
        file: &SourceFile,
        options: DetectOptions,
    ) -> Result<(HeaderSpec, Vec<SheetRow>)> {
        let sheet = excel_read::read_raw_sheet(
            &file.name,
            &file.bytes,
            self.config.detection.sheet.as_deref(),
        )?;
        debug!(file = %file.name, rows = sheet.rows.len(), "read export");
        let header = self.detector.detect(&sheet, options)?;
        let rows = load::load(&sheet, &header);
        Ok((header, rows))
    }
}
