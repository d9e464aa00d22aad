use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the failure cases that can occur while the tool reads
/// the two exports, reconciles them, and writes the results.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when the configuration file is not valid TOML.
    #[error("configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the `.xlsx`/`.xlsm` reader.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors bubbled up from the legacy `.xls` reader.
    #[error("Excel read error: {0}")]
    ExcelReadLegacy(#[from] calamine::XlsError),

    /// Raised when a workbook has no sheet that can be analysed.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when an upload is not an Excel workbook.
    #[error("unsupported file type '{0}' (allowed: .xls, .xlsx, .xlsm)")]
    UnsupportedFileType(String),

    /// Raised when neither the heuristic nor the inference collaborator could
    /// locate the header row and column roles.
    #[error("could not detect the structure of {file}: {reason}")]
    StructureDetection { file: String, reason: String },

    /// Reserved for irreconcilable column collisions. Collisions currently
    /// degrade to the synonym priority order instead.
    #[error("schema reconciliation failed: {0}")]
    SchemaReconciliation(String),

    /// Raised when the merge yields no room identified by a room number.
    #[error("merge produced no rooms: neither export contains room numbers")]
    EmptyMerge,

    /// Raised when configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when an analysis id is not present in the store.
    #[error("analysis not found: {0}")]
    UnknownAnalysis(String),

    /// Raised when a new analysis would overwrite a stored one.
    #[error("analysis already exists: {0}")]
    DuplicateAnalysis(String),

    /// Raised when room-type assignments do not line up with the rooms they
    /// belong to.
    #[error("{assignments} room-type assignments for {rooms} rooms")]
    MisalignedAssignments { rooms: usize, assignments: usize },

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl ToolError {
    /// Whether the error stems from the uploaded data rather than the
    /// environment, i.e. should be reported to the caller as a validation
    /// failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ToolError::StructureDetection { .. }
                | ToolError::SchemaReconciliation(_)
                | ToolError::EmptyMerge
                | ToolError::UnsupportedFileType(_)
                | ToolError::InvalidWorkbook(_)
                | ToolError::ExcelRead(_)
                | ToolError::ExcelReadLegacy(_)
        )
    }
}
