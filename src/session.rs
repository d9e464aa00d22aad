//! Persistence of analyses between the merge and the estimation step.
//!
//! The pipeline itself never touches a store; callers save what it returns.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, ToolError};
use crate::pipeline::{EstimationOutcome, MergeOutcome};

/// Progress of a stored analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Rooms merged and typed; no estimate yet.
    Merged,
    /// At least one estimate has been computed.
    Estimated,
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStatus::Merged => write!(f, "merged"),
            AnalysisStatus::Estimated => write!(f, "estimated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: AnalysisStatus,
    pub merge: MergeOutcome,
    /// Latest estimate; replaced when the analysis is estimated again.
    pub estimation: Option<EstimationOutcome>,
}

impl AnalysisRecord {
    /// Starts a new record for a freshly merged analysis.
    pub fn new(merge: MergeOutcome) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            status: AnalysisStatus::Merged,
            merge,
            estimation: None,
        }
    }

    pub fn project_name(&self) -> &str {
        &self.merge.project_name
    }

    /// Attaches an estimate and advances the status.
    pub fn record_estimation(&mut self, estimation: EstimationOutcome) {
        self.estimation = Some(estimation);
        self.status = AnalysisStatus::Estimated;
        self.updated_at = Utc::now();
    }
}

/// Storage for [`AnalysisRecord`]s keyed by their id.
pub trait AnalysisStore: Send + Sync {
    /// Stores a new record. Fails when the id is already taken.
    fn create(&self, record: &AnalysisRecord) -> Result<()>;

    fn get(&self, id: &Uuid) -> Result<AnalysisRecord>;

    /// Replaces an existing record.
    fn update(&self, record: &AnalysisRecord) -> Result<()>;

    fn exists(&self, id: &Uuid) -> Result<bool>;

    /// Removes a record, returning whether it existed.
    fn delete(&self, id: &Uuid) -> Result<bool>;
}

/// Parses an analysis id given on the command line or in a request.
pub fn parse_id(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text.trim()).map_err(|_| ToolError::UnknownAnalysis(text.to_string()))
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryAnalysisStore {
    records: Mutex<HashMap<Uuid, AnalysisRecord>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, AnalysisRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AnalysisStore for InMemoryAnalysisStore {
    fn create(&self, record: &AnalysisRecord) -> Result<()> {
        let mut records = self.records();
        if records.contains_key(&record.id) {
            return Err(ToolError::DuplicateAnalysis(record.id.to_string()));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    fn get(&self, id: &Uuid) -> Result<AnalysisRecord> {
        self.records()
            .get(id)
            .cloned()
            .ok_or_else(|| ToolError::UnknownAnalysis(id.to_string()))
    }

    fn update(&self, record: &AnalysisRecord) -> Result<()> {
        match self.records().get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(ToolError::UnknownAnalysis(record.id.to_string())),
        }
    }

    fn exists(&self, id: &Uuid) -> Result<bool> {
        Ok(self.records().contains_key(id))
    }

    fn delete(&self, id: &Uuid) -> Result<bool> {
        Ok(self.records().remove(id).is_some())
    }
}

/// One pretty-printed JSON document per analysis under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Opens the store, creating the directory when missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    #[instrument(level = "debug", skip_all, fields(id = %record.id))]
    fn write(&self, record: &AnalysisRecord) -> Result<()> {
        let path = self.path_for(&record.id);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(record)?)?;
        fs::rename(&staging, &path)?;
        debug!(path = %path.display(), "analysis written");
        Ok(())
    }
}

impl AnalysisStore for JsonFileStore {
    fn create(&self, record: &AnalysisRecord) -> Result<()> {
        if self.exists(&record.id)? {
            return Err(ToolError::DuplicateAnalysis(record.id.to_string()));
        }
        self.write(record)
    }

    fn get(&self, id: &Uuid) -> Result<AnalysisRecord> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(ToolError::UnknownAnalysis(id.to_string()));
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn update(&self, record: &AnalysisRecord) -> Result<()> {
        if !self.exists(&record.id)? {
            return Err(ToolError::UnknownAnalysis(record.id.to_string()));
        }
        self.write(record)
    }

    fn exists(&self, id: &Uuid) -> Result<bool> {
        Ok(self.path_for(id).is_file())
    }

    fn delete(&self, id: &Uuid) -> Result<bool> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}
