//! Update orchestration.
//!
//! [`Engine::process`] decides, for one screenshot, whether it is an exact
//! duplicate (`unchanged`), a near-duplicate of a stored memory (`updated`, or
//! `skipped` when nothing semantic changed) or new content (`created`).

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use vmem_core::diff::{self, text::text_diff};
use vmem_core::validation::validate_extraction;
use vmem_core::{
    history, patch, summary, AddOutcome, FingerprintSet, Fingerprinter, MemoryDatabase,
    MemoryRecord, NewMemory, UpdateMemory,
};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::vision::{OpenRouterExtractor, RetryingExtractor, VisionExtractor};

/// Metadata key that names an explicit update target.
pub const UPDATE_TARGET_KEY: &str = "update_memory_id";

/// Text fields that get a character-level diff in the history.
const TEXT_DIFF_FIELDS: [&str; 3] = ["extracted_text", "layout_description", "full_summary"];

/// One screenshot to process.
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    pub image_path: PathBuf,
    /// Stored with newly created memories
    pub metadata: Map<String, Value>,
    /// Update this memory instead of searching for a perceptual match
    pub update_memory_id: Option<String>,
}

impl ProcessRequest {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_target(mut self, memory_id: impl Into<String>) -> Self {
        self.update_memory_id = Some(memory_id.into());
        self
    }

    /// Explicit target from the request, else from the metadata.
    fn target(&self) -> Option<&str> {
        self.update_memory_id
            .as_deref()
            .or_else(|| self.metadata.get(UPDATE_TARGET_KEY).and_then(Value::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Created => "created",
            ProcessStatus::Updated => "updated",
            ProcessStatus::Unchanged => "unchanged",
            ProcessStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a processed screenshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub memory_id: String,
    pub summary: String,
    /// Version of the memory after processing
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes_count: Option<usize>,
    pub message: String,
}

impl ProcessOutcome {
    fn from_record(status: ProcessStatus, record: &MemoryRecord, message: &str) -> Self {
        Self {
            status,
            memory_id: record.id.clone(),
            summary: record.summary.clone(),
            version: record.version,
            changes_count: None,
            message: message.to_string(),
        }
    }
}

/// The Visual Memory Engine.
pub struct Engine {
    store: Arc<MemoryDatabase>,
    extractor: Arc<dyn VisionExtractor>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine over an explicitly owned store and extractor.
    pub fn new(
        store: Arc<MemoryDatabase>,
        extractor: Arc<dyn VisionExtractor>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            extractor,
            config,
        })
    }

    /// Open the configured database and build the HTTP extractor with retries.
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let store = MemoryDatabase::open(&config.database_path)?.with_metric(config.distance_metric);
        let extractor = RetryingExtractor::new(
            OpenRouterExtractor::new(&config.vision)?,
            config.retry.clone(),
            config.vision.timeout(),
        );
        Self::new(Arc::new(store), Arc::new(extractor), config)
    }

    pub fn store(&self) -> &Arc<MemoryDatabase> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process one screenshot.
    pub async fn process(&self, request: ProcessRequest) -> EngineResult<ProcessOutcome> {
        let fingerprints = fingerprint(&request.image_path).await?;

        if let Some(existing) = self.store.find_by_content_hash(&fingerprints.content_hash)? {
            info!(memory_id = %existing.id, "Exact duplicate, nothing to do");
            return Ok(ProcessOutcome::from_record(
                ProcessStatus::Unchanged,
                &existing,
                "Exact duplicate found. No processing needed.",
            ));
        }

        let document = self.extractor.extract(&request.image_path).await?;
        debug!(extractor = self.extractor.name(), "Extracted structured content");

        let report = validate_extraction(&document);
        if !report.is_valid {
            warn!(issues = ?report.issues, score = report.score, "Extraction failed validation");
        } else if !report.warnings.is_empty() {
            debug!(warnings = ?report.warnings, score = report.score, "Extraction quality warnings");
        }

        if let Some(target) = self.find_target(&request, &fingerprints)? {
            return self.update(target, document);
        }

        let memory = NewMemory::new(fingerprints, document).with_metadata(request.metadata);
        match self.store.add_memory(&memory)? {
            AddOutcome::Created(record) => Ok(ProcessOutcome::from_record(
                ProcessStatus::Created,
                &record,
                "New memory created successfully.",
            )),
            AddOutcome::Existing(record) => {
                info!(memory_id = %record.id, "Identical image stored concurrently");
                Ok(ProcessOutcome::from_record(
                    ProcessStatus::Unchanged,
                    &record,
                    "Exact duplicate stored concurrently. No processing needed.",
                ))
            }
        }
    }

    fn find_target(
        &self,
        request: &ProcessRequest,
        fingerprints: &FingerprintSet,
    ) -> EngineResult<Option<MemoryRecord>> {
        if let Some(id) = request.target() {
            let record = self.store.get_memory(id)?;
            if record.is_none() {
                warn!(memory_id = %id, "Update target not found, creating a new memory");
            }
            return Ok(record);
        }

        let record = self
            .store
            .find_by_perceptual_hash(&fingerprints.perceptual_hash, self.config.perceptual_threshold)?;
        if let Some(record) = &record {
            info!(memory_id = %record.id, "Linked to similar memory");
        }
        Ok(record)
    }

    fn update(&self, old: MemoryRecord, document: Value) -> EngineResult<ProcessOutcome> {
        let changes = diff::diff(&old.structured_content, &document);
        if changes.is_empty() {
            return Ok(ProcessOutcome::from_record(
                ProcessStatus::Skipped,
                &old,
                "No semantic changes detected.",
            ));
        }

        let report = patch::apply(&old.structured_content, &changes);
        let skipped = report.skipped().count();
        if skipped > 0 {
            warn!(memory_id = %old.id, skipped, "Some changes could not be applied");
        }
        let mut content = report.document;

        let old_summary = old
            .structured_content
            .get("full_summary")
            .and_then(Value::as_str)
            .unwrap_or(&old.summary);
        let new_summary = summary::regenerate(old_summary, &changes);
        // The stored full_summary diverges from any fresh extraction, so a later
        // match of the same screen always reports at least this one change.
        if let Value::Object(map) = &mut content {
            map.insert("full_summary".to_string(), Value::String(new_summary.clone()));
        }

        let mut text_diffs = BTreeMap::new();
        for field in TEXT_DIFF_FIELDS {
            let before = text_field(&old.structured_content, field);
            let after = text_field(&content, field);
            if before != after {
                text_diffs.insert(field.to_string(), text_diff(before, after));
            }
        }

        let update = UpdateMemory {
            memory_id: old.id.clone(),
            structured_content: content,
            summary: new_summary,
            change_hash: history::change_hash(&changes),
            changes,
            text_diffs,
            version_increment: 1,
            expected_version: Some(old.version),
        };
        let record = self.store.update_memory(&update)?;

        Ok(ProcessOutcome {
            status: ProcessStatus::Updated,
            memory_id: record.id,
            summary: record.summary,
            version: record.version,
            changes_count: Some(update.changes.len()),
            message: "Memory updated with semantic changes.".to_string(),
        })
    }
}

/// Fingerprint an image file on the blocking pool.
pub async fn fingerprint(path: &Path) -> EngineResult<FingerprintSet> {
    let path = path.to_path_buf();
    let fingerprints = tokio::task::spawn_blocking(move || Fingerprinter::fingerprint_file(&path)).await??;
    Ok(fingerprints)
}

fn text_field<'a>(document: &'a Value, field: &str) -> &'a str {
    document.get(field).and_then(Value::as_str).unwrap_or("")
}
