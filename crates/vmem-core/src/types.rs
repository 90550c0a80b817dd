//! Shared types for the memory engine.
//!
//! These types are used by the store, the diff engine and the patcher, and are
//! serialized as-is into the version history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::diff::text::TextEdit;

// ─────────────────────────────────────────────────────────────────────────────
// Fingerprints
// ─────────────────────────────────────────────────────────────────────────────

/// Fingerprints derived from the raw bytes of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSet {
    /// SHA-256 of the raw bytes (exact-duplicate key)
    pub content_hash: String,
    /// 64-bit DCT hash rendered as 16 hex characters (near-duplicate key)
    pub perceptual_hash: String,
    /// SHA-256 of a 32x32 grayscale grid (layout summary, not used for matching)
    pub structural_hash: String,
    pub width: u32,
    pub height: u32,
    /// Color mode name, e.g. `RGB`, `RGBA`, `L`
    pub color_mode: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory records
// ─────────────────────────────────────────────────────────────────────────────

/// A stored memory derived from one or more screenshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content_hash: String,
    pub perceptual_hash: String,
    pub structural_hash: Option<String>,
    pub structured_content: Value,
    pub summary: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

/// Input for creating a memory record.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub id: String,
    pub fingerprints: FingerprintSet,
    pub structured_content: Value,
    pub metadata: Map<String, Value>,
}

impl NewMemory {
    /// Build a new memory with a fresh UUID.
    pub fn new(fingerprints: FingerprintSet, structured_content: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprints,
            structured_content,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Summary stored alongside the content (the document's `full_summary`).
    pub fn summary(&self) -> &str {
        self.structured_content
            .get("full_summary")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// Result of an insert keyed on the unique content hash.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    /// The record was inserted.
    Created(MemoryRecord),
    /// A record with the same content hash already existed; nothing was written.
    Existing(MemoryRecord),
}

impl AddOutcome {
    pub fn record(&self) -> &MemoryRecord {
        match self {
            AddOutcome::Created(record) | AddOutcome::Existing(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, AddOutcome::Created(_))
    }
}

/// Input for a transactional memory update.
#[derive(Debug, Clone)]
pub struct UpdateMemory {
    pub memory_id: String,
    pub structured_content: Value,
    pub summary: String,
    pub changes: Vec<DiffOperation>,
    pub text_diffs: BTreeMap<String, Vec<TextEdit>>,
    pub change_hash: String,
    pub version_increment: i64,
    /// When set, the update only applies if the stored version still matches.
    pub expected_version: Option<i64>,
}

/// One append-only entry in a memory's change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionHistoryEntry {
    pub id: i64,
    pub memory_id: String,
    pub version: i64,
    pub diff: Vec<DiffOperation>,
    pub text_diffs: BTreeMap<String, Vec<TextEdit>>,
    pub change_hash: String,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Diff operations
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of change described by a [`DiffOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Add,
    Remove,
    Update,
}

impl DiffOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffOp::Add => "add",
            DiffOp::Remove => "remove",
            DiffOp::Update => "update",
        }
    }
}

impl std::fmt::Display for DiffOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a path into a structured document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A single described change at a path within a structured document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffOperation {
    pub op: DiffOp,
    pub path: Vec<PathSegment>,
    #[serde(default)]
    pub old_value: Value,
    #[serde(default)]
    pub new_value: Value,
    pub confidence: f64,
}

impl DiffOperation {
    pub fn add(path: Vec<PathSegment>, new_value: Value) -> Self {
        Self {
            op: DiffOp::Add,
            path,
            old_value: Value::Null,
            new_value,
            confidence: 1.0,
        }
    }

    pub fn remove(path: Vec<PathSegment>, old_value: Value) -> Self {
        Self {
            op: DiffOp::Remove,
            path,
            old_value,
            new_value: Value::Null,
            confidence: 1.0,
        }
    }

    pub fn update(path: Vec<PathSegment>, old_value: Value, new_value: Value, confidence: f64) -> Self {
        Self {
            op: DiffOp::Update,
            path,
            old_value,
            new_value,
            confidence,
        }
    }

    /// Path rendered with spaces between segments.
    pub fn joined_path(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Last path segment, or an empty string for root-level operations.
    pub fn leaf(&self) -> String {
        self.path.last().map(ToString::to_string).unwrap_or_default()
    }
}

/// Build a path from string keys.
pub fn path<I, S>(segments: I) -> Vec<PathSegment>
where
    I: IntoIterator<Item = S>,
    S: Into<PathSegment>,
{
    segments.into_iter().map(Into::into).collect()
}
