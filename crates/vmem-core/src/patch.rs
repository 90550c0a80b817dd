//! Apply diff operations to a structured document.
//!
//! Patching never fails as a whole. Each operation is applied independently
//! and reported in a [`PatchReport`]; an operation that does not fit the
//! document shape is skipped with a warning and the rest still apply.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::types::{DiffOp, DiffOperation, PathSegment};

/// Why a single operation could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchOperationError {
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("cannot descend into a scalar at segment '{segment}'")]
    NotAContainer { segment: String },

    #[error("segment '{segment}' does not fit the container it addresses")]
    SegmentMismatch { segment: String },

    #[error("{op} requires a non-empty path")]
    EmptyPath { op: String },
}

/// Result of one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum OpStatus {
    Applied,
    /// Nothing to do (e.g. removing a key that is already gone).
    NoOp,
    Skipped(PatchOperationError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpOutcome {
    /// Position of the operation in the input list
    pub index: usize,
    pub op: DiffOp,
    pub path: Vec<PathSegment>,
    pub status: OpStatus,
}

/// Patched document plus per-operation outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchReport {
    pub document: Value,
    pub outcomes: Vec<OpOutcome>,
}

impl PatchReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OpStatus::Applied)
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &OpOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OpStatus::Skipped(_)))
    }

    /// True when no operation was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped().next().is_none()
    }
}

/// What an `add` finds at its target key.
enum Slot {
    /// Key missing: set the value.
    Absent,
    /// Key holds a scalar or mapping: coalesce into `[old, new]`.
    Occupied,
    /// Key holds a list: append.
    Sequence,
}

impl Slot {
    fn classify(map: &Map<String, Value>, key: &str) -> Self {
        match map.get(key) {
            None => Slot::Absent,
            Some(Value::Array(_)) => Slot::Sequence,
            Some(_) => Slot::Occupied,
        }
    }
}

/// Most nulls an `add` may insert to reach its index.
pub const MAX_ADD_PADDING: usize = 1_000;

type OpResult = std::result::Result<bool, PatchOperationError>;

/// Apply `ops` in order to a copy of `base`.
pub fn apply(base: &Value, ops: &[DiffOperation]) -> PatchReport {
    let mut document = base.clone();
    let mut outcomes = Vec::with_capacity(ops.len());

    for (index, operation) in ops.iter().enumerate() {
        let result = match operation.op {
            DiffOp::Update => apply_update(&mut document, operation),
            DiffOp::Add => apply_add(&mut document, operation),
            DiffOp::Remove => apply_remove(&mut document, operation),
        };

        let status = match result {
            Ok(true) => OpStatus::Applied,
            Ok(false) => OpStatus::NoOp,
            Err(error) => {
                warn!(
                    index,
                    op = %operation.op,
                    path = %operation.joined_path(),
                    error = %error,
                    "Skipping patch operation"
                );
                OpStatus::Skipped(error)
            }
        };

        outcomes.push(OpOutcome {
            index,
            op: operation.op,
            path: operation.path.clone(),
            status,
        });
    }

    PatchReport { document, outcomes }
}

fn apply_update(document: &mut Value, operation: &DiffOperation) -> OpResult {
    let Some((leaf, parents)) = operation.path.split_last() else {
        *document = operation.new_value.clone();
        return Ok(true);
    };

    match (create_path(document, parents)?, leaf) {
        (Value::Object(map), PathSegment::Key(key)) => {
            map.insert(key.clone(), operation.new_value.clone());
            Ok(true)
        }
        (Value::Array(list), PathSegment::Index(index)) => {
            let len = list.len();
            let slot = list
                .get_mut(*index)
                .ok_or(PatchOperationError::IndexOutOfBounds { index: *index, len })?;
            *slot = operation.new_value.clone();
            Ok(true)
        }
        (parent, leaf) => Err(mismatch(parent, leaf)),
    }
}

fn apply_add(document: &mut Value, operation: &DiffOperation) -> OpResult {
    let Some((leaf, parents)) = operation.path.split_last() else {
        return Err(PatchOperationError::EmptyPath { op: operation.op.to_string() });
    };
    let value = operation.new_value.clone();

    match (create_path(document, parents)?, leaf) {
        (Value::Object(map), PathSegment::Key(key)) => {
            match Slot::classify(map, key) {
                Slot::Absent => {
                    map.insert(key.clone(), value);
                }
                Slot::Sequence => {
                    if let Some(Value::Array(list)) = map.get_mut(key) {
                        list.push(value);
                    }
                }
                Slot::Occupied => {
                    if let Some(existing) = map.get_mut(key) {
                        let old = existing.take();
                        *existing = Value::Array(vec![old, value]);
                    }
                }
            }
            Ok(true)
        }
        (Value::Array(list), PathSegment::Index(index)) => {
            let len = list.len();
            if *index > len + MAX_ADD_PADDING {
                return Err(PatchOperationError::IndexOutOfBounds { index: *index, len });
            }
            if *index >= len {
                list.resize(index + 1, Value::Null);
            }
            list[*index] = value;
            Ok(true)
        }
        (parent, leaf) => Err(mismatch(parent, leaf)),
    }
}

fn apply_remove(document: &mut Value, operation: &DiffOperation) -> OpResult {
    let Some((leaf, parents)) = operation.path.split_last() else {
        return Err(PatchOperationError::EmptyPath { op: operation.op.to_string() });
    };
    let Some(parent) = existing_path(document, parents)? else {
        return Ok(false);
    };

    match (parent, leaf) {
        // The whole key goes, even when `old_value` names one list member.
        (Value::Object(map), PathSegment::Key(key)) => Ok(map.shift_remove(key).is_some()),
        (Value::Array(list), PathSegment::Index(index)) => {
            if *index < list.len() {
                list.remove(*index);
                Ok(true)
            } else {
                Ok(false)
            }
        }
        (parent, leaf) => Err(mismatch(parent, leaf)),
    }
}

/// Walk `segments`, creating empty mappings for missing keys.
fn create_path<'a>(
    mut current: &'a mut Value,
    segments: &[PathSegment],
) -> std::result::Result<&'a mut Value, PatchOperationError> {
    for segment in segments {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            (Value::Array(list), PathSegment::Index(index)) => {
                let len = list.len();
                list.get_mut(*index)
                    .ok_or(PatchOperationError::IndexOutOfBounds { index: *index, len })?
            }
            (parent, segment) => return Err(mismatch(parent, segment)),
        };
    }
    Ok(current)
}

/// Walk `segments` without creating anything; `None` when a key is missing.
fn existing_path<'a>(
    mut current: &'a mut Value,
    segments: &[PathSegment],
) -> std::result::Result<Option<&'a mut Value>, PatchOperationError> {
    for segment in segments {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => match map.get_mut(key) {
                Some(child) => child,
                None => return Ok(None),
            },
            (Value::Array(list), PathSegment::Index(index)) => match list.get_mut(*index) {
                Some(child) => child,
                None => return Ok(None),
            },
            (parent, segment) => return Err(mismatch(parent, segment)),
        };
    }
    Ok(Some(current))
}

fn mismatch(parent: &Value, segment: &PathSegment) -> PatchOperationError {
    let segment = segment.to_string();
    match parent {
        Value::Object(_) | Value::Array(_) => PatchOperationError::SegmentMismatch { segment },
        _ => PatchOperationError::NotAContainer { segment },
    }
}
