//! Version history helpers: change hashing and log compaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::diff::text::TextEdit;
use crate::types::{DiffOperation, VersionHistoryEntry};

/// Entries further apart than this are never merged.
pub const MERGE_WINDOW_SECS: i64 = 300;

/// Minimum operation overlap (exclusive) for two entries to merge.
pub const MERGE_OVERLAP: f64 = 0.5;

/// md5 over the sorted `op:path:old:new` descriptors of `changes`.
pub fn change_hash(changes: &[DiffOperation]) -> String {
    let mut descriptors: Vec<String> = changes
        .iter()
        .map(|change| {
            let path = change
                .path
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(":");
            format!(
                "{}:{}:{}:{}",
                change.op,
                path,
                descriptor_value(&change.old_value),
                descriptor_value(&change.new_value)
            )
        })
        .collect();
    descriptors.sort();
    format!("{:x}", md5::compute(descriptors.join("|")))
}

fn descriptor_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One or more consecutive history entries folded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactedEntry {
    pub first_version: i64,
    pub last_version: i64,
    /// Timestamp of the latest merged entry
    pub created_at: DateTime<Utc>,
    pub operations: Vec<DiffOperation>,
    pub text_diffs: BTreeMap<String, Vec<TextEdit>>,
    pub change_count: usize,
    pub change_hash: String,
    /// Change hashes of the two halves of the most recent merge; empty for
    /// entries that were never merged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
}

impl From<&VersionHistoryEntry> for CompactedEntry {
    fn from(entry: &VersionHistoryEntry) -> Self {
        Self {
            first_version: entry.version,
            last_version: entry.version,
            created_at: entry.created_at,
            operations: entry.diff.clone(),
            text_diffs: entry.text_diffs.clone(),
            change_count: entry.diff.len(),
            change_hash: entry.change_hash.clone(),
            merged_from: Vec::new(),
        }
    }
}

impl CompactedEntry {
    fn can_merge(&self, next: &CompactedEntry) -> bool {
        let gap = (next.created_at - self.created_at).num_seconds().abs();
        if gap > MERGE_WINDOW_SECS {
            return false;
        }
        overlap(&self.operations, &next.operations) > MERGE_OVERLAP
    }

    fn merge(self, next: CompactedEntry) -> CompactedEntry {
        let change_hash = format!(
            "{:x}",
            md5::compute(format!("{}{}", self.change_hash, next.change_hash))
        );
        let mut operations = self.operations;
        operations.extend(next.operations);
        let mut text_diffs = self.text_diffs;
        text_diffs.extend(next.text_diffs);

        CompactedEntry {
            first_version: self.first_version,
            last_version: next.last_version,
            created_at: next.created_at,
            operations,
            text_diffs,
            change_count: self.change_count + next.change_count,
            change_hash,
            merged_from: vec![self.change_hash, next.change_hash],
        }
    }
}

/// `|A ∩ B| / max(|A|, |B|)` over the serialized operations.
fn overlap(a: &[DiffOperation], b: &[DiffOperation]) -> f64 {
    let encode = |ops: &[DiffOperation]| -> HashSet<String> {
        ops.iter()
            .filter_map(|op| serde_json::to_string(op).ok())
            .collect()
    };
    let a = encode(a);
    let b = encode(b);
    let largest = a.len().max(b.len());
    if largest == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / largest as f64
}

/// Merge runs of consecutive, similar history entries.
pub fn compress(entries: &[VersionHistoryEntry]) -> Vec<CompactedEntry> {
    let mut compacted = Vec::new();
    let mut iter = entries.iter().map(CompactedEntry::from);
    let Some(mut current) = iter.next() else {
        return compacted;
    };

    for next in iter {
        if current.can_merge(&next) {
            current = current.merge(next);
        } else {
            compacted.push(current);
            current = next;
        }
    }
    compacted.push(current);
    compacted
}
