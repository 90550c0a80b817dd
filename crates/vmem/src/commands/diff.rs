//! Diff (and optionally patch) two JSON documents.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use vmem_sdk::vmem_core::{diff, patch};

use super::print_json;

/// Execute the diff command.
///
/// Prints the operations, or with `apply` the patched document together with
/// any operations that could not be applied.
pub fn execute(old: &Path, new: &Path, apply: bool) -> Result<()> {
    print_json(&run(old, new, apply)?)
}

fn run(old: &Path, new: &Path, apply: bool) -> Result<Value> {
    let base = read_document(old)?;
    let target = read_document(new)?;
    let operations = diff::diff(&base, &target);

    if !apply {
        return Ok(serde_json::to_value(&operations)?);
    }

    let report = patch::apply(&base, &operations);
    let skipped: Vec<_> = report.skipped().collect();
    Ok(json!({
        "document": report.document,
        "applied": report.applied_count(),
        "skipped": skipped,
    }))
}

fn read_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}
