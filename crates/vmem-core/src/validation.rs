//! Extraction quality checks.
//!
//! A [`ValidationReport`] is advisory: the engine logs it but still stores the
//! extraction.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Fields that must be present and non-empty.
const REQUIRED_FIELDS: [&str; 2] = ["extracted_text", "full_summary"];

/// Score below which reprocessing is suggested.
pub const REPROCESS_BELOW: f64 = 0.7;

/// Confidence assumed when the document carries none.
const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    /// Adjusted confidence in `[0, 1]`
    pub score: f64,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Check an extracted document for completeness and obvious garbage.
pub fn validate_extraction(document: &Value) -> ValidationReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut penalty = 0.0;

    for field in REQUIRED_FIELDS {
        if !is_present(document.get(field)) {
            issues.push(format!("Missing required field: {}", field));
        }
    }

    if let Some(text) = document.get("extracted_text").and_then(Value::as_str) {
        if text.chars().count() < 10 {
            warnings.push("Extracted text is very short".to_string());
            penalty -= 0.2;
        }
        if is_garbage(text) {
            issues.push("Extracted text appears to be garbage".to_string());
        }
        if has_excessive_repetition(text) {
            warnings.push("Text has excessive repetition".to_string());
            penalty -= 0.1;
        }
    }

    if let Some(summary) = document.get("full_summary").and_then(Value::as_str) {
        let len = summary.chars().count();
        if len < 20 {
            warnings.push("Summary is very short".to_string());
            penalty -= 0.1;
        }
        if len > 1000 {
            warnings.push("Summary is too long".to_string());
            penalty -= 0.1;
        }
    }

    let confidence = document
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE);
    let score = (confidence + penalty).clamp(0.0, 1.0);

    let mut suggestions = Vec::new();
    if score < REPROCESS_BELOW {
        suggestions.push("Consider reprocessing with different vision model parameters".to_string());
    }

    ValidationReport {
        is_valid: issues.is_empty(),
        score,
        issues,
        warnings,
        suggestions,
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(_)) => true,
    }
}

/// Mostly symbols, or long text made of very few distinct words.
fn is_garbage(text: &str) -> bool {
    let total = text.chars().count();
    if total > 0 {
        let special = text
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        if special as f64 / total as f64 > 0.5 {
            return true;
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > 10 {
        let unique: HashSet<&str> = words.iter().copied().collect();
        if (unique.len() as f64) / (words.len() as f64) < 0.3 {
            return true;
        }
    }
    false
}

/// Any word longer than three characters making up over 30% of the text.
fn has_excessive_repetition(text: &str) -> bool {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.len() < 5 {
        return false;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in words.iter().filter(|w| w.chars().count() > 3) {
        *counts.entry(*word).or_default() += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f64 / words.len() as f64 > 0.3
}
