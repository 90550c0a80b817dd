//! Incremental summary regeneration.
//!
//! Rather than asking the extractor for a fresh summary on every update, the
//! previous summary is annotated with the changes that matter to a reader.

use serde_json::Value;

use crate::types::{DiffOp, DiffOperation};

/// Maximum summary length in characters.
pub const SUMMARY_LIMIT: usize = 500;

/// Summaries shorter than this get the change note appended.
const APPEND_BELOW: usize = 200;

/// Extra characters a text update needs before it is worth mentioning.
const SIGNIFICANT_GROWTH: usize = 50;

/// Descriptions kept per regeneration.
const MAX_DESCRIPTIONS: usize = 3;

/// Fields whose changes are mentioned in the summary.
const SIGNIFICANT_FIELDS: [&str; 4] = ["extracted_text", "key_points", "ui_components", "content_type"];

/// Fold `changes` into `old_summary`. Returns the old summary untouched when
/// nothing significant changed.
pub fn regenerate(old_summary: &str, changes: &[DiffOperation]) -> String {
    let descriptions: Vec<String> = changes
        .iter()
        .filter(|change| is_significant(change))
        .filter_map(describe)
        .take(MAX_DESCRIPTIONS)
        .collect();

    if descriptions.is_empty() {
        return old_summary.to_string();
    }
    let changes_text = descriptions.join("; ");

    let updated = if old_summary.chars().count() < APPEND_BELOW {
        format!("{} [Updated: {}]", old_summary, changes_text)
    } else {
        let note = format!("Updated: {}", changes_text);
        let mut sentences: Vec<&str> = old_summary.split(". ").collect();
        if sentences.len() > 1 {
            sentences.insert(1, &note);
            sentences.join(". ")
        } else {
            format!("{} [Updated: {}]", old_summary, changes_text)
        }
    };

    truncate(updated)
}

fn is_significant(change: &DiffOperation) -> bool {
    let joined = change.joined_path();
    SIGNIFICANT_FIELDS.iter().any(|field| joined.contains(field))
}

fn describe(change: &DiffOperation) -> Option<String> {
    match change.op {
        DiffOp::Add => Some(format!("Added {}: {}", change.leaf(), render(&change.new_value))),
        DiffOp::Remove => Some(format!("Removed {}: {}", change.leaf(), render(&change.old_value))),
        DiffOp::Update => match (&change.old_value, &change.new_value) {
            (Value::String(old), Value::String(new))
                if new.chars().count() > old.chars().count() + SIGNIFICANT_GROWTH =>
            {
                Some(format!("Updated {} with additional content", change.leaf()))
            }
            _ => None,
        },
    }
}

/// Strings verbatim, everything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(summary: String) -> String {
    if summary.chars().count() <= SUMMARY_LIMIT {
        return summary;
    }
    let mut cut: String = summary.chars().take(SUMMARY_LIMIT - 3).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::path;
    use serde_json::json;

    #[test]
    fn test_no_significant_changes_keeps_summary() {
        let changes = vec![
            DiffOperation::update(path(["confidence"]), json!(0.9), json!(0.8), 0.9),
            DiffOperation::update(path(["extracted_text"]), json!("short"), json!("shorter"), 0.0),
        ];
        assert_eq!(regenerate("A login form", &changes), "A login form");
        assert_eq!(regenerate("A login form", &[]), "A login form");
    }

    #[test]
    fn test_short_summary_gets_appended_note() {
        let changes = vec![DiffOperation::add(path(["key_points"]), json!("2FA enabled"))];
        assert_eq!(
            regenerate("A login form", &changes),
            "A login form [Updated: Added key_points: 2FA enabled]"
        );
    }

    #[test]
    fn test_long_summary_gets_note_after_first_sentence() {
        let old = format!("First sentence. {}", "word ".repeat(50));
        let changes = vec![DiffOperation::remove(path(["key_points"]), json!("old point"))];
        let updated = regenerate(&old, &changes);
        assert!(updated.starts_with("First sentence. Updated: Removed key_points: old point. word"));
    }

    #[test]
    fn test_long_single_sentence_appends() {
        let old = "x".repeat(250);
        let changes = vec![DiffOperation::add(path(["content_type"]), json!("chart"))];
        let updated = regenerate(&old, &changes);
        assert!(updated.ends_with(" [Updated: Added content_type: chart]"));
    }

    #[test]
    fn test_text_growth_is_mentioned() {
        let changes = vec![DiffOperation::update(
            path(["extracted_text"]),
            json!("Status"),
            json!(format!("Status {}", "details ".repeat(10))),
            0.1,
        )];
        assert_eq!(
            regenerate("Panel", &changes),
            "Panel [Updated: Updated extracted_text with additional content]"
        );
    }

    #[test]
    fn test_at_most_three_descriptions() {
        let changes: Vec<_> = (0..5)
            .map(|i| DiffOperation::add(path(["key_points"]), json!(format!("p{}", i))))
            .collect();
        let updated = regenerate("S", &changes);
        assert!(updated.contains("p2"));
        assert!(!updated.contains("p3"));
        assert_eq!(updated.matches("; ").count(), 2);
    }

    #[test]
    fn test_structured_values_render_as_json() {
        let changes = vec![DiffOperation::add(path(["ui_components"]), json!({"type": "button"}))];
        assert_eq!(
            regenerate("S", &changes),
            r#"S [Updated: Added ui_components: {"type":"button"}]"#
        );
    }

    #[test]
    fn test_result_is_capped() {
        let old = format!("Intro. {}", "y".repeat(480));
        let changes = vec![DiffOperation::add(path(["key_points"]), json!("z".repeat(100)))];
        let updated = regenerate(&old, &changes);
        assert_eq!(updated.chars().count(), SUMMARY_LIMIT);
        assert!(updated.ends_with("..."));
    }
}
