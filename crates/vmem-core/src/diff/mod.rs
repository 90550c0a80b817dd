//! Structured diff over JSON documents.
//!
//! [`diff`] walks two documents and reports how the new one differs from the
//! old one as a flat list of [`DiffOperation`]s. Keys starting with
//! [`PRIVATE_PREFIX`] are metadata and never produce operations.
//!
//! Lists of scalars are compared by membership (order and duplicate counts are
//! ignored); lists holding anything else are compared whole.

pub mod text;

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::types::{DiffOperation, PathSegment};

/// Keys with this prefix are skipped at every depth.
pub const PRIVATE_PREFIX: char = '_';

/// Confidence attached to whole-list replacements.
pub const LIST_REPLACE_CONFIDENCE: f64 = 0.8;

/// Compute the operations that turn `old` into `new`.
pub fn diff(old: &Value, new: &Value) -> Vec<DiffOperation> {
    let mut operations = Vec::new();
    compare_values(old, new, &[], &mut operations);
    operations
}

fn compare_values(old: &Value, new: &Value, path: &[PathSegment], out: &mut Vec<DiffOperation>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => compare_maps(old_map, new_map, path, out),
        (Value::Array(old_list), Value::Array(new_list)) => compare_lists(old_list, new_list, path, out),
        _ if kind(old) != kind(new) => {
            out.push(DiffOperation::update(path.to_vec(), old.clone(), new.clone(), 1.0));
        }
        _ if !values_equal(old, new) => {
            out.push(DiffOperation::update(
                path.to_vec(),
                old.clone(),
                new.clone(),
                similarity(old, new),
            ));
        }
        _ => {}
    }
}

fn compare_maps(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    path: &[PathSegment],
    out: &mut Vec<DiffOperation>,
) {
    let keys = old.keys().chain(new.keys().filter(|k| !old.contains_key(*k)));

    for key in keys {
        if key.starts_with(PRIVATE_PREFIX) {
            continue;
        }

        let mut child = path.to_vec();
        child.push(PathSegment::Key(key.clone()));

        match (old.get(key), new.get(key)) {
            (None, Some(added)) => out.push(DiffOperation::add(child, added.clone())),
            (Some(removed), None) => out.push(DiffOperation::remove(child, removed.clone())),
            (Some(before), Some(after)) => compare_values(before, after, &child, out),
            (None, None) => {}
        }
    }
}

fn compare_lists(old: &[Value], new: &[Value], path: &[PathSegment], out: &mut Vec<DiffOperation>) {
    if old.iter().all(is_scalar) && new.iter().all(is_scalar) {
        for item in distinct(new) {
            if !old.iter().any(|o| values_equal(o, item)) {
                out.push(DiffOperation::add(path.to_vec(), item.clone()));
            }
        }
        for item in distinct(old) {
            if !new.iter().any(|n| values_equal(n, item)) {
                out.push(DiffOperation::remove(path.to_vec(), item.clone()));
            }
        }
        return;
    }

    let equal = old.len() == new.len() && old.iter().zip(new).all(|(a, b)| values_equal(a, b));
    if !equal {
        out.push(DiffOperation::update(
            path.to_vec(),
            Value::Array(old.to_vec()),
            Value::Array(new.to_vec()),
            LIST_REPLACE_CONFIDENCE,
        ));
    }
}

/// Distinct values in first-occurrence order.
fn distinct(items: &[Value]) -> Vec<&Value> {
    let mut seen: Vec<&Value> = Vec::new();
    for item in items {
        if !seen.iter().any(|s| values_equal(s, item)) {
            seen.push(item);
        }
    }
    seen
}

/// Strings, numbers and booleans. Null counts as structured for list comparison.
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

#[derive(Debug, PartialEq, Eq)]
enum Kind {
    Null,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
}

fn kind(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Bool,
        Value::Number(_) => Kind::Number,
        Value::String(_) => Kind::String,
        Value::Array(_) => Kind::Sequence,
        Value::Object(_) => Kind::Mapping,
    }
}

/// Deep equality that compares integers and floats by value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            _ if x == y => true,
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Similarity of two values in `[0, 1]`.
///
/// Strings use Jaccard similarity over lowercase word sets; numbers use
/// `1 - |a - b| / max(|a|, |b|)` floored at 0. Everything else that differs
/// scores 0.
pub fn similarity(old: &Value, new: &Value) -> f64 {
    if values_equal(old, new) {
        return 1.0;
    }

    match (old, new) {
        (Value::String(a), Value::String(b)) => jaccard(a, b),
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => numeric_similarity(a, b),
            _ => 0.0,
        },
        _ => 0.0,
    }
}

fn jaccard(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let a_words: HashSet<&str> = a_lower.split_whitespace().collect();
    let b_words: HashSet<&str> = b_lower.split_whitespace().collect();

    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }

    let intersection = a_words.intersection(&b_words).count();
    let union = a_words.union(&b_words).count();
    intersection as f64 / union as f64
}

fn numeric_similarity(a: f64, b: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 1.0;
    }
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }
    (1.0 - (a - b).abs() / a.abs().max(b.abs())).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{path, DiffOp};
    use serde_json::json;

    fn screen() -> Value {
        json!({
            "extracted_text": "Status: Green",
            "layout_description": "Single column",
            "ui_components": [{"type": "button", "label": "Deploy"}],
            "content_type": "dashboard",
            "key_points": ["deploy ready", "2 hours left"],
            "full_summary": "Deployment dashboard",
            "confidence": 0.95,
            "_extracted_at": "2024-01-01T00:00:00Z"
        })
    }

    #[test]
    fn test_identical_documents_have_no_diff() {
        let doc = screen();
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn test_added_and_removed_keys() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"a": 1, "c": 3});
        let ops = diff(&old, &new);

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].op, DiffOp::Remove);
        assert_eq!(ops[0].path, path(["b"]));
        assert_eq!(ops[0].old_value, json!(2));
        assert_eq!(ops[1].op, DiffOp::Add);
        assert_eq!(ops[1].path, path(["c"]));
        assert_eq!(ops[1].new_value, json!(3));
    }

    #[test]
    fn test_private_keys_are_skipped() {
        let mut new = screen();
        new["_extracted_at"] = json!("2025-06-01T00:00:00Z");
        new["_debug"] = json!({"x": 1});
        new["layout"] = json!({"_internal": 1});
        let ops = diff(&screen(), &new);

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, path(["layout"]));
    }

    #[test]
    fn test_nested_mappings_recurse() {
        let old = json!({"window": {"title": "Editor", "size": {"w": 800}}});
        let new = json!({"window": {"title": "Editor", "size": {"w": 1024}}});
        let ops = diff(&old, &new);

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, DiffOp::Update);
        assert_eq!(ops[0].path, path(["window", "size", "w"]));
        assert!((ops[0].confidence - 0.78125).abs() < 1e-9);
    }

    #[test]
    fn test_type_mismatch_is_full_confidence_update() {
        let old = json!({"count": "5"});
        let new = json!({"count": 5});
        let ops = diff(&old, &new);

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, DiffOp::Update);
        assert_eq!(ops[0].confidence, 1.0);
    }

    #[test]
    fn test_scalar_lists_compare_by_membership() {
        let old = json!({"items": [1, 2, 2, 3]});
        let new = json!({"items": [2, 3, 4]});
        let ops = diff(&old, &new);

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].op, DiffOp::Add);
        assert_eq!(ops[0].path, path(["items"]));
        assert_eq!(ops[0].new_value, json!(4));
        assert_eq!(ops[1].op, DiffOp::Remove);
        assert_eq!(ops[1].old_value, json!(1));
    }

    #[test]
    fn test_duplicate_additions_collapse() {
        let ops = diff(&json!({"tags": ["a"]}), &json!({"tags": ["b", "b", "a"]}));
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].new_value, json!("b"));
    }

    #[test]
    fn test_reordered_scalar_list_is_unchanged() {
        let ops = diff(&json!({"k": ["x", "y", "z"]}), &json!({"k": ["z", "x", "y", "x"]}));
        assert!(ops.is_empty());
    }

    #[test]
    fn test_structured_list_is_replaced_whole() {
        let old = screen();
        let mut new = screen();
        new["ui_components"] = json!([{"type": "button", "label": "Deployed"}]);
        let ops = diff(&old, &new);

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, DiffOp::Update);
        assert_eq!(ops[0].path, path(["ui_components"]));
        assert_eq!(ops[0].confidence, LIST_REPLACE_CONFIDENCE);
        assert_eq!(ops[0].old_value, old["ui_components"]);
        assert_eq!(ops[0].new_value, new["ui_components"]);
    }

    #[test]
    fn test_list_with_null_is_compared_whole() {
        let ops = diff(&json!({"k": [1, null]}), &json!({"k": [1, 2]}));
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, DiffOp::Update);
        assert_eq!(ops[0].confidence, LIST_REPLACE_CONFIDENCE);
    }

    #[test]
    fn test_integer_and_float_compare_by_value() {
        assert!(diff(&json!({"n": 1}), &json!({"n": 1.0})).is_empty());
        assert!(diff(&json!({"n": [1, 2]}), &json!({"n": [2.0, 1.0]})).is_empty());
    }

    #[test]
    fn test_jaccard_similarity() {
        assert_eq!(similarity(&json!("a b c"), &json!("a b d")), 0.5);
        assert_eq!(similarity(&json!("Hello World"), &json!("hello world")), 1.0);
        assert_eq!(similarity(&json!(""), &json!("words")), 0.0);
        assert_eq!(similarity(&json!("   "), &json!("words")), 0.0);
    }

    #[test]
    fn test_numeric_similarity() {
        assert_eq!(similarity(&json!(0), &json!(0.0)), 1.0);
        assert_eq!(similarity(&json!(0), &json!(5)), 0.0);
        assert!((similarity(&json!(10), &json!(8)) - 0.8).abs() < 1e-12);
        // Opposite signs would fall below zero.
        assert_eq!(similarity(&json!(-4), &json!(4)), 0.0);
    }

    #[test]
    fn test_mixed_similarity_is_zero() {
        assert_eq!(similarity(&json!(true), &json!(false)), 0.0);
        assert_eq!(similarity(&json!("1"), &json!(1)), 0.0);
        assert_eq!(similarity(&json!(null), &json!(null)), 1.0);
    }

    #[test]
    fn test_non_mapping_roots() {
        let ops = diff(&json!("before"), &json!("after"));
        assert_eq!(ops.len(), 1);
        assert!(ops[0].path.is_empty());
    }
}
