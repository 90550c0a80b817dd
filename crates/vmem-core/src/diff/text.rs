//! Character-level text diff.
//!
//! Uses the longest-matching-block algorithm (Ratcliff/Obershelp, no junk
//! heuristics) to produce replace/insert/delete spans over the old text, each
//! carrying up to [`CONTEXT_CHARS`] characters of surrounding context.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Characters of context captured on each side of an edit.
pub const CONTEXT_CHARS: usize = 50;

/// One positional edit. Positions and lengths count characters of the old text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TextEdit {
    Replace {
        position: usize,
        old_length: usize,
        old_text: String,
        new_text: String,
        context_before: String,
        context_after: String,
    },
    Delete {
        position: usize,
        length: usize,
        text: String,
        context_before: String,
        context_after: String,
    },
    Insert {
        position: usize,
        text: String,
        context_before: String,
        context_after: String,
    },
}

impl TextEdit {
    pub fn position(&self) -> usize {
        match self {
            TextEdit::Replace { position, .. }
            | TextEdit::Delete { position, .. }
            | TextEdit::Insert { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Replace,
    Delete,
    Insert,
}

/// Compute the edits that turn `old` into `new`.
pub fn text_diff(old: &str, new: &str) -> Vec<TextEdit> {
    let a: Vec<char> = old.chars().collect();
    let b: Vec<char> = new.chars().collect();

    opcodes(&a, &b)
        .into_iter()
        .map(|(tag, i1, i2, j1, j2)| {
            let before = slice(&a, i1.saturating_sub(CONTEXT_CHARS), i1);
            match tag {
                Tag::Replace => TextEdit::Replace {
                    position: i1,
                    old_length: i2 - i1,
                    old_text: slice(&a, i1, i2),
                    new_text: slice(&b, j1, j2),
                    context_before: before,
                    context_after: slice(&a, i2, i2 + CONTEXT_CHARS),
                },
                Tag::Delete => TextEdit::Delete {
                    position: i1,
                    length: i2 - i1,
                    text: slice(&a, i1, i2),
                    context_before: before,
                    context_after: slice(&a, i2, i2 + CONTEXT_CHARS),
                },
                Tag::Insert => TextEdit::Insert {
                    position: i1,
                    text: slice(&b, j1, j2),
                    context_before: before,
                    context_after: slice(&a, i1, i1 + CONTEXT_CHARS),
                },
            }
        })
        .collect()
}

fn slice(chars: &[char], start: usize, end: usize) -> String {
    let end = end.min(chars.len());
    let start = start.min(end);
    chars[start..end].iter().collect()
}

/// Non-equal opcodes as `(tag, i1, i2, j1, j2)`.
fn opcodes(a: &[char], b: &[char]) -> Vec<(Tag, usize, usize, usize, usize)> {
    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);

    for (ai, bj, size) in matching_blocks(a, b) {
        let tag = match (i < ai, j < bj) {
            (true, true) => Some(Tag::Replace),
            (true, false) => Some(Tag::Delete),
            (false, true) => Some(Tag::Insert),
            (false, false) => None,
        };
        if let Some(tag) = tag {
            ops.push((tag, i, ai, j, bj));
        }
        i = ai + size;
        j = bj + size;
    }
    ops
}

/// Matching blocks `(i, j, size)`, sorted, adjacent blocks merged, terminated
/// by a zero-length sentinel at `(a.len(), b.len())`.
fn matching_blocks(a: &[char], b: &[char]) -> Vec<(usize, usize, usize)> {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut queue = vec![(0, a.len(), 0, b.len())];
    let mut blocks = Vec::new();

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        blocks.push((i, j, k));
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    blocks.sort_unstable();

    let mut merged = Vec::with_capacity(blocks.len() + 1);
    let (mut i1, mut j1, mut k1) = (0, 0, 0);
    for (i2, j2, k2) in blocks {
        if i1 + k1 == i2 && j1 + k1 == j2 {
            k1 += k2;
        } else {
            if k1 > 0 {
                merged.push((i1, j1, k1));
            }
            (i1, j1, k1) = (i2, j2, k2);
        }
    }
    if k1 > 0 {
        merged.push((i1, j1, k1));
    }
    merged.push((a.len(), b.len(), 0));
    merged
}

/// Longest common run in `a[alo..ahi]` and `b[blo..bhi]`; earliest in `a`, then
/// earliest in `b`, on ties.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                next.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        j2len = next;
    }

    (best_i, best_j, best_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_has_no_edits() {
        assert!(text_diff("same text", "same text").is_empty());
        assert!(text_diff("", "").is_empty());
    }

    #[test]
    fn test_replace_span() {
        let edits = text_diff("Status: OK", "Status: down");
        assert_eq!(edits.len(), 1);
        match &edits[0] {
            TextEdit::Replace { position, old_text, new_text, context_before, .. } => {
                assert_eq!(*position, 8);
                assert_eq!(old_text, "OK");
                assert_eq!(new_text, "down");
                assert_eq!(context_before, "Status: ");
            }
            other => panic!("expected replace, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_span() {
        let edits = text_diff("hello world", "hello brave world");
        assert_eq!(
            edits,
            vec![TextEdit::Insert {
                position: 6,
                text: "brave ".into(),
                context_before: "hello ".into(),
                context_after: "world".into(),
            }]
        );
    }

    #[test]
    fn test_delete_span() {
        let edits = text_diff("one two three", "one three");
        assert_eq!(edits.len(), 1);
        match &edits[0] {
            TextEdit::Delete { position, length, text, .. } => {
                assert_eq!(*position, 3);
                assert_eq!(*length, 4);
                assert_eq!(text, " two");
            }
            other => panic!("expected delete, got {:?}", other),
        }
    }

    #[test]
    fn test_context_is_bounded() {
        let prefix = "x".repeat(120);
        let suffix = "y".repeat(120);
        let old = format!("{}A{}", prefix, suffix);
        let new = format!("{}B{}", prefix, suffix);
        let edits = text_diff(&old, &new);

        assert_eq!(edits.len(), 1);
        match &edits[0] {
            TextEdit::Replace { position, context_before, context_after, .. } => {
                assert_eq!(*position, 120);
                assert_eq!(context_before.chars().count(), CONTEXT_CHARS);
                assert_eq!(context_after.chars().count(), CONTEXT_CHARS);
            }
            other => panic!("expected replace, got {:?}", other),
        }
    }

    #[test]
    fn test_positions_count_characters() {
        let edits = text_diff("héllo wörld", "héllo wörld!");
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].position(), 11);
    }

    #[test]
    fn test_from_and_to_empty() {
        let inserted = text_diff("", "new");
        assert!(matches!(&inserted[0], TextEdit::Insert { text, .. } if text == "new"));

        let deleted = text_diff("old", "");
        assert!(matches!(&deleted[0], TextEdit::Delete { length: 3, .. }));
    }

    #[test]
    fn test_serialized_shape() {
        let edits = text_diff("a", "b");
        let value = serde_json::to_value(&edits).unwrap();
        assert_eq!(value[0]["op"], "replace");
        assert_eq!(value[0]["old_length"], 1);
    }
}
