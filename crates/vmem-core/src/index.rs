//! Perceptual-hash nearest-match index.
//!
//! A BK-tree per hash length answers "closest hash within a threshold" without
//! scanning every stored hash. Ties on distance resolve to the entry inserted
//! first, matching the linear-scan contract kept in [`nearest_linear`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default maximum distance for a perceptual match.
pub const DEFAULT_THRESHOLD: u32 = 4;

/// How the distance between two perceptual hashes is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Popcount of the XOR of the decoded hash bits.
    #[default]
    Bitwise,
    /// Count of mismatched hex symbols at each position (legacy behaviour).
    Symbolwise,
}

impl DistanceMetric {
    /// Distance between two hashes, or `None` when they cannot be compared
    /// (different lengths, or non-hex input for the bitwise metric).
    pub fn distance(&self, a: &str, b: &str) -> Option<u32> {
        if a.len() != b.len() {
            return None;
        }
        match self {
            DistanceMetric::Bitwise => {
                let a = hex::decode(a).ok()?;
                let b = hex::decode(b).ok()?;
                Some(a.iter().zip(&b).map(|(x, y)| (x ^ y).count_ones()).sum())
            }
            DistanceMetric::Symbolwise => {
                Some(a.chars().zip(b.chars()).filter(|(x, y)| x != y).count() as u32)
            }
        }
    }
}

/// A candidate returned by a nearest-match query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMatch {
    pub id: String,
    pub distance: u32,
    pub sequence: i64,
}

#[derive(Debug)]
struct Node {
    hash: String,
    id: String,
    sequence: i64,
    children: BTreeMap<u32, usize>,
}

/// BK-tree keyed on perceptual hashes.
#[derive(Debug)]
struct BkTree {
    nodes: Vec<Node>,
}

impl BkTree {
    fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    fn insert(&mut self, metric: DistanceMetric, hash: String, id: String, sequence: i64) -> bool {
        let new_index = self.nodes.len();
        if self.nodes.is_empty() {
            // An uncomparable root would reject every later insert.
            if metric.distance(&hash, &hash).is_none() {
                return false;
            }
            self.nodes.push(Node { hash, id, sequence, children: BTreeMap::new() });
            return true;
        }

        let mut current = 0;
        loop {
            let Some(distance) = metric.distance(&self.nodes[current].hash, &hash) else {
                return false;
            };
            match self.nodes[current].children.get(&distance) {
                Some(&child) => current = child,
                None => {
                    self.nodes[current].children.insert(distance, new_index);
                    self.nodes.push(Node { hash, id, sequence, children: BTreeMap::new() });
                    return true;
                }
            }
        }
    }

    fn within(&self, metric: DistanceMetric, query: &str, threshold: u32, out: &mut Vec<IndexMatch>) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            let Some(distance) = metric.distance(&node.hash, query) else {
                continue;
            };
            if distance <= threshold {
                out.push(IndexMatch {
                    id: node.id.clone(),
                    distance,
                    sequence: node.sequence,
                });
            }
            let low = distance.saturating_sub(threshold);
            let high = distance.saturating_add(threshold);
            stack.extend(node.children.range(low..=high).map(|(_, &child)| child));
        }
    }
}

/// In-memory nearest-match index over perceptual hashes.
#[derive(Debug)]
pub struct PerceptualIndex {
    metric: DistanceMetric,
    trees: HashMap<usize, BkTree>,
    len: usize,
    last_sequence: i64,
}

impl PerceptualIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            trees: HashMap::new(),
            len: 0,
            last_sequence: 0,
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest insertion sequence seen so far.
    pub fn last_sequence(&self) -> i64 {
        self.last_sequence
    }

    /// Add a hash. Empty or uncomparable hashes are ignored.
    pub fn insert(&mut self, hash: &str, id: &str, sequence: i64) {
        self.last_sequence = self.last_sequence.max(sequence);
        if hash.is_empty() {
            return;
        }
        let inserted = self
            .trees
            .entry(hash.len())
            .or_insert_with(BkTree::new)
            .insert(self.metric, hash.to_string(), id.to_string(), sequence);
        if inserted {
            self.len += 1;
        }
    }

    /// Closest entry within `threshold`; ties go to the lowest sequence.
    pub fn nearest(&self, query: &str, threshold: u32) -> Option<IndexMatch> {
        let tree = self.trees.get(&query.len())?;
        let mut candidates = Vec::new();
        tree.within(self.metric, query, threshold, &mut candidates);
        candidates
            .into_iter()
            .min_by_key(|candidate| (candidate.distance, candidate.sequence))
    }
}

/// Reference scan: first-encountered candidate with the minimum distance.
pub fn nearest_linear<'a, I>(
    metric: DistanceMetric,
    query: &str,
    threshold: u32,
    candidates: I,
) -> Option<IndexMatch>
where
    I: IntoIterator<Item = (&'a str, &'a str, i64)>,
{
    let mut best: Option<IndexMatch> = None;
    for (id, hash, sequence) in candidates {
        if hash.is_empty() {
            continue;
        }
        let Some(distance) = metric.distance(query, hash) else {
            continue;
        };
        if distance <= threshold && best.as_ref().is_none_or(|b| distance < b.distance) {
            best = Some(IndexMatch {
                id: id.to_string(),
                distance,
                sequence,
            });
        }
    }
    best
}
