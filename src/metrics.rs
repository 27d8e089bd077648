//! Diff metrics
//!
//! Distance-like scores over a structural diff (edit count, changed span,
//! character ratio, sibling order inversions) and character accounting for
//! the rendered diff (whitespace and non-whitespace deltas, chunk drift).
//!
//! Author: Moroya Sakamoto

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::Serialize;

use crate::config::RenderConfig;
use crate::diff::{ChangeStatus, NodeDelta};
use crate::element::NodeId;
use crate::sequence::{opcodes, OpTag};
use crate::tree::{Node, Tree};

/// Scores over a structural diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiffMetrics {
    /// Weighted count of structural edits
    pub edit_count: f64,
    /// Rendered characters touched by the edits
    pub span_chars: usize,
    /// `span_chars` over the rendered size of the before tree
    pub char_ratio: f64,
    /// Normalized sibling-order inversions, 0.0 when nothing reordered
    pub order_score: f64,
}

/// Node lookup and per-element rendered size for one side of a diff
struct Side<'a> {
    nodes: HashMap<NodeId, Node<'a>>,
    chars: HashMap<NodeId, usize>,
    total: usize,
}

impl<'a> Side<'a> {
    fn new(tree: &'a Tree, config: &RenderConfig) -> Self {
        let mut nodes = HashMap::new();
        tree.walk(&mut |node, _| {
            nodes.insert(node.id(), node);
        });
        let ir = tree.render(config);
        let mut chars: HashMap<NodeId, usize> = HashMap::new();
        for chunk in ir.chunks() {
            *chars.entry(chunk.element_id()).or_default() += chunk.char_len();
        }
        Self {
            nodes,
            chars,
            total: ir.char_len(),
        }
    }

    fn node(&self, id: Option<NodeId>) -> Option<Node<'a>> {
        id.and_then(|id| self.nodes.get(&id).copied())
    }

    /// Rendered characters attributed to a node and everything below it
    fn subtree_chars(&self, id: Option<NodeId>) -> usize {
        let Some(node) = self.node(id) else {
            return 0;
        };
        let ids: HashSet<NodeId> = node.subtree_ids().into_iter().collect();
        ids.iter().filter_map(|id| self.chars.get(id)).sum()
    }
}

#[derive(Default)]
struct Tally {
    edit_count: f64,
    span_chars: usize,
    inversions: usize,
    pairs: usize,
}

/// Score a delta tree against the trees it was computed from
pub fn diff_metrics(
    root: &NodeDelta,
    before: &Tree,
    after: &Tree,
    config: &RenderConfig,
) -> DiffMetrics {
    let before = Side::new(before, config);
    let after = Side::new(after, config);
    let mut tally = Tally::default();
    tally_delta(root, &before, &after, &mut tally);

    let denominator = if before.total > 0 {
        before.total
    } else {
        after.total.max(1)
    };
    DiffMetrics {
        edit_count: tally.edit_count,
        span_chars: tally.span_chars,
        char_ratio: tally.span_chars as f64 / denominator as f64,
        order_score: if tally.pairs == 0 {
            0.0
        } else {
            tally.inversions as f64 / tally.pairs as f64
        },
    }
}

fn tally_delta(delta: &NodeDelta, before: &Side<'_>, after: &Side<'_>, tally: &mut Tally) {
    match delta.status {
        // whole subtree counted once at its root
        ChangeStatus::Inserted => {
            tally.edit_count += 1.0;
            tally.span_chars += after.subtree_chars(delta.after_id);
            return;
        }
        ChangeStatus::Deleted => {
            tally.edit_count += 1.0;
            tally.span_chars += before.subtree_chars(delta.before_id);
            return;
        }
        _ => {}
    }

    if delta.moved {
        tally.edit_count += 1.0;
    }
    if delta.status == ChangeStatus::Modified {
        if delta.type_changed {
            tally.edit_count += 1.0;
            tally.span_chars += before
                .subtree_chars(delta.before_id)
                .max(after.subtree_chars(delta.after_id));
        } else if delta.has_text_changes() {
            tally.edit_count += 1.0;
            if let Some(diff) = &delta.text_diff {
                tally.span_chars += diff
                    .changes()
                    .map(|op| op.before.chars().count().max(op.after.chars().count()))
                    .sum::<usize>();
            }
        } else if !delta.attr_changes.is_empty() {
            let children_equal = delta
                .children
                .iter()
                .all(|c| c.status == ChangeStatus::Equal);
            tally.edit_count += if children_equal { 0.5 } else { 1.0 };
        }
    }

    if !delta.type_changed {
        if let (Some(b), Some(a)) = (before.node(delta.before_id), after.node(delta.after_id)) {
            if let Some((inversions, pairs)) = sibling_inversions(&b.children(), &a.children()) {
                tally.inversions += inversions;
                tally.pairs += pairs;
            }
        }
    }

    for child in &delta.children {
        tally_delta(child, before, after, tally);
    }
}

/// Inversions among content-matched siblings and the number of matched pairs
///
/// Siblings match greedily by content fingerprint, independent of the
/// (key, type) alignment. `None` when fewer than two siblings match.
pub fn sibling_inversions(before: &[Node<'_>], after: &[Node<'_>]) -> Option<(usize, usize)> {
    let mut after_by_print: HashMap<blake3::Hash, Vec<usize>> = HashMap::new();
    for (ni, child) in after.iter().enumerate() {
        after_by_print.entry(child.fingerprint()).or_default().push(ni);
    }
    let mut used = vec![false; after.len()];
    let mut order = Vec::new();
    for child in before {
        let found = after_by_print
            .get(&child.fingerprint())
            .and_then(|candidates| candidates.iter().copied().find(|&ni| !used[ni]));
        if let Some(ni) = found {
            used[ni] = true;
            order.push(ni);
        }
    }
    let n = order.len();
    if n < 2 {
        return None;
    }
    Some((count_inversions(&order), n * (n - 1) / 2))
}

fn count_inversions(order: &[usize]) -> usize {
    let mut count = 0;
    for (i, &x) in order.iter().enumerate() {
        count += order[i + 1..].iter().filter(|&&y| y < x).count();
    }
    count
}

// ── Rendered metrics ───────────────────────────────────────────────────

/// Character accounting over a rendered diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RenderMetrics {
    pub added_chars: usize,
    pub removed_chars: usize,
    pub whitespace_added: usize,
    pub whitespace_removed: usize,
    pub text_added: usize,
    pub text_removed: usize,
    /// `1 − |∩| / |∪|` of the before and after chunk signature sets
    pub chunk_drift: f64,
}

impl RenderMetrics {
    pub(crate) fn absorb(&mut self, delta: &CharDelta) {
        self.whitespace_added += delta.whitespace_added;
        self.whitespace_removed += delta.whitespace_removed;
        self.text_added += delta.text_added;
        self.text_removed += delta.text_removed;
        self.added_chars += delta.added();
        self.removed_chars += delta.removed();
    }
}

/// Added and removed characters split by whitespace class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharDelta {
    pub whitespace_added: usize,
    pub whitespace_removed: usize,
    pub text_added: usize,
    pub text_removed: usize,
}

impl CharDelta {
    pub fn added(&self) -> usize {
        self.whitespace_added + self.text_added
    }

    pub fn removed(&self) -> usize {
        self.whitespace_removed + self.text_removed
    }

    /// Everything in `text` counted as added
    pub fn inserted(text: &str) -> Self {
        let mut delta = Self::default();
        for token in tokens(text) {
            delta.add(token);
        }
        delta
    }

    /// Everything in `text` counted as removed
    pub fn deleted(text: &str) -> Self {
        let mut delta = Self::default();
        for token in tokens(text) {
            delta.remove(token);
        }
        delta
    }

    /// Token-level diff of a replaced pair
    pub fn between(before: &str, after: &str) -> Self {
        let a = tokens(before);
        let b = tokens(after);
        let mut delta = Self::default();
        for op in opcodes(&a, &b) {
            if op.tag == OpTag::Equal {
                continue;
            }
            for token in &a[op.i1..op.i2] {
                delta.remove(token);
            }
            for token in &b[op.j1..op.j2] {
                delta.add(token);
            }
        }
        delta
    }

    fn add(&mut self, token: &str) {
        let n = token.chars().count();
        if is_whitespace_run(token) {
            self.whitespace_added += n;
        } else {
            self.text_added += n;
        }
    }

    fn remove(&mut self, token: &str) {
        let n = token.chars().count();
        if is_whitespace_run(token) {
            self.whitespace_removed += n;
        } else {
            self.text_removed += n;
        }
    }
}

/// Split into alternating whitespace and non-whitespace runs
pub fn tokens(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        if prev.is_some_and(|p| p != ws) {
            out.push(&text[start..i]);
            start = i;
        }
        prev = Some(ws);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn is_whitespace_run(token: &str) -> bool {
    token.chars().next().is_some_and(char::is_whitespace)
}

/// Jaccard distance between two signature sets; 0.0 when both are empty
pub fn chunk_drift<T: Eq + Hash>(before: &[T], after: &[T]) -> f64 {
    let b: HashSet<&T> = before.iter().collect();
    let a: HashSet<&T> = after.iter().collect();
    let union = b.union(&a).count();
    if union == 0 {
        return 0.0;
    }
    1.0 - b.intersection(&a).count() as f64 / union as f64
}
