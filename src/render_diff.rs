//! Rendered diff
//!
//! Diffs the flat chunk sequences of two renders. Chunks align by their
//! structural signature (chunk kind plus the source element's path in its
//! tree), never by text, so a reworded section still lines up with its old
//! self. Content decides the final op:
//! - signature-equal pair with different content → `replace`
//! - pair inside a signature `replace` run with identical content → `equal`
//! - unbalanced tail of a `replace` run → `delete` then `insert`
//! - short equal run with edits on both sides → `replace`, one edit region
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::RenderConfig;
use crate::element::NodeId;
use crate::ir::{Chunk, ChunkKind, IntermediateRepresentation};
use crate::metrics::{chunk_drift, CharDelta, RenderMetrics};
use crate::sequence::{opcodes, OpTag};
use crate::tree::{Node, Tree};

/// Chunk kind plus source path
pub type Signature = (ChunkKind, String);

/// One aligned chunk pair, or one unmatched chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkDelta {
    pub op: OpTag,
    pub before: Option<Chunk>,
    pub after: Option<Chunk>,
}

impl ChunkDelta {
    fn new(op: OpTag, before: Option<&Chunk>, after: Option<&Chunk>) -> Self {
        Self {
            op,
            before: before.cloned(),
            after: after.cloned(),
        }
    }

    /// After-side element, or before-side when deleted
    pub fn element_id(&self) -> Option<NodeId> {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(Chunk::element_id)
    }

    /// Character accounting for this op
    pub fn char_delta(&self) -> CharDelta {
        let before = self.before.as_ref().map_or("", Chunk::text_or_empty);
        let after = self.after.as_ref().map_or("", Chunk::text_or_empty);
        match self.op {
            OpTag::Equal => CharDelta::default(),
            OpTag::Insert => CharDelta::inserted(after),
            OpTag::Delete => CharDelta::deleted(before),
            OpTag::Replace => CharDelta::between(before, after),
        }
    }
}

/// Per-op counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpCounts {
    pub equal: usize,
    pub insert: usize,
    pub delete: usize,
    pub replace: usize,
}

impl OpCounts {
    pub fn bump(&mut self, op: OpTag) {
        match op {
            OpTag::Equal => self.equal += 1,
            OpTag::Insert => self.insert += 1,
            OpTag::Delete => self.delete += 1,
            OpTag::Replace => self.replace += 1,
        }
    }

    pub fn get(&self, op: OpTag) -> usize {
        match op {
            OpTag::Equal => self.equal,
            OpTag::Insert => self.insert,
            OpTag::Delete => self.delete,
            OpTag::Replace => self.replace,
        }
    }
}

/// Everything the rendered diff did to one element's chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementRenderDelta {
    pub element_id: NodeId,
    pub operations: OpCounts,
    pub before_text: String,
    pub after_text: String,
    pub added_chars: usize,
    pub removed_chars: usize,
}

impl ElementRenderDelta {
    fn new(element_id: NodeId) -> Self {
        Self {
            element_id,
            operations: OpCounts::default(),
            before_text: String::new(),
            after_text: String::new(),
            added_chars: 0,
            removed_chars: 0,
        }
    }

    fn register(&mut self, delta: &ChunkDelta, chars: &CharDelta) {
        self.operations.bump(delta.op);
        if let Some(chunk) = &delta.before {
            self.before_text.push_str(chunk.text_or_empty());
        }
        if let Some(chunk) = &delta.after {
            self.after_text.push_str(chunk.text_or_empty());
        }
        self.added_chars += chars.added();
        self.removed_chars += chars.removed();
    }

    /// Net change in character count
    pub fn text_delta(&self) -> usize {
        self.after_text
            .chars()
            .count()
            .abs_diff(self.before_text.chars().count())
    }
}

/// Chunk-level diff of two renders
#[derive(Debug, Clone, Serialize)]
pub struct RenderDiff {
    pub before: IntermediateRepresentation,
    pub after: IntermediateRepresentation,
    pub operations: Vec<ChunkDelta>,
    /// First-seen order
    pub element_summaries: Vec<ElementRenderDelta>,
    pub metrics: RenderMetrics,
}

impl RenderDiff {
    pub fn summary(&self, element_id: NodeId) -> Option<&ElementRenderDelta> {
        self.element_summaries
            .iter()
            .find(|s| s.element_id == element_id)
    }

    pub fn has_changes(&self) -> bool {
        self.operations.iter().any(|d| d.op != OpTag::Equal)
    }
}

impl fmt::Display for RenderDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for delta in &self.operations {
            let before = delta.before.as_ref().map_or("", Chunk::text_or_empty);
            let after = delta.after.as_ref().map_or("", Chunk::text_or_empty);
            let element = delta.element_id().map(|id| id.to_string()).unwrap_or_default();
            writeln!(
                f,
                "{:<8}{element}  {before:?} → {after:?}",
                delta.op.as_str()
            )?;
        }
        Ok(())
    }
}

// ── Signatures ─────────────────────────────────────────────────────────

fn segment(node: &Node<'_>) -> String {
    let key = node
        .key()
        .map_or_else(|| String::from("<root>"), |k| k.to_string());
    format!("{}:{key}:{}", node.node_type().as_str(), node.position())
}

/// Element id → `/`-joined `{type}:{key}:{position}` path from the root
pub fn signature_paths(tree: &Tree) -> HashMap<NodeId, String> {
    let mut paths = HashMap::new();
    tree.walk(&mut |node, ancestors| {
        let path = ancestors
            .iter()
            .chain(std::iter::once(&node))
            .map(segment)
            .collect::<Vec<_>>()
            .join("/");
        paths.insert(node.id(), path);
    });
    paths
}

/// Signature of every chunk of `ir`
pub fn chunk_signatures(
    ir: &IntermediateRepresentation,
    paths: &HashMap<NodeId, String>,
) -> Vec<Signature> {
    ir.chunks()
        .iter()
        .map(|chunk| {
            let path = paths.get(&chunk.element_id()).cloned().unwrap_or_default();
            (chunk.kind(), path)
        })
        .collect()
}

// ── Chunk alignment ────────────────────────────────────────────────────

fn content_op(before: &Chunk, after: &Chunk) -> OpTag {
    if before.same_content(after) {
        OpTag::Equal
    } else {
        OpTag::Replace
    }
}

/// Align two chunk sequences by signature, then classify by content
pub fn diff_chunks(
    before: &[Chunk],
    before_sigs: &[Signature],
    after: &[Chunk],
    after_sigs: &[Signature],
) -> Vec<ChunkDelta> {
    let mut deltas = Vec::with_capacity(before.len().max(after.len()));
    for op in opcodes(before_sigs, after_sigs) {
        let (b_run, a_run) = (&before[op.i1..op.i2], &after[op.j1..op.j2]);
        match op.tag {
            OpTag::Equal | OpTag::Replace => {
                let paired = b_run.len().min(a_run.len());
                for (b, a) in b_run.iter().zip(a_run) {
                    let tag = content_op(b, a);
                    if tag != op.tag {
                        trace!(from = op.tag.as_str(), to = tag.as_str(), "reclassified chunk pair");
                    }
                    deltas.push(ChunkDelta::new(tag, Some(b), Some(a)));
                }
                for b in &b_run[paired..] {
                    deltas.push(ChunkDelta::new(OpTag::Delete, Some(b), None));
                }
                for a in &a_run[paired..] {
                    deltas.push(ChunkDelta::new(OpTag::Insert, None, Some(a)));
                }
            }
            OpTag::Delete => {
                for b in b_run {
                    deltas.push(ChunkDelta::new(OpTag::Delete, Some(b), None));
                }
            }
            OpTag::Insert => {
                for a in a_run {
                    deltas.push(ChunkDelta::new(OpTag::Insert, None, Some(a)));
                }
            }
        }
    }
    deltas
}

/// Fold short equal runs that sit between two edits into one edit region
///
/// Runs at the start or end of the sequence stay `equal`; `max_island == 0`
/// leaves every pair as classified.
pub fn absorb_equal_islands(deltas: &mut [ChunkDelta], max_island: usize) {
    if max_island == 0 {
        return;
    }
    let mut i = 0;
    while i < deltas.len() {
        if deltas[i].op != OpTag::Equal {
            i += 1;
            continue;
        }
        let start = i;
        while i < deltas.len() && deltas[i].op == OpTag::Equal {
            i += 1;
        }
        if start > 0 && i < deltas.len() && i - start <= max_island {
            trace!(start, len = i - start, "equal island joins edit region");
            for delta in &mut deltas[start..i] {
                delta.op = OpTag::Replace;
            }
        }
    }
}

/// Rendered diff with the default render configuration
pub fn diff_rendered(before: &Tree, after: &Tree) -> RenderDiff {
    diff_rendered_with(before, after, &RenderConfig::default())
}

/// Render both trees and diff their chunks
pub fn diff_rendered_with(before: &Tree, after: &Tree, config: &RenderConfig) -> RenderDiff {
    let before_ir = before.render(config);
    let after_ir = after.render(config);
    let before_sigs = chunk_signatures(&before_ir, &signature_paths(before));
    let after_sigs = chunk_signatures(&after_ir, &signature_paths(after));
    let mut operations =
        diff_chunks(before_ir.chunks(), &before_sigs, after_ir.chunks(), &after_sigs);
    absorb_equal_islands(&mut operations, config.max_equal_island);

    let mut metrics = RenderMetrics {
        chunk_drift: chunk_drift(&before_sigs, &after_sigs),
        ..RenderMetrics::default()
    };
    let mut element_summaries: Vec<ElementRenderDelta> = Vec::new();
    let mut slots: HashMap<NodeId, usize> = HashMap::new();
    for delta in &operations {
        let chars = delta.char_delta();
        metrics.absorb(&chars);
        let Some(element_id) = delta.element_id() else {
            continue;
        };
        let slot = *slots.entry(element_id).or_insert_with(|| {
            element_summaries.push(ElementRenderDelta::new(element_id));
            element_summaries.len() - 1
        });
        element_summaries[slot].register(delta, &chars);
    }

    debug!(
        before = %before.id(),
        after = %after.id(),
        operations = operations.len(),
        added = metrics.added_chars,
        removed = metrics.removed_chars,
        "diffed renders"
    );

    RenderDiff {
        before: before_ir,
        after: after_ir,
        operations,
        element_summaries,
        metrics,
    }
}
