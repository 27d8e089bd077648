//! Intermediate representation
//!
//! A rendered tree is a flat sequence of chunks. Every chunk names the
//! element it came from, so any span of output text can be traced back to
//! a static segment, an interpolation, or the structural element whose
//! separator or wrapper produced it.
//!
//! Author: Moroya Sakamoto

use serde::Serialize;

use crate::element::{NodeId, OpaquePayload};
use crate::error::{Error, Result};

/// Text produced by one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub text: String,
    pub element_id: NodeId,
}

/// Opaque payload produced by one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageChunk {
    pub payload: OpaquePayload,
    pub element_id: NodeId,
}

/// Chunk kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Text,
    Image,
}

/// Atomic unit of rendered output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Chunk {
    Text(TextChunk),
    Image(ImageChunk),
}

impl Chunk {
    pub fn text(text: &str, element_id: NodeId) -> Self {
        Chunk::Text(TextChunk {
            text: String::from(text),
            element_id,
        })
    }

    pub fn image(payload: OpaquePayload, element_id: NodeId) -> Self {
        Chunk::Image(ImageChunk {
            payload,
            element_id,
        })
    }

    pub fn element_id(&self) -> NodeId {
        match self {
            Chunk::Text(c) => c.element_id,
            Chunk::Image(c) => c.element_id,
        }
    }

    pub fn kind(&self) -> ChunkKind {
        match self {
            Chunk::Text(_) => ChunkKind::Text,
            Chunk::Image(_) => ChunkKind::Image,
        }
    }

    /// Text content; `None` for payload chunks
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Chunk::Text(c) => Some(&c.text),
            Chunk::Image(_) => None,
        }
    }

    /// Text content, empty for payload chunks
    pub fn text_or_empty(&self) -> &str {
        self.as_text().unwrap_or("")
    }

    /// Character count; payload chunks count zero
    pub fn char_len(&self) -> usize {
        self.as_text().map_or(0, |t| t.chars().count())
    }

    /// Same text, or same payload identity
    pub fn same_content(&self, other: &Chunk) -> bool {
        match (self, other) {
            (Chunk::Text(a), Chunk::Text(b)) => a.text == b.text,
            (Chunk::Image(a), Chunk::Image(b)) => a.payload == b.payload,
            _ => false,
        }
    }
}

/// Character range of rendered output and the element it traces to
///
/// Offsets count Unicode scalar values; a payload chunk spans zero
/// characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub element_id: NodeId,
    /// First chunk covered
    pub chunk: usize,
}

impl SourceSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position < self.end
    }
}

/// Ordered chunks plus the tree they were rendered from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntermediateRepresentation {
    chunks: Vec<Chunk>,
    /// Root tree id; `None` for fragments built during merge and wrap
    source: Option<NodeId>,
}

impl IntermediateRepresentation {
    pub fn new(chunks: Vec<Chunk>, source: Option<NodeId>) -> Self {
        Self { chunks, source }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str, element_id: NodeId) -> Self {
        Self::new(vec![Chunk::text(text, element_id)], None)
    }

    pub fn from_payload(payload: OpaquePayload, element_id: NodeId) -> Self {
        Self::new(vec![Chunk::image(payload, element_id)], None)
    }

    pub fn with_source(mut self, source: NodeId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenate IRs, one separator chunk between each pair of non-empty
    /// neighbours; an empty separator adds nothing
    pub fn merge(
        irs: Vec<IntermediateRepresentation>,
        separator: &str,
        separator_element_id: NodeId,
    ) -> Self {
        let mut chunks = Vec::with_capacity(irs.iter().map(|ir| ir.len() + 1).sum());
        let mut first = true;
        for ir in irs.into_iter().filter(|ir| !ir.is_empty()) {
            if !first && !separator.is_empty() {
                chunks.push(Chunk::text(separator, separator_element_id));
            }
            first = false;
            chunks.extend(ir.chunks);
        }
        Self::new(chunks, None)
    }

    /// New IR with `prefix` and `suffix` chunks around this one; empty
    /// strings add nothing
    pub fn wrap(&self, prefix: &str, suffix: &str, element_id: NodeId) -> Self {
        let mut chunks = Vec::with_capacity(self.chunks.len() + 2);
        if !prefix.is_empty() {
            chunks.push(Chunk::text(prefix, element_id));
        }
        chunks.extend(self.chunks.iter().cloned());
        if !suffix.is_empty() {
            chunks.push(Chunk::text(suffix, element_id));
        }
        Self::new(chunks, self.source)
    }

    /// Full text; fails on the first payload chunk
    pub fn text(&self) -> Result<String> {
        let mut out = String::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Text(c) => out.push_str(&c.text),
                Chunk::Image(c) => {
                    return Err(Error::UnrenderablePayload {
                        element: c.element_id,
                    })
                }
            }
        }
        Ok(out)
    }

    /// Total characters, payload chunks counting zero
    pub fn char_len(&self) -> usize {
        self.chunks.iter().map(Chunk::char_len).sum()
    }

    /// Chunks attributed to one element, wrappers included
    pub fn chunks_for_element(&self, element_id: NodeId) -> Vec<&Chunk> {
        self.chunks
            .iter()
            .filter(|c| c.element_id() == element_id)
            .collect()
    }

    // ── Source map ──

    /// One span per chunk, in output order
    pub fn spans(&self) -> Vec<SourceSpan> {
        let mut start = 0;
        self.chunks
            .iter()
            .enumerate()
            .map(|(chunk, c)| {
                let end = start + c.char_len();
                let span = SourceSpan {
                    start,
                    end,
                    element_id: c.element_id(),
                    chunk,
                };
                start = end;
                span
            })
            .collect()
    }

    /// Chunk span covering a character offset of the rendered text
    pub fn span_at(&self, position: usize) -> Option<SourceSpan> {
        self.spans().into_iter().find(|span| span.contains(position))
    }

    /// Smallest range covering every chunk produced by `ids`, attributed to
    /// `element_id`; `None` when none of them produced a chunk
    pub fn span_covering(&self, element_id: NodeId, ids: &[NodeId]) -> Option<SourceSpan> {
        let mut covered = self
            .spans()
            .into_iter()
            .filter(|span| ids.contains(&span.element_id));
        let first = covered.next()?;
        let end = covered.last().map_or(first.end, |span| span.end);
        Some(SourceSpan {
            start: first.start,
            end,
            element_id,
            chunk: first.chunk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(ir: &IntermediateRepresentation) -> Vec<&str> {
        ir.chunks().iter().map(Chunk::text_or_empty).collect()
    }

    #[test]
    fn test_merge_inserts_separators_between_non_empty() {
        let sep_id = NodeId::new();
        let a = IntermediateRepresentation::from_text("a", NodeId::new());
        let b = IntermediateRepresentation::from_text("b", NodeId::new());
        let merged = IntermediateRepresentation::merge(
            vec![a, IntermediateRepresentation::empty(), b],
            ", ",
            sep_id,
        );
        assert_eq!(texts(&merged), vec!["a", ", ", "b"]);
        assert_eq!(merged.chunks()[1].element_id(), sep_id);
    }

    #[test]
    fn test_merge_empty_separator_adds_nothing() {
        let a = IntermediateRepresentation::from_text("a", NodeId::new());
        let b = IntermediateRepresentation::from_text("b", NodeId::new());
        let merged = IntermediateRepresentation::merge(vec![a, b], "", NodeId::new());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_single_is_identity() {
        let ir = IntermediateRepresentation::from_text("only", NodeId::new());
        let merged = IntermediateRepresentation::merge(vec![ir.clone()], "", NodeId::new());
        assert_eq!(merged.chunks(), ir.chunks());
    }

    #[test]
    fn test_wrap_attributes_to_wrapper() {
        let content_id = NodeId::new();
        let wrapper_id = NodeId::new();
        let ir = IntermediateRepresentation::from_text("body", content_id);
        let wrapped = ir.wrap("<x>\n", "\n</x>", wrapper_id);
        assert_eq!(texts(&wrapped), vec!["<x>\n", "body", "\n</x>"]);
        assert_eq!(wrapped.chunks()[0].element_id(), wrapper_id);
        assert_eq!(wrapped.chunks()[1].element_id(), content_id);
        assert_eq!(wrapped.chunks()[2].element_id(), wrapper_id);
        // original untouched
        assert_eq!(ir.len(), 1);
        assert_eq!(wrapped.chunks_for_element(wrapper_id).len(), 2);
    }

    #[test]
    fn test_wrap_with_empty_strings_is_noop() {
        let ir = IntermediateRepresentation::from_text("body", NodeId::new());
        assert_eq!(ir.wrap("", "", NodeId::new()), ir);
    }

    #[test]
    fn test_spans_track_char_offsets() {
        let (a, img, b) = (NodeId::new(), NodeId::new(), NodeId::new());
        let ir = IntermediateRepresentation::new(
            vec![
                Chunk::text("héllo ", a),
                Chunk::image(OpaquePayload::new(vec![1u8], "png"), img),
                Chunk::text("world", b),
            ],
            None,
        );
        let spans = ir.spans();
        assert_eq!((spans[0].start, spans[0].end), (0, 6));
        assert!(spans[1].is_empty());
        assert_eq!((spans[1].start, spans[2].start, spans[2].end), (6, 6, 11));

        assert_eq!(ir.span_at(1).unwrap().element_id, a);
        // payload spans are zero-length and never hit
        assert_eq!(ir.span_at(6).unwrap().element_id, b);
        assert_eq!(ir.span_at(6).unwrap().chunk, 2);
        assert!(ir.span_at(11).is_none());

        let covering = ir.span_covering(a, &[a, b]).unwrap();
        assert_eq!((covering.start, covering.end, covering.chunk), (0, 11, 0));
        assert_eq!(covering.element_id, a);
        assert!(ir.span_covering(a, &[NodeId::new()]).is_none());
    }

    #[test]
    fn test_text_fails_on_payload() {
        let img_id = NodeId::new();
        let ir = IntermediateRepresentation::merge(
            vec![
                IntermediateRepresentation::from_text("see: ", NodeId::new()),
                IntermediateRepresentation::from_payload(
                    OpaquePayload::new(vec![0u8; 4], "png"),
                    img_id,
                ),
            ],
            "",
            NodeId::new(),
        );
        assert_eq!(
            ir.text(),
            Err(Error::UnrenderablePayload { element: img_id })
        );
        assert_eq!(ir.char_len(), 5);
    }

    #[test]
    fn test_chunk_json_shape() {
        let id = NodeId::new();
        let value = serde_json::to_value(Chunk::text("hi", id)).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "hi");
        assert_eq!(value["element_id"], id.to_string());
    }
}
