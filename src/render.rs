//! Rendering to chunks
//!
//! Trees render by rendering each element in order and merging with no
//! separator. Nested trees and list items render recursively; a header
//! directive on the containing element consumes one header level for
//! everything below it.
//!
//! Author: Moroya Sakamoto

use tracing::debug;

use crate::config::RenderConfig;
use crate::element::{Conversion, Element, ElementKind, Key, NodeId};
use crate::error::Result;
use crate::hints::RenderHints;
use crate::ir::{IntermediateRepresentation, SourceSpan};
use crate::tree::{Node, Tree};

/// Position of a render call inside the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    /// Interpolation keys from the root
    pub path: Vec<Key>,
    pub header_level: usize,
    pub max_header_level: usize,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl RenderContext {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            path: Vec::new(),
            header_level: 1,
            max_header_level: config.max_header_level,
        }
    }

    /// Context for the children of `key`; only a header consumes a level
    fn descend(&self, key: &Key, has_header: bool) -> Self {
        let mut path = self.path.clone();
        path.push(key.clone());
        Self {
            path,
            header_level: if has_header {
                self.header_level + 1
            } else {
                self.header_level
            },
            max_header_level: self.max_header_level,
        }
    }
}

impl Tree {
    pub fn render(&self, config: &RenderConfig) -> IntermediateRepresentation {
        let ir = self.render_in(&RenderContext::new(config));
        debug!(tree = %self.id(), chunks = ir.len(), "rendered tree");
        ir
    }

    /// Render at an explicit context
    pub fn render_in(&self, ctx: &RenderContext) -> IntermediateRepresentation {
        let element_irs = self.children().iter().map(|el| el.render(ctx)).collect();
        IntermediateRepresentation::merge(element_irs, "", self.id()).with_source(self.id())
    }

    /// Render to plain text; fails on opaque payloads
    pub fn render_text(&self, config: &RenderConfig) -> Result<String> {
        self.render(config).text()
    }
}

impl Element {
    pub fn render(&self, ctx: &RenderContext) -> IntermediateRepresentation {
        match self.kind() {
            ElementKind::Static { text } => {
                if text.is_empty() {
                    IntermediateRepresentation::empty()
                } else {
                    IntermediateRepresentation::from_text(text, self.id())
                }
            }
            ElementKind::TextLeaf { info, value } => {
                let text = match info.conversion {
                    Some(conversion) => convert(value, conversion),
                    None => value.clone(),
                };
                let hints = self.hints(&info.render_hints);
                let ir = IntermediateRepresentation::from_text(&text, self.id());
                apply_render_hints(&ir, &hints, ctx, self.id())
            }
            ElementKind::NestedTree { info, value } => {
                let hints = self.hints(&info.render_hints);
                let inner = value.render_in(&ctx.descend(self.key(), hints.has_header()));
                apply_render_hints(&inner, &hints, ctx, self.id())
            }
            ElementKind::ListOfTrees {
                info,
                items,
                separator,
            } => {
                let hints = self.hints(&info.render_hints);
                let item_ctx = ctx.descend(self.key(), hints.has_header());
                let item_irs = items.iter().map(|item| item.render_in(&item_ctx)).collect();
                let merged = IntermediateRepresentation::merge(item_irs, separator, self.id());
                apply_render_hints(&merged, &hints, ctx, self.id())
            }
            ElementKind::OpaqueLeaf { payload, .. } => {
                IntermediateRepresentation::from_payload(payload.clone(), self.id())
            }
        }
    }

    fn hints(&self, render_hints: &str) -> RenderHints {
        RenderHints::parse(render_hints, &self.key().to_string())
    }
}

/// Wrap `ir` per its hints: xml tag inside, markdown header outside
///
/// Wrapper chunks belong to `element_id`, not to the wrapped content.
pub fn apply_render_hints(
    ir: &IntermediateRepresentation,
    hints: &RenderHints,
    ctx: &RenderContext,
    element_id: NodeId,
) -> IntermediateRepresentation {
    let mut out = match &hints.xml {
        Some(tag) => ir.wrap(&format!("<{tag}>\n"), &format!("\n</{tag}>"), element_id),
        None => ir.clone(),
    };
    if let Some(title) = &hints.header {
        let level = ctx.header_level.min(ctx.max_header_level);
        out = out.wrap(&format!("{} {title}\n", "#".repeat(level)), "", element_id);
    }
    out
}

/// Apply a `!s` / `!r` / `!a` conversion to a text value
pub fn convert(text: &str, conversion: Conversion) -> String {
    match conversion {
        Conversion::Str => String::from(text),
        Conversion::Repr => quote(text, false),
        Conversion::Ascii => quote(text, true),
    }
}

fn quote(text: &str, ascii_only: bool) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if c.is_ascii() => out.push(c),
            c if ascii_only || c.is_control() => {
                let code = c as u32;
                if code <= 0xff {
                    out.push_str(&format!("\\x{code:02x}"));
                } else if code <= 0xffff {
                    out.push_str(&format!("\\u{code:04x}"));
                } else {
                    out.push_str(&format!("\\U{code:08x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// ── Source spans ──

impl Tree {
    /// Tree reached by following `path` from this one
    ///
    /// A name steps into a nested tree; a list name must be followed by the
    /// index of one item.
    pub fn resolve(&self, path: &[Key]) -> Option<&Tree> {
        let mut tree = self;
        let mut steps = path.iter();
        while let Some(step) = steps.next() {
            let Key::Name(name) = step else {
                return None;
            };
            let element = tree.get_all(name).ok()?.into_iter().next()?;
            tree = match element.kind() {
                ElementKind::NestedTree { value, .. } => value.as_ref(),
                ElementKind::ListOfTrees { items, .. } => match steps.next()? {
                    Key::Index(index) => items.get(*index)?.as_ref(),
                    Key::Name(_) => return None,
                },
                _ => return None,
            };
        }
        Some(tree)
    }

    /// Output range of the first element at `path` with `key`
    ///
    /// `ir` must be a render of this tree. Covers the element's wrappers and
    /// everything nested below it; `None` when the element rendered nothing.
    pub fn span_for_key(
        &self,
        ir: &IntermediateRepresentation,
        path: &[Key],
        key: &Key,
    ) -> Option<SourceSpan> {
        let tree = self.resolve(path)?;
        let element = tree.children().iter().find(|el| el.key() == key)?;
        element_span(ir, element)
    }

    /// Output range of static segment `index` of the tree at `path`
    pub fn static_span(
        &self,
        ir: &IntermediateRepresentation,
        path: &[Key],
        index: usize,
    ) -> Option<SourceSpan> {
        let tree = self.resolve(path)?;
        let element = tree
            .children()
            .iter()
            .find(|el| !el.is_interpolation() && *el.key() == Key::Index(index))?;
        element_span(ir, element)
    }

    /// Output range of the first interpolation keyed `key` at `path`
    pub fn interpolation_span(
        &self,
        ir: &IntermediateRepresentation,
        path: &[Key],
        key: &str,
    ) -> Option<SourceSpan> {
        let tree = self.resolve(path)?;
        let element = tree.get_all(key).ok()?.into_iter().next()?;
        element_span(ir, element)
    }
}

fn element_span(ir: &IntermediateRepresentation, element: &Element) -> Option<SourceSpan> {
    ir.span_covering(element.id(), &Node::Element(element).subtree_ids())
}
