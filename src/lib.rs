//! prompt-tree — Provenance-Preserving Prompt Templates
//!
//! Don't diff the text, diff the template.
//!
//! Structured prompts built from static segments and typed interpolations:
//! - Immutable tree with key index and single-parent nested trees
//! - Render to a flat chunk IR where every chunk names its source element
//! - Structural diff with keyed matching, move detection and leaf text edits
//! - Chunk-level rendered diff aligned by tree position, with metrics
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Tree construction options and render configuration |
//! | [`diff`] | Structural tree alignment, `NodeDelta`, `DiffStats` |
//! | [`element`] | Element variants, ids, keys, payloads, metadata |
//! | [`error`] | Error taxonomy and crate `Result` |
//! | [`export`] | JSON export of trees, values, provenance and diff results |
//! | [`hints`] | Format-spec key derivation and render-hint parsing |
//! | [`ir`] | Chunks, the merge / wrap algebra, source spans |
//! | [`metrics`] | Edit count, span, char ratio, order score, render deltas |
//! | [`render`] | Tree → IR rendering with header / xml wrapping, span lookups |
//! | [`render_diff`] | Signature-aligned chunk diff and per-element summaries |
//! | [`sequence`] | Longest-matching-block opcode diff |
//! | [`tree`] | Template input, tree container, node view |
//!
//! # Quick Start
//!
//! ```
//! use prompt_tree::{diff_trees, ChangeStatus, RenderConfig, Template, Tree, TreeOptions};
//!
//! let before = Tree::build(
//!     Template::new().text("Hello ").value("name", "name", "Ada"),
//!     &TreeOptions::default(),
//! )?;
//! let after = Tree::build(
//!     Template::new().text("Hello dear ").value("name", "name", "Ada"),
//!     &TreeOptions::default(),
//! )?;
//! assert_eq!(after.render_text(&RenderConfig::default())?, "Hello dear Ada");
//!
//! // Only the static segment changed
//! let diff = diff_trees(&before, &after);
//! assert_eq!(diff.root.status, ChangeStatus::Modified);
//! assert_eq!(diff.stats.text_changes, 1);
//! # Ok::<(), prompt_tree::Error>(())
//! ```
//!
//! Author: Moroya Sakamoto

pub mod config;
pub mod diff;
pub mod element;
pub mod error;
pub mod export;
pub mod hints;
pub mod ir;
pub mod metrics;
pub mod render;
pub mod render_diff;
pub mod sequence;
pub mod tree;

pub use config::{RenderConfig, TreeOptions};
pub use diff::{align, diff_trees, diff_trees_with, ChangeStatus, DiffStats, NodeDelta, PromptDiff};
pub use element::{
    Conversion, Element, ElementKind, ElementType, Key, NodeId, OpaquePayload, SourceLocation,
};
pub use error::{Error, Result};
pub use hints::{DefaultSpecParser, FormatSpecParser, RenderHints};
pub use ir::{Chunk, ChunkKind, IntermediateRepresentation, SourceSpan};
pub use metrics::{DiffMetrics, RenderMetrics};
pub use render::RenderContext;
pub use render_diff::{diff_rendered, diff_rendered_with, ChunkDelta, ElementRenderDelta, RenderDiff};
pub use sequence::{diff_text, OpTag, TextDiff};
pub use tree::{Interpolation, Node, NodeType, Template, Tree, Value};
