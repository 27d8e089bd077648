//! Error taxonomy
//!
//! Every failure in the crate is local and synchronous: construction-time
//! validation, key lookups, and the one rendering failure for opaque payloads.
//! Callers always see the first violation.
//!
//! Author: Moroya Sakamoto

use thiserror::Error;

use crate::element::NodeId;

/// Crate-wide result alias
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All prompt-tree errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An interpolation derived an empty key
    #[error("empty expression: an interpolation must derive a non-empty key")]
    EmptyExpression,

    /// Two interpolations derived the same key while duplicates are disallowed
    #[error("duplicate key {key:?} (enable allow_duplicate_keys to permit repeats)")]
    DuplicateKey { key: String },

    /// The interpolated value is none of text, tree, list of trees, or opaque payload
    #[error("unsupported value type {type_name} for key {key:?} (expression: {expression:?})")]
    UnsupportedValueType {
        key: String,
        type_name: String,
        expression: String,
    },

    /// Lookup of a key that is not present
    #[error("missing key {key:?}; available keys: {available:?}")]
    MissingKey { key: String, available: Vec<String> },

    /// Single-result lookup of a key that occurs more than once
    #[error("ambiguous key {key:?} with {count} occurrences; use get_all")]
    AmbiguousKey { key: String, count: usize },

    /// Indexing into an element with no nested structure
    #[error("element {key:?} is not a nested prompt and cannot be indexed")]
    NotANestedPrompt { key: String },

    /// A tree was attached to a second, different parent element
    #[error("tree {tree} is already nested under element {existing}; cannot attach it to {attempted}")]
    PromptReuse {
        tree: NodeId,
        existing: NodeId,
        attempted: NodeId,
    },

    /// An opaque payload was rendered where only text is allowed
    #[error("element {element} holds an opaque payload and cannot be rendered as text")]
    UnrenderablePayload { element: NodeId },

    /// Static segments and interpolations do not interleave one-for-one
    #[error("malformed template: {strings} static segments for {interpolations} interpolations")]
    MalformedTemplate { strings: usize, interpolations: usize },
}
