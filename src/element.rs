//! Element model
//!
//! One node of a prompt tree: a literal static segment or a named, typed
//! interpolation. Elements are immutable after construction except for their
//! metadata map. The owning tree is referenced by id only; ownership runs
//! downward (tree → element → nested tree).
//!
//! Author: Moroya Sakamoto

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::tree::Tree;

/// Process-unique identity of an element or a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Element key: ordinal for statics and list items, name for interpolations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(String::from(name))
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Conversion flag carried by an interpolation (`!s`, `!r`, `!a`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conversion {
    #[serde(rename = "s")]
    Str,
    #[serde(rename = "r")]
    Repr,
    #[serde(rename = "a")]
    Ascii,
}

impl Conversion {
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag {
            's' => Some(Self::Str),
            'r' => Some(Self::Repr),
            'a' => Some(Self::Ascii),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "s",
            Self::Repr => "r",
            Self::Ascii => "a",
        }
    }
}

/// Where an element was written, captured by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub filename: Option<String>,
    pub filepath: Option<String>,
    pub line: Option<u32>,
}

/// Binary payload that cannot be rendered as text
///
/// Encoding is left to the caller; the tree only needs presence and a
/// stable identity (blake3 over format and bytes).
#[derive(Debug, Clone)]
pub struct OpaquePayload {
    bytes: Arc<[u8]>,
    format: String,
    identity: String,
}

impl OpaquePayload {
    pub fn new(bytes: impl Into<Arc<[u8]>>, format: &str) -> Self {
        let bytes = bytes.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(format.as_bytes());
        hasher.update(&[0]);
        hasher.update(&bytes);
        Self {
            bytes,
            format: String::from(format),
            identity: hasher.finalize().to_hex().to_string(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Content identity (hex blake3)
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl PartialEq for OpaquePayload {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for OpaquePayload {}

impl Serialize for OpaquePayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("OpaquePayload", 3)?;
        s.serialize_field("format", &self.format)?;
        s.serialize_field("identity", &self.identity)?;
        s.serialize_field("size", &self.bytes.len())?;
        s.end()
    }
}

/// Free-form annotation map
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Provenance shared by every interpolation variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpolationInfo {
    /// Original expression text
    pub expression: String,
    pub conversion: Option<Conversion>,
    /// Raw format spec as written
    pub format_spec: String,
    /// Hint part of the format spec
    pub render_hints: String,
}

/// Variant payload of an element
#[derive(Debug)]
pub enum ElementKind {
    Static {
        text: String,
    },
    TextLeaf {
        info: InterpolationInfo,
        value: String,
    },
    NestedTree {
        info: InterpolationInfo,
        value: Arc<Tree>,
    },
    ListOfTrees {
        info: InterpolationInfo,
        items: Vec<Arc<Tree>>,
        separator: String,
    },
    OpaqueLeaf {
        info: InterpolationInfo,
        payload: OpaquePayload,
    },
}

/// Variant tag of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Static,
    TextLeaf,
    NestedTree,
    ListOfTrees,
    OpaqueLeaf,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "Static",
            Self::TextLeaf => "TextLeaf",
            Self::NestedTree => "NestedTree",
            Self::ListOfTrees => "ListOfTrees",
            Self::OpaqueLeaf => "OpaqueLeaf",
        }
    }
}

/// One node of a prompt tree
#[derive(Debug)]
pub struct Element {
    id: NodeId,
    key: Key,
    parent: NodeId,
    position: usize,
    source_location: Option<SourceLocation>,
    metadata: RwLock<Metadata>,
    kind: ElementKind,
}

impl Element {
    pub(crate) fn new(
        key: Key,
        parent: NodeId,
        position: usize,
        source_location: Option<SourceLocation>,
        kind: ElementKind,
    ) -> Self {
        Self {
            id: NodeId::new(),
            key,
            parent,
            position,
            source_location,
            metadata: RwLock::new(Metadata::new()),
            kind,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Id of the tree that holds this element
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Position among siblings, statics included
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn source_location(&self) -> Option<&SourceLocation> {
        self.source_location.as_ref()
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn element_type(&self) -> ElementType {
        match self.kind {
            ElementKind::Static { .. } => ElementType::Static,
            ElementKind::TextLeaf { .. } => ElementType::TextLeaf,
            ElementKind::NestedTree { .. } => ElementType::NestedTree,
            ElementKind::ListOfTrees { .. } => ElementType::ListOfTrees,
            ElementKind::OpaqueLeaf { .. } => ElementType::OpaqueLeaf,
        }
    }

    /// Interpolation provenance; `None` for statics
    pub fn info(&self) -> Option<&InterpolationInfo> {
        match &self.kind {
            ElementKind::Static { .. } => None,
            ElementKind::TextLeaf { info, .. }
            | ElementKind::NestedTree { info, .. }
            | ElementKind::ListOfTrees { info, .. }
            | ElementKind::OpaqueLeaf { info, .. } => Some(info),
        }
    }

    /// Raw text of a static or text leaf
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Static { text } => Some(text),
            ElementKind::TextLeaf { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_interpolation(&self) -> bool {
        !matches!(self.kind, ElementKind::Static { .. })
    }

    /// Trees owned by this element (one for nested, all items for lists)
    pub fn child_trees(&self) -> &[Arc<Tree>] {
        match &self.kind {
            ElementKind::NestedTree { value, .. } => core::slice::from_ref(value),
            ElementKind::ListOfTrees { items, .. } => items,
            _ => &[],
        }
    }

    /// Look up `key` inside a nested tree
    pub fn get(&self, key: &str) -> Result<&Element> {
        match &self.kind {
            ElementKind::NestedTree { value, .. } => value.get(key),
            _ => Err(Error::NotANestedPrompt {
                key: self.key.to_string(),
            }),
        }
    }

    /// List item by index
    pub fn item(&self, index: usize) -> Option<&Arc<Tree>> {
        match &self.kind {
            ElementKind::ListOfTrees { items, .. } => items.get(index),
            _ => None,
        }
    }

    /// Snapshot of the metadata map
    pub fn metadata(&self) -> Metadata {
        self.metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_metadata(&self, name: &str, value: serde_json::Value) {
        self.metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(String::from(name), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_element(text: &str) -> Element {
        Element::new(
            Key::Index(0),
            NodeId::new(),
            0,
            None,
            ElementKind::Static {
                text: String::from(text),
            },
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let a = static_element("a");
        let b = static_element("a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_key_display_and_json() {
        assert_eq!(Key::Index(3).to_string(), "3");
        assert_eq!(Key::from("name").to_string(), "name");
        assert_eq!(serde_json::to_string(&Key::Index(3)).unwrap(), "3");
        assert_eq!(serde_json::to_string(&Key::from("n")).unwrap(), "\"n\"");
    }

    #[test]
    fn test_conversion_flags() {
        assert_eq!(Conversion::from_flag('r'), Some(Conversion::Repr));
        assert_eq!(Conversion::from_flag('x'), None);
        assert_eq!(Conversion::Ascii.as_str(), "a");
    }

    #[test]
    fn test_static_is_not_indexable() {
        let el = static_element("hello");
        assert!(matches!(el.get("x"), Err(Error::NotANestedPrompt { .. })));
        assert!(el.info().is_none());
        assert_eq!(el.text(), Some("hello"));
        assert!(el.child_trees().is_empty());
    }

    #[test]
    fn test_metadata_is_mutable() {
        let el = static_element("x");
        assert!(el.metadata().is_empty());
        el.set_metadata("tokens", serde_json::json!(12));
        assert_eq!(el.metadata()["tokens"], serde_json::json!(12));
    }

    #[test]
    fn test_payload_identity() {
        let a = OpaquePayload::new(vec![1u8, 2, 3], "png");
        let b = OpaquePayload::new(vec![1u8, 2, 3], "png");
        let c = OpaquePayload::new(vec![1u8, 2, 3], "jpeg");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.identity().len(), 64);
        assert_eq!(a.len(), 3);
    }
}
