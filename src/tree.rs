//! Tree container
//!
//! An ordered, immutable sequence of elements built from a template:
//! static segments interleaved one-for-one with interpolations, plus a
//! key index for dict-like access. Nested and list values are themselves
//! trees, linked upward to at most one parent element.
//!
//! Author: Moroya Sakamoto

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::config::TreeOptions;
use crate::element::{
    Conversion, Element, ElementKind, ElementType, InterpolationInfo, Key, Metadata, NodeId,
    OpaquePayload, SourceLocation,
};
use crate::error::{Error, Result};
use crate::hints::{parse_separator, DefaultSpecParser, FormatSpecParser};

// ── Template input ─────────────────────────────────────────────────────

/// Evaluated interpolation value, classified at tree construction
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Tree(Arc<Tree>),
    List(Vec<Arc<Tree>>),
    Opaque(OpaquePayload),
    /// Anything else the evaluator produced; rejected at construction
    Unsupported { type_name: String },
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(String::from(text))
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<Tree> for Value {
    fn from(tree: Tree) -> Self {
        Value::Tree(Arc::new(tree))
    }
}

impl From<Arc<Tree>> for Value {
    fn from(tree: Arc<Tree>) -> Self {
        Value::Tree(tree)
    }
}

impl From<Vec<Tree>> for Value {
    fn from(items: Vec<Tree>) -> Self {
        Value::List(items.into_iter().map(Arc::new).collect())
    }
}

impl From<Vec<Arc<Tree>>> for Value {
    fn from(items: Vec<Arc<Tree>>) -> Self {
        Value::List(items)
    }
}

impl From<OpaquePayload> for Value {
    fn from(payload: OpaquePayload) -> Self {
        Value::Opaque(payload)
    }
}

/// One interpolation record of a template
#[derive(Debug, Clone)]
pub struct Interpolation {
    pub expression: String,
    pub conversion: Option<Conversion>,
    /// Raw `key : hints` spec
    pub format_spec: String,
    pub value: Value,
}

impl Interpolation {
    pub fn new(expression: &str, value: impl Into<Value>) -> Self {
        Self {
            expression: String::from(expression),
            conversion: None,
            format_spec: String::new(),
            value: value.into(),
        }
    }

    pub fn with_spec(mut self, format_spec: &str) -> Self {
        self.format_spec = String::from(format_spec);
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = Some(conversion);
        self
    }
}

/// Static segments and interpolations, in source order
///
/// `strings` is always one longer than `interpolations`; the builder
/// methods keep that shape by opening a new empty segment after every
/// interpolation.
#[derive(Debug, Clone)]
pub struct Template {
    pub strings: Vec<String>,
    pub interpolations: Vec<Interpolation>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl Template {
    pub fn new() -> Self {
        Self {
            strings: vec![String::new()],
            interpolations: Vec::new(),
        }
    }

    /// Raw parts; the interleaving contract is checked by `Tree::build`
    pub fn from_parts(strings: Vec<String>, interpolations: Vec<Interpolation>) -> Self {
        Self {
            strings,
            interpolations,
        }
    }

    /// Append literal text to the current segment
    pub fn text(mut self, text: &str) -> Self {
        match self.strings.last_mut() {
            Some(last) => last.push_str(text),
            None => self.strings.push(String::from(text)),
        }
        self
    }

    pub fn interp(mut self, interpolation: Interpolation) -> Self {
        self.interpolations.push(interpolation);
        self.strings.push(String::new());
        self
    }

    /// Shorthand for `{expression:spec}`
    pub fn value(self, expression: &str, spec: &str, value: impl Into<Value>) -> Self {
        self.interp(Interpolation::new(expression, value).with_spec(spec))
    }
}

// ── Node view ──────────────────────────────────────────────────────────

/// Uniform view over trees and elements for diffing and walking
///
/// A tree's children are its elements; a nested element's children are the
/// nested tree's elements; a list's children are its item trees.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Tree {
        tree: &'a Tree,
        /// `None` for a root, item index for list items
        key: Option<usize>,
    },
    Element(&'a Element),
}

/// Node type tag, element variants plus `Tree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NodeType {
    Tree,
    Static,
    TextLeaf,
    NestedTree,
    ListOfTrees,
    OpaqueLeaf,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tree => "Tree",
            Self::Static => "Static",
            Self::TextLeaf => "TextLeaf",
            Self::NestedTree => "NestedTree",
            Self::ListOfTrees => "ListOfTrees",
            Self::OpaqueLeaf => "OpaqueLeaf",
        }
    }
}

impl From<ElementType> for NodeType {
    fn from(t: ElementType) -> Self {
        match t {
            ElementType::Static => Self::Static,
            ElementType::TextLeaf => Self::TextLeaf,
            ElementType::NestedTree => Self::NestedTree,
            ElementType::ListOfTrees => Self::ListOfTrees,
            ElementType::OpaqueLeaf => Self::OpaqueLeaf,
        }
    }
}

impl<'a> Node<'a> {
    pub fn root(tree: &'a Tree) -> Self {
        Node::Tree { tree, key: None }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Node::Tree { tree, .. } => tree.id(),
            Node::Element(el) => el.id(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Tree { .. } => NodeType::Tree,
            Node::Element(el) => el.element_type().into(),
        }
    }

    pub fn key(&self) -> Option<Key> {
        match self {
            Node::Tree { key, .. } => key.map(Key::Index),
            Node::Element(el) => Some(el.key().clone()),
        }
    }

    /// Position among siblings
    pub fn position(&self) -> usize {
        match self {
            Node::Tree { key, .. } => key.unwrap_or(0),
            Node::Element(el) => el.position(),
        }
    }

    pub fn text(&self) -> Option<&'a str> {
        match *self {
            Node::Tree { .. } => None,
            Node::Element(el) => el.text(),
        }
    }

    pub fn children(&self) -> Vec<Node<'a>> {
        match *self {
            Node::Tree { tree, .. } => tree.children().iter().map(Node::Element).collect(),
            Node::Element(el) => match el.kind() {
                ElementKind::NestedTree { value, .. } => {
                    value.children().iter().map(Node::Element).collect()
                }
                ElementKind::ListOfTrees { items, .. } => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Node::Tree {
                        tree: item,
                        key: Some(i),
                    })
                    .collect(),
                _ => Vec::new(),
            },
        }
    }

    /// Compared attributes, in a fixed order per variant
    pub fn attributes(&self) -> Vec<(&'static str, Option<String>)> {
        let Node::Element(el) = *self else {
            return Vec::new();
        };
        let Some(info) = el.info() else {
            return Vec::new();
        };
        let mut attrs = vec![
            ("expression", Some(info.expression.clone())),
            ("conversion", info.conversion.map(|c| String::from(c.as_str()))),
            ("format_spec", Some(info.format_spec.clone())),
            ("render_hints", Some(info.render_hints.clone())),
        ];
        match el.kind() {
            ElementKind::ListOfTrees { separator, .. } => {
                attrs.push(("separator", Some(separator.clone())));
            }
            ElementKind::OpaqueLeaf { payload, .. } => {
                attrs.push(("payload", Some(String::from(payload.identity()))));
            }
            _ => {}
        }
        attrs
    }

    /// Ids of this node and every node below it
    pub fn subtree_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<NodeId>) {
        ids.push(self.id());
        for child in self.children() {
            child.collect_ids(ids);
        }
    }

    /// Content fingerprint over type, attributes, text and children
    ///
    /// Independent of ids and positions; equal subtrees hash equal.
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        self.hash_into(&mut hasher);
        hasher.finalize()
    }

    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        hasher.update(self.node_type().as_str().as_bytes());
        for (name, value) in self.attributes() {
            hasher.update(name.as_bytes());
            match value {
                Some(v) => {
                    hasher.update(&[1]);
                    hasher.update(&(v.len() as u64).to_le_bytes());
                    hasher.update(v.as_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        if let Some(text) = self.text() {
            hasher.update(&(text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        let children = self.children();
        hasher.update(&(children.len() as u64).to_le_bytes());
        for child in children {
            child.hash_into(hasher);
        }
    }
}

// ── Tree ───────────────────────────────────────────────────────────────

/// Provenance-preserving tree of one composed template
#[derive(Debug)]
pub struct Tree {
    id: NodeId,
    elements: Vec<Element>,
    /// key → element positions, insertion order
    index: HashMap<String, Vec<usize>>,
    key_order: Vec<String>,
    allow_duplicates: bool,
    /// Written at most once, by the build that nests this tree
    parent_element: Mutex<Option<NodeId>>,
    metadata: RwLock<Metadata>,
}

impl Tree {
    /// Build with the default `key : hints` parser
    pub fn build(template: Template, options: &TreeOptions) -> Result<Self> {
        Self::build_with(template, options, &DefaultSpecParser, None)
    }

    /// Build with a custom spec parser and an optional source location
    /// attached to every element
    pub fn build_with(
        template: Template,
        options: &TreeOptions,
        parser: &dyn FormatSpecParser,
        source_location: Option<SourceLocation>,
    ) -> Result<Self> {
        let Template {
            strings,
            interpolations,
        } = template;
        if strings.len() != interpolations.len() + 1 {
            return Err(Error::MalformedTemplate {
                strings: strings.len(),
                interpolations: interpolations.len(),
            });
        }

        let id = NodeId::new();
        let mut elements = Vec::with_capacity(strings.len() + interpolations.len());
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        let mut key_order = Vec::new();
        let mut links: Vec<(Arc<Tree>, NodeId)> = Vec::new();
        let mut interpolations = interpolations.into_iter();

        for (static_key, text) in strings.into_iter().enumerate() {
            elements.push(Element::new(
                Key::Index(static_key),
                id,
                elements.len(),
                source_location.clone(),
                ElementKind::Static { text },
            ));

            let Some(itp) = interpolations.next() else {
                continue;
            };
            let (key, render_hints) = parser.parse(&itp.format_spec, &itp.expression);
            if key.is_empty() {
                return Err(Error::EmptyExpression);
            }

            let info = InterpolationInfo {
                expression: itp.expression,
                conversion: itp.conversion,
                format_spec: itp.format_spec,
                render_hints,
            };
            let kind = match itp.value {
                Value::Text(value) => ElementKind::TextLeaf { info, value },
                Value::Tree(value) => ElementKind::NestedTree { info, value },
                Value::List(items) => {
                    let separator = parse_separator(&info.render_hints, &options.default_separator);
                    ElementKind::ListOfTrees {
                        info,
                        items,
                        separator,
                    }
                }
                Value::Opaque(payload) => ElementKind::OpaqueLeaf { info, payload },
                Value::Unsupported { type_name } => {
                    return Err(Error::UnsupportedValueType {
                        key,
                        type_name,
                        expression: info.expression,
                    });
                }
            };

            let position = elements.len();
            match index.get_mut(&key) {
                Some(_) if !options.allow_duplicate_keys => {
                    return Err(Error::DuplicateKey { key });
                }
                Some(positions) => positions.push(position),
                None => {
                    index.insert(key.clone(), vec![position]);
                    key_order.push(key.clone());
                }
            }

            let element = Element::new(Key::Name(key), id, position, source_location.clone(), kind);
            for child in element.child_trees() {
                links.push((Arc::clone(child), element.id()));
            }
            elements.push(element);
        }

        attach_parents(&links)?;

        debug!(
            tree = %id,
            elements = elements.len(),
            keys = key_order.len(),
            "built tree"
        );

        Ok(Self {
            id,
            elements,
            index,
            key_order,
            allow_duplicates: options.allow_duplicate_keys,
            parent_element: Mutex::new(None),
            metadata: RwLock::new(Metadata::new()),
        })
    }

    /// Tree holding a single static segment
    pub fn from_text(text: &str) -> Self {
        let id = NodeId::new();
        let element = Element::new(
            Key::Index(0),
            id,
            0,
            None,
            ElementKind::Static {
                text: String::from(text),
            },
        );
        Self {
            id,
            elements: vec![element],
            index: HashMap::new(),
            key_order: Vec::new(),
            allow_duplicates: false,
            parent_element: Mutex::new(None),
            metadata: RwLock::new(Metadata::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// All elements, statics included, in order
    pub fn children(&self) -> &[Element] {
        &self.elements
    }

    /// Interpolation elements in order
    pub fn interpolations(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|el| el.is_interpolation())
    }

    pub fn allows_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    /// The single element for `key`
    pub fn get(&self, key: &str) -> Result<&Element> {
        let positions = self.positions(key)?;
        match positions {
            [pos] => Ok(&self.elements[*pos]),
            _ => Err(Error::AmbiguousKey {
                key: String::from(key),
                count: positions.len(),
            }),
        }
    }

    /// Every element for `key`, in order
    pub fn get_all(&self, key: &str) -> Result<Vec<&Element>> {
        Ok(self
            .positions(key)?
            .iter()
            .map(|&pos| &self.elements[pos])
            .collect())
    }

    fn positions(&self, key: &str) -> Result<&[usize]> {
        self.index
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingKey {
                key: String::from(key),
                available: self.key_order.clone(),
            })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Unique keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.key_order.iter().map(String::as_str)
    }

    /// Number of unique keys
    pub fn len(&self) -> usize {
        self.key_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_order.is_empty()
    }

    /// Element that contains this tree, `None` for roots
    pub fn parent_element(&self) -> Option<NodeId> {
        *self
            .parent_element
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Find an element anywhere in this tree
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        for el in &self.elements {
            if el.id() == id {
                return Some(el);
            }
            for child in el.child_trees() {
                if let Some(found) = child.element(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Pre-order visit of every node with its key path from this root
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(Node<'a>, &[Node<'a>])) {
        let mut ancestors = Vec::new();
        walk_node(Node::root(self), &mut ancestors, visit);
    }

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

fn walk_node<'a>(
    node: Node<'a>,
    ancestors: &mut Vec<Node<'a>>,
    visit: &mut dyn FnMut(Node<'a>, &[Node<'a>]),
) {
    visit(node, ancestors);
    ancestors.push(node);
    for child in node.children() {
        walk_node(child, ancestors, visit);
    }
    ancestors.pop();
}

/// Check and write every parent link as one step
///
/// Child links are locked in id order, checked, and written before any lock
/// is released: a concurrent build sharing a child sees all of this build's
/// links or none of them.
fn attach_parents(links: &[(Arc<Tree>, NodeId)]) -> Result<()> {
    let mut pending: BTreeMap<NodeId, (&Tree, NodeId)> = BTreeMap::new();
    for (tree, parent) in links {
        match pending.get(&tree.id()) {
            Some(&(_, existing)) if existing != *parent => {
                return Err(Error::PromptReuse {
                    tree: tree.id(),
                    existing,
                    attempted: *parent,
                });
            }
            Some(_) => {}
            None => {
                pending.insert(tree.id(), (tree.as_ref(), *parent));
            }
        }
    }

    let mut guards = Vec::with_capacity(pending.len());
    for &(tree, parent) in pending.values() {
        let guard = tree
            .parent_element
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *guard {
            Some(existing) if existing != parent => {
                return Err(Error::PromptReuse {
                    tree: tree.id(),
                    existing,
                    attempted: parent,
                });
            }
            _ => guards.push((guard, tree.id(), parent)),
        }
    }
    for (mut guard, tree, parent) in guards {
        *guard = Some(parent);
        trace!(tree = %tree, parent = %parent, "linked nested tree");
    }
    Ok(())
}
