//! Structural diff engine
//!
//! Aligns two prompt trees node by node and produces a delta tree:
//! - children are matched greedily by (key, node type), first unconsumed
//!   candidate wins, via one HashMap lookup per child
//! - unmatched before children → deleted, unmatched after children → inserted
//! - matched pairs compare their attribute set and leaf text
//! - a named child whose sibling position changed is flagged moved
//!
//! Author: Moroya Sakamoto

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::RenderConfig;
use crate::element::{Key, NodeId};
use crate::metrics::{diff_metrics, DiffMetrics};
use crate::sequence::{diff_text, OpTag, TextDiff};
use crate::tree::{Node, NodeType, Tree};

/// Change status of one aligned node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Equal,
    Modified,
    Inserted,
    Deleted,
    /// Position changed, content identical
    Moved,
}

impl ChangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Modified => "modified",
            Self::Inserted => "inserted",
            Self::Deleted => "deleted",
            Self::Moved => "moved",
        }
    }
}

/// `(before, after)` attribute values
pub type AttrChange = (Option<String>, Option<String>);

/// Diff of one aligned pair, or of one unmatched node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDelta {
    pub status: ChangeStatus,
    /// After-side type, or before-side for deletions
    pub node_type: NodeType,
    /// `None` only for a root
    pub key: Option<Key>,
    pub before_id: Option<NodeId>,
    pub after_id: Option<NodeId>,
    pub before_position: Option<usize>,
    pub after_position: Option<usize>,
    /// Keys from the root; empty on the absent side
    pub before_path: Vec<Key>,
    pub after_path: Vec<Key>,
    pub attr_changes: BTreeMap<String, AttrChange>,
    /// Present for every matched static / text leaf pair
    pub text_diff: Option<TextDiff>,
    pub moved: bool,
    pub children_reordered: bool,
    pub type_changed: bool,
    pub children: Vec<NodeDelta>,
}

impl NodeDelta {
    /// This delta and every delta below it, pre-order
    pub fn iter_descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    pub fn is_changed(&self) -> bool {
        self.status != ChangeStatus::Equal
    }

    /// True when the leaf text diff has a non-equal run
    pub fn has_text_changes(&self) -> bool {
        self.text_diff.as_ref().is_some_and(TextDiff::has_changes)
    }

    fn label(&self) -> String {
        let mut label = String::from(self.node_type.as_str());
        if let Some(key) = &self.key {
            label.push_str(&format!("[{key}]"));
        }
        if self.status != ChangeStatus::Equal {
            label.push_str(" · ");
            label.push_str(&self.status.as_str().to_uppercase());
        }
        if self.moved && self.status != ChangeStatus::Moved {
            label.push_str(" · MOVED");
        }
        if self.type_changed {
            label.push_str(" · TYPE CHANGED");
        }
        if self.children_reordered {
            label.push_str(" · CHILDREN REORDERED");
        }
        label
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        writeln!(f, "{indent}{}", self.label())?;
        for (name, (before, after)) in &self.attr_changes {
            writeln!(f, "{indent}  {name}: {before:?} → {after:?}")?;
        }
        if let Some(diff) = self.text_diff.as_ref().filter(|d| d.has_changes()) {
            for op in &diff.ops {
                match op.op {
                    OpTag::Equal => writeln!(f, "{indent}  = {:?}", op.before)?,
                    OpTag::Insert => writeln!(f, "{indent}  + {:?}", op.after)?,
                    OpTag::Delete => writeln!(f, "{indent}  - {:?}", op.before)?,
                    OpTag::Replace => writeln!(f, "{indent}  ~ {:?} → {:?}", op.before, op.after)?,
                }
            }
        }
        for child in &self.children {
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

/// Pre-order iterator over a delta tree
pub struct Descendants<'a> {
    stack: Vec<&'a NodeDelta>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a NodeDelta;

    fn next(&mut self) -> Option<Self::Item> {
        let delta = self.stack.pop()?;
        self.stack.extend(delta.children.iter().rev());
        Some(delta)
    }
}

// ── Alignment ──────────────────────────────────────────────────────────

/// Align two nodes; `None` only when both sides are absent
pub fn align(before: Option<Node<'_>>, after: Option<Node<'_>>) -> Option<NodeDelta> {
    match (before, after) {
        (Some(b), Some(a)) => Some(align_pair(b, a, Vec::new(), Vec::new())),
        (Some(b), None) => Some(one_sided(b, ChangeStatus::Deleted, Vec::new())),
        (None, Some(a)) => Some(one_sided(a, ChangeStatus::Inserted, Vec::new())),
        (None, None) => None,
    }
}

fn child_path(path: &[Key], child: &Node<'_>) -> Vec<Key> {
    let mut out = path.to_vec();
    out.extend(child.key());
    out
}

/// Delta for a node with no counterpart; its whole subtree goes with it
fn one_sided(node: Node<'_>, status: ChangeStatus, path: Vec<Key>) -> NodeDelta {
    let children = node
        .children()
        .into_iter()
        .map(|child| {
            let sub = child_path(&path, &child);
            one_sided(child, status, sub)
        })
        .collect();
    let inserted = status == ChangeStatus::Inserted;
    let (id, position) = (Some(node.id()), Some(node.position()));
    NodeDelta {
        status,
        node_type: node.node_type(),
        key: node.key(),
        before_id: if inserted { None } else { id },
        after_id: if inserted { id } else { None },
        before_position: if inserted { None } else { position },
        after_position: if inserted { position } else { None },
        before_path: if inserted { Vec::new() } else { path.clone() },
        after_path: if inserted { path } else { Vec::new() },
        attr_changes: BTreeMap::new(),
        text_diff: None,
        moved: false,
        children_reordered: false,
        type_changed: false,
        children,
    }
}

fn align_pair(
    before: Node<'_>,
    after: Node<'_>,
    before_path: Vec<Key>,
    after_path: Vec<Key>,
) -> NodeDelta {
    let mut delta = NodeDelta {
        status: ChangeStatus::Equal,
        node_type: after.node_type(),
        key: after.key(),
        before_id: Some(before.id()),
        after_id: Some(after.id()),
        before_position: Some(before.position()),
        after_position: Some(after.position()),
        before_path,
        after_path,
        attr_changes: BTreeMap::new(),
        text_diff: None,
        moved: false,
        children_reordered: false,
        type_changed: false,
        children: Vec::new(),
    };

    if before.node_type() != after.node_type() {
        delta.status = ChangeStatus::Modified;
        delta.type_changed = true;
        return delta;
    }

    delta.attr_changes = attr_changes(&before, &after);
    if let (Some(b), Some(a)) = (before.text(), after.text()) {
        delta.text_diff = Some(diff_text(b, a));
    }
    if !delta.attr_changes.is_empty() || delta.has_text_changes() {
        delta.status = ChangeStatus::Modified;
    }

    let before_children = before.children();
    let after_children = after.children();
    for (bi, ai) in match_children(&before_children, &after_children) {
        let child = match (bi, ai) {
            (Some(bi), Some(ai)) => {
                let (b, a) = (before_children[bi], after_children[ai]);
                let b_path = child_path(&delta.before_path, &b);
                let a_path = child_path(&delta.after_path, &a);
                let mut child = align_pair(b, a, b_path, a_path);
                if is_move(&b, &a) {
                    trace!(key = ?a.key(), from = b.position(), to = a.position(), "child moved");
                    child.moved = true;
                    if child.status == ChangeStatus::Equal {
                        child.status = ChangeStatus::Moved;
                    }
                }
                child
            }
            (Some(bi), None) => {
                let b = before_children[bi];
                let path = child_path(&delta.before_path, &b);
                one_sided(b, ChangeStatus::Deleted, path)
            }
            (None, Some(ai)) => {
                let a = after_children[ai];
                let path = child_path(&delta.after_path, &a);
                one_sided(a, ChangeStatus::Inserted, path)
            }
            (None, None) => continue,
        };
        delta.children.push(child);
    }

    delta.children_reordered = delta.children.iter().any(|c| c.moved);
    // a pure move does not make the parent modified
    if delta.status == ChangeStatus::Equal
        && delta.children.iter().any(|c| {
            matches!(
                c.status,
                ChangeStatus::Modified | ChangeStatus::Inserted | ChangeStatus::Deleted
            )
        })
    {
        delta.status = ChangeStatus::Modified;
    }
    delta
}

fn attr_changes(before: &Node<'_>, after: &Node<'_>) -> BTreeMap<String, AttrChange> {
    before
        .attributes()
        .into_iter()
        .zip(after.attributes())
        .filter(|((_, b), (_, a))| b != a)
        .map(|((name, b), (_, a))| (String::from(name), (b, a)))
        .collect()
}

/// Only named children move; statics and list items match by ordinal
fn is_move(before: &Node<'_>, after: &Node<'_>) -> bool {
    matches!(before.key(), Some(Key::Name(_))) && before.position() != after.position()
}

/// Greedy (key, type) matching; before order first, then leftover inserts
fn match_children(
    before: &[Node<'_>],
    after: &[Node<'_>],
) -> Vec<(Option<usize>, Option<usize>)> {
    // (key, type) → after indices, in order
    let mut after_by_key: HashMap<(Key, NodeType), Vec<usize>> = HashMap::new();
    for (ni, child) in after.iter().enumerate() {
        if let Some(key) = child.key() {
            after_by_key
                .entry((key, child.node_type()))
                .or_default()
                .push(ni);
        }
    }

    let mut matched_after = vec![false; after.len()];
    let mut pairs = Vec::with_capacity(before.len().max(after.len()));
    for (oi, child) in before.iter().enumerate() {
        let found = child
            .key()
            .and_then(|key| after_by_key.get(&(key, child.node_type())))
            .and_then(|candidates| candidates.iter().copied().find(|&ni| !matched_after[ni]));
        if let Some(ni) = found {
            matched_after[ni] = true;
        }
        pairs.push((Some(oi), found));
    }
    for (ni, matched) in matched_after.iter().enumerate() {
        if !matched {
            pairs.push((None, Some(ni)));
        }
    }
    pairs
}

// ── Results ────────────────────────────────────────────────────────────

/// Roll-up counts over a delta tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub total_nodes: usize,
    pub changed_nodes: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub modifications: usize,
    /// Nodes flagged moved, whatever their status
    pub moves: usize,
    /// Leaves with a non-trivial text edit
    pub text_changes: usize,
    /// Characters on both sides of every non-equal text run
    pub total_text_delta: usize,
}

impl DiffStats {
    pub fn collect(root: &NodeDelta) -> Self {
        let mut stats = Self::default();
        for delta in root.iter_descendants() {
            stats.total_nodes += 1;
            if delta.is_changed() {
                stats.changed_nodes += 1;
            }
            match delta.status {
                ChangeStatus::Inserted => stats.insertions += 1,
                ChangeStatus::Deleted => stats.deletions += 1,
                ChangeStatus::Modified => stats.modifications += 1,
                ChangeStatus::Equal | ChangeStatus::Moved => {}
            }
            if delta.moved {
                stats.moves += 1;
            }
            if let Some(diff) = delta.text_diff.as_ref().filter(|d| d.has_changes()) {
                stats.text_changes += 1;
                stats.total_text_delta += diff
                    .changes()
                    .map(|op| op.before.chars().count() + op.after.chars().count())
                    .sum::<usize>();
            }
        }
        stats
    }
}

/// Structural diff of two trees
#[derive(Debug, Clone, Serialize)]
pub struct PromptDiff {
    pub root: NodeDelta,
    pub stats: DiffStats,
    pub metrics: DiffMetrics,
    /// id → child-index route from the root; before and after ids both
    /// indexed, first occurrence wins
    #[serde(skip)]
    index: HashMap<NodeId, Vec<usize>>,
}

impl PromptDiff {
    /// Delta for a before-side or after-side id
    pub fn get(&self, id: NodeId) -> Option<&NodeDelta> {
        let route = self.index.get(&id)?;
        let mut delta = &self.root;
        for &i in route {
            delta = delta.children.get(i)?;
        }
        Some(delta)
    }

    pub fn iter_descendants(&self) -> Descendants<'_> {
        self.root.iter_descendants()
    }
}

impl fmt::Display for PromptDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.root, f)
    }
}

fn index_routes(
    delta: &NodeDelta,
    route: &mut Vec<usize>,
    index: &mut HashMap<NodeId, Vec<usize>>,
) {
    for id in [delta.before_id, delta.after_id].into_iter().flatten() {
        index.entry(id).or_insert_with(|| route.clone());
    }
    for (i, child) in delta.children.iter().enumerate() {
        route.push(i);
        index_routes(child, route, index);
        route.pop();
    }
}

/// Diff two trees with the default render configuration
pub fn diff_trees(before: &Tree, after: &Tree) -> PromptDiff {
    diff_trees_with(before, after, &RenderConfig::default())
}

/// Diff two trees; `config` drives the renders behind the metrics
pub fn diff_trees_with(before: &Tree, after: &Tree, config: &RenderConfig) -> PromptDiff {
    let root = align_pair(Node::root(before), Node::root(after), Vec::new(), Vec::new());
    let stats = DiffStats::collect(&root);
    let metrics = diff_metrics(&root, before, after, config);
    let mut index = HashMap::new();
    index_routes(&root, &mut Vec::new(), &mut index);

    debug!(
        before = %before.id(),
        after = %after.id(),
        changed = stats.changed_nodes,
        insertions = stats.insertions,
        deletions = stats.deletions,
        "aligned trees"
    );

    PromptDiff {
        root,
        stats,
        metrics,
        index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeOptions;
    use crate::tree::Template;

    fn build(template: Template) -> Tree {
        Tree::build(template, &TreeOptions::default()).unwrap()
    }

    fn keyed(keys: &[&str]) -> Tree {
        let mut template = Template::new();
        for key in keys {
            template = template.value(key, key, format!("value of {key}")).text(" ");
        }
        build(template)
    }

    fn find<'a>(diff: &'a PromptDiff, key: &str) -> &'a NodeDelta {
        diff.iter_descendants()
            .find(|d| d.key.as_ref().and_then(Key::as_name) == Some(key))
            .unwrap()
    }

    #[test]
    fn test_no_diff_identical_trees() {
        let diff = diff_trees(&keyed(&["a", "b"]), &keyed(&["a", "b"]));
        assert_eq!(diff.root.status, ChangeStatus::Equal);
        assert_eq!(diff.stats.changed_nodes, 0);
        assert_eq!(diff.stats.moves, 0);
        assert_eq!(diff.metrics.edit_count, 0.0);
    }

    #[test]
    fn test_empty_trees_no_diff() {
        let diff = diff_trees(&build(Template::new()), &build(Template::new()));
        assert_eq!(diff.root.status, ChangeStatus::Equal);
        assert_eq!(diff.stats.total_nodes, 2);
    }

    #[test]
    fn test_diff_text_change() {
        let before = build(Template::new().value("a", "a", "old"));
        let after = build(Template::new().value("a", "a", "new"));
        let diff = diff_trees(&before, &after);
        assert_eq!(diff.root.status, ChangeStatus::Modified);
        let leaf = find(&diff, "a");
        assert_eq!(leaf.status, ChangeStatus::Modified);
        assert!(leaf.has_text_changes());
        assert!(leaf.attr_changes.is_empty());
        assert_eq!(diff.stats.text_changes, 1);
    }

    #[test]
    fn test_equal_leaf_keeps_equal_script() {
        let diff = diff_trees(&keyed(&["a"]), &keyed(&["a"]));
        let leaf = find(&diff, "a");
        let script = leaf.text_diff.as_ref().unwrap();
        assert_eq!(script.ops.len(), 1);
        assert_eq!(script.ops[0].op, OpTag::Equal);
    }

    #[test]
    fn test_diff_insert() {
        let diff = diff_trees(&keyed(&["a"]), &keyed(&["a", "b"]));
        let b = find(&diff, "b");
        assert_eq!(b.status, ChangeStatus::Inserted);
        assert!(b.before_id.is_none());
        assert_eq!(b.after_path, vec![Key::from("b")]);
        assert_eq!(diff.root.status, ChangeStatus::Modified);
        // leaf b plus its trailing static
        assert_eq!(diff.stats.insertions, 2);
    }

    #[test]
    fn test_diff_delete() {
        let diff = diff_trees(&keyed(&["a", "b"]), &keyed(&["a"]));
        let b = find(&diff, "b");
        assert_eq!(b.status, ChangeStatus::Deleted);
        assert!(b.after_id.is_none());
        assert_eq!(diff.stats.deletions, 2);
    }

    #[test]
    fn test_same_key_different_kind_is_unmatched() {
        let before = build(Template::new().value("x", "x", "text"));
        let after = build(Template::new().value("x", "x", Tree::from_text("text")));
        let diff = diff_trees(&before, &after);
        let statuses: Vec<_> = diff
            .root
            .children
            .iter()
            .filter(|c| c.key == Some(Key::from("x")))
            .map(|c| c.status)
            .collect();
        assert_eq!(statuses, vec![ChangeStatus::Deleted, ChangeStatus::Inserted]);
    }

    #[test]
    fn test_type_change_at_root_call() {
        let before = build(Template::new().value("x", "x", "text"));
        let after = build(Template::new().value("x", "x", Tree::from_text("text")));
        let delta = align(
            Some(Node::Element(before.get("x").unwrap())),
            Some(Node::Element(after.get("x").unwrap())),
        )
        .unwrap();
        assert!(delta.type_changed);
        assert_eq!(delta.status, ChangeStatus::Modified);
        assert!(delta.children.is_empty());
        assert_eq!(delta.node_type, NodeType::NestedTree);
    }

    #[test]
    fn test_duplicate_keys_match_once_each() {
        let template = || {
            Template::new()
                .value("a", "a", "1")
                .text(" ")
                .value("a", "a", "1")
        };
        let before = Tree::build(template(), &TreeOptions::allow_duplicates()).unwrap();
        let after = Tree::build(template(), &TreeOptions::allow_duplicates()).unwrap();
        let diff = diff_trees(&before, &after);
        assert_eq!(diff.root.status, ChangeStatus::Equal);
    }

    #[test]
    fn test_one_duplicate_added() {
        let before = Tree::build(
            Template::new().value("a", "a", "1"),
            &TreeOptions::allow_duplicates(),
        )
        .unwrap();
        let after = Tree::build(
            Template::new().value("a", "a", "1").value("a", "a", "1"),
            &TreeOptions::allow_duplicates(),
        )
        .unwrap();
        let diff = diff_trees(&before, &after);
        let inserted_leaves = diff
            .iter_descendants()
            .filter(|d| d.status == ChangeStatus::Inserted && d.node_type == NodeType::TextLeaf)
            .count();
        assert_eq!(inserted_leaves, 1);
    }

    #[test]
    fn test_pure_move_does_not_modify_parent() {
        let before = build(Template::new().value("a", "a", "1").value("b", "b", "2"));
        let after = build(Template::new().value("b", "b", "2").value("a", "a", "1"));
        let diff = diff_trees(&before, &after);
        let a = find(&diff, "a");
        assert_eq!(a.status, ChangeStatus::Moved);
        assert!(a.moved);
        assert_eq!(diff.root.status, ChangeStatus::Equal);
        assert!(diff.root.children_reordered);
        assert_eq!(diff.stats.moves, 2);
        assert_eq!(diff.stats.changed_nodes, 2);
    }

    #[test]
    fn test_moved_and_changed_stays_modified() {
        let before = build(Template::new().value("a", "a", "1").value("b", "b", "2"));
        let after = build(Template::new().value("b", "b", "3").value("a", "a", "1"));
        let diff = diff_trees(&before, &after);
        let b = find(&diff, "b");
        assert_eq!(b.status, ChangeStatus::Modified);
        assert!(b.moved);
        assert_eq!(diff.root.status, ChangeStatus::Modified);
    }

    #[test]
    fn test_attribute_change() {
        let before = build(Template::new().value("a", "a:header=One", "x"));
        let after = build(Template::new().value("a", "a:header=Two", "x"));
        let diff = diff_trees(&before, &after);
        let a = find(&diff, "a");
        assert_eq!(a.status, ChangeStatus::Modified);
        assert_eq!(
            a.attr_changes["render_hints"],
            (Some(String::from("header=One")), Some(String::from("header=Two")))
        );
        assert!(a.attr_changes.contains_key("format_spec"));
        assert!(!a.has_text_changes());
    }

    #[test]
    fn test_nested_change_propagates() {
        let inner = |v: &str| build(Template::new().value("v", "v", v));
        let before = build(Template::new().text("x ").value("inner", "inner", inner("1")));
        let after = build(Template::new().text("x ").value("inner", "inner", inner("2")));
        let diff = diff_trees(&before, &after);
        let nested = find(&diff, "inner");
        assert_eq!(nested.status, ChangeStatus::Modified);
        assert!(nested.attr_changes.is_empty());
        let v = find(&diff, "v");
        assert_eq!(v.before_path, vec![Key::from("inner"), Key::from("v")]);
        assert_eq!(diff.root.status, ChangeStatus::Modified);
    }

    #[test]
    fn test_list_items_align_by_index() {
        let items = |texts: &[&str]| -> Vec<Tree> {
            texts.iter().map(|t| Tree::from_text(t)).collect()
        };
        let before = build(Template::new().value("items", "items", items(&["a", "b"])));
        let after = build(Template::new().value("items", "items", items(&["a", "b", "c"])));
        let diff = diff_trees(&before, &after);
        let list = find(&diff, "items");
        assert_eq!(list.children.len(), 3);
        assert_eq!(list.children[2].status, ChangeStatus::Inserted);
        assert_eq!(list.children[2].node_type, NodeType::Tree);
        assert_eq!(list.children[2].key, Some(Key::Index(2)));
        // inserted item carries its static child
        assert_eq!(list.children[2].children.len(), 1);
    }

    #[test]
    fn test_separator_change_recorded() {
        let items = || vec![Tree::from_text("a"), Tree::from_text("b")];
        let before = build(Template::new().value("items", "items", items()));
        let after = build(Template::new().value("items", "items:sep=, ", items()));
        let diff = diff_trees(&before, &after);
        let list = find(&diff, "items");
        assert_eq!(
            list.attr_changes["separator"],
            (Some(String::from("\n")), Some(String::from(", ")))
        );
    }

    #[test]
    fn test_payload_change_recorded() {
        use crate::element::OpaquePayload;

        let old = OpaquePayload::new(vec![1u8, 2, 3], "png");
        let new = OpaquePayload::new(vec![1u8, 2, 4], "png");
        let before = build(Template::new().text("see ").value("img", "img", old.clone()));
        let after = build(Template::new().text("see ").value("img", "img", new.clone()));
        let diff = diff_trees(&before, &after);
        let img = find(&diff, "img");
        assert_eq!(img.status, ChangeStatus::Modified);
        assert_eq!(img.node_type, NodeType::OpaqueLeaf);
        assert_eq!(
            img.attr_changes["payload"],
            (
                Some(String::from(old.identity())),
                Some(String::from(new.identity()))
            )
        );
        assert_eq!(img.attr_changes.len(), 1);
        assert!(img.text_diff.is_none());

        let same = build(Template::new().text("see ").value("img", "img", old));
        let diff = diff_trees(&before, &same);
        assert_eq!(find(&diff, "img").status, ChangeStatus::Equal);
    }

    #[test]
    fn test_get_by_either_id() {
        let before = keyed(&["a"]);
        let after = keyed(&["a"]);
        let diff = diff_trees(&before, &after);
        let before_id = before.get("a").unwrap().id();
        let after_id = after.get("a").unwrap().id();
        assert_eq!(diff.get(before_id).unwrap().after_id, Some(after_id));
        assert_eq!(diff.get(after_id).unwrap().before_id, Some(before_id));
        assert!(diff.get(NodeId::new()).is_none());
        assert_eq!(diff.get(before.id()).unwrap().node_type, NodeType::Tree);
    }

    #[test]
    fn test_align_requires_one_side() {
        assert!(align(None, None).is_none());
        let tree = keyed(&["a"]);
        let delta = align(None, Some(Node::root(&tree))).unwrap();
        assert_eq!(delta.status, ChangeStatus::Inserted);
        assert!(delta.iter_descendants().all(|d| d.status == ChangeStatus::Inserted));
    }

    #[test]
    fn test_display_dump() {
        let before = build(Template::new().text("Intro: ").value("t", "t", "x"));
        let after = build(Template::new().text("Intro now: ").value("t", "t", "x"));
        let dump = diff_trees(&before, &after).to_string();
        let first = dump.lines().next().unwrap();
        assert_eq!(first, "Tree · MODIFIED");
        assert!(dump.contains("Static[0] · MODIFIED"));
        assert!(dump.contains("+ \"now \"") || dump.contains("+ \" now\""));
    }

    #[test]
    fn test_json_shape() {
        let diff = diff_trees(&keyed(&["a"]), &keyed(&["b"]));
        let value = serde_json::to_value(&diff).unwrap();
        assert_eq!(value["root"]["status"], "modified");
        assert_eq!(value["root"]["key"], serde_json::Value::Null);
        assert_eq!(value["root"]["node_type"], "Tree");
        assert!(value["stats"]["insertions"].as_u64().unwrap() >= 1);
        assert!(value.get("index").is_none());
    }
}
