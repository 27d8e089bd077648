//! JSON export
//!
//! Plain JSON shapes for a UI renderer: the hierarchical tree export and
//! the serialized diff results. Status and op strings are lowercase, maps
//! are key-sorted, ids are hyphenated uuids.
//!
//! Author: Moroya Sakamoto

use serde_json::{json, Value};

use crate::diff::{NodeDelta, PromptDiff};
use crate::element::{Element, ElementKind, InterpolationInfo, NodeId};
use crate::render::convert;
use crate::render_diff::RenderDiff;
use crate::tree::Tree;

impl Tree {
    /// Hierarchical export: `{prompt_id, children}`, each child carrying
    /// its `parent_id` and, for nested and list elements, its own children
    pub fn to_json(&self) -> Value {
        json!({
            "prompt_id": self.id(),
            "children": children_json(self, self.id()),
        })
    }
}

fn children_json(tree: &Tree, parent_id: NodeId) -> Vec<Value> {
    tree.children()
        .iter()
        .map(|el| element_json(el, parent_id))
        .collect()
}

fn info_json(base: &mut serde_json::Map<String, Value>, info: &InterpolationInfo) {
    base.insert(String::from("expression"), json!(info.expression));
    base.insert(
        String::from("conversion"),
        json!(info.conversion.map(|c| c.as_str())),
    );
    base.insert(String::from("format_spec"), json!(info.format_spec));
    base.insert(String::from("render_hints"), json!(info.render_hints));
}

fn element_json(el: &Element, parent_id: NodeId) -> Value {
    let mut base = serde_json::Map::new();
    base.insert(String::from("id"), json!(el.id()));
    base.insert(String::from("parent_id"), json!(parent_id));
    base.insert(String::from("key"), json!(el.key()));
    base.insert(String::from("index"), json!(el.position()));
    base.insert(String::from("source_location"), json!(el.source_location()));
    base.insert(String::from("metadata"), json!(el.metadata()));

    let kind = match el.kind() {
        ElementKind::Static { text } => {
            base.insert(String::from("value"), json!(text));
            "static"
        }
        ElementKind::TextLeaf { info, value } => {
            info_json(&mut base, info);
            base.insert(String::from("value"), json!(value));
            "interpolation"
        }
        ElementKind::NestedTree { info, value } => {
            info_json(&mut base, info);
            base.insert(String::from("prompt_id"), json!(value.id()));
            base.insert(
                String::from("children"),
                Value::Array(children_json(value, el.id())),
            );
            "nested_prompt"
        }
        ElementKind::ListOfTrees {
            info,
            items,
            separator,
        } => {
            info_json(&mut base, info);
            base.insert(String::from("separator"), json!(separator));
            let items: Vec<Value> = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    json!({
                        "type": "item",
                        "prompt_id": item.id(),
                        "parent_id": el.id(),
                        "key": i,
                        "index": i,
                        "children": children_json(item, el.id()),
                    })
                })
                .collect();
            base.insert(String::from("children"), Value::Array(items));
            "list"
        }
        ElementKind::OpaqueLeaf { info, payload } => {
            info_json(&mut base, info);
            base.insert(String::from("payload"), json!(payload));
            "opaque"
        }
    };
    base.insert(String::from("type"), json!(kind));
    Value::Object(base)
}

// ── Values and provenance ──────────────────────────────────────────────

impl Tree {
    /// Interpolation values by key: converted text for leaves, nested maps
    /// for nested trees, arrays for lists, `null` for opaque payloads
    ///
    /// A repeated key keeps its last value.
    pub fn to_values(&self) -> Value {
        let mut values = serde_json::Map::new();
        for el in self.interpolations() {
            let value = match el.kind() {
                ElementKind::TextLeaf { info, value } => json!(info
                    .conversion
                    .map_or_else(|| value.clone(), |c| convert(value, c))),
                ElementKind::NestedTree { value, .. } => value.to_values(),
                ElementKind::ListOfTrees { items, .. } => {
                    Value::Array(items.iter().map(|item| item.to_values()).collect())
                }
                _ => Value::Null,
            };
            values.insert(el.key().to_string(), value);
        }
        Value::Object(values)
    }

    /// Static strings plus one record per interpolation with its source
    /// expression, conversion, spec and raw value
    pub fn to_provenance(&self) -> Value {
        let strings: Vec<&str> = self
            .children()
            .iter()
            .filter_map(|el| match el.kind() {
                ElementKind::Static { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let nodes: Vec<Value> = self.interpolations().map(provenance_json).collect();
        json!({ "strings": strings, "nodes": nodes })
    }
}

fn provenance_json(el: &Element) -> Value {
    let mut base = serde_json::Map::new();
    base.insert(String::from("key"), json!(el.key()));
    base.insert(String::from("index"), json!(el.position()));
    let value = match el.kind() {
        ElementKind::Static { text } => json!(text),
        ElementKind::TextLeaf { info, value } => {
            info_json(&mut base, info);
            json!(value)
        }
        ElementKind::NestedTree { info, value } => {
            info_json(&mut base, info);
            value.to_provenance()
        }
        ElementKind::ListOfTrees { info, items, .. } => {
            info_json(&mut base, info);
            Value::Array(items.iter().map(|item| item.to_provenance()).collect())
        }
        ElementKind::OpaqueLeaf { info, payload } => {
            info_json(&mut base, info);
            json!(payload)
        }
    };
    base.insert(String::from("value"), value);
    Value::Object(base)
}

// ── Diff results ───────────────────────────────────────────────────────

impl NodeDelta {
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl PromptDiff {
    /// `{root, stats, metrics}`
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl RenderDiff {
    /// `{before, after, operations, element_summaries, metrics}`
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeOptions;
    use crate::diff::diff_trees;
    use crate::render_diff::diff_rendered;
    use crate::element::Conversion;
    use crate::tree::{Interpolation, Template};

    fn build(template: Template) -> Tree {
        Tree::build(template, &TreeOptions::default()).unwrap()
    }

    #[test]
    fn test_tree_json_shape() {
        let inner = build(Template::new().value("v", "v", "1"));
        let tree = build(
            Template::new()
                .text("Intro ")
                .value("inner", "inner:header", inner)
                .value("items", "items", vec![Tree::from_text("a")]),
        );
        let value = tree.to_json();
        assert_eq!(value["prompt_id"], json!(tree.id()));
        let children = value["children"].as_array().unwrap();
        assert_eq!(children.len(), 5);
        assert_eq!(children[0]["type"], "static");
        assert_eq!(children[0]["value"], "Intro ");
        assert_eq!(children[0]["key"], 0);
        assert_eq!(children[1]["type"], "nested_prompt");
        assert_eq!(children[1]["render_hints"], "header");
        assert_eq!(children[1]["conversion"], Value::Null);
        let nested_id = children[1]["id"].clone();
        assert_eq!(children[1]["children"][1]["parent_id"], nested_id);
        assert_eq!(children[1]["children"][1]["value"], "1");
        assert_eq!(children[3]["type"], "list");
        assert_eq!(children[3]["separator"], "\n");
        assert_eq!(children[3]["children"][0]["type"], "item");
        assert_eq!(children[3]["children"][0]["children"][0]["value"], "a");
    }

    #[test]
    fn test_tree_json_opaque() {
        let payload = crate::element::OpaquePayload::new(vec![9u8; 3], "png");
        let tree = build(Template::new().value("img", "img", payload));
        let value = tree.to_json();
        assert_eq!(value["children"][1]["type"], "opaque");
        assert_eq!(value["children"][1]["payload"]["size"], 3);
        assert_eq!(value["children"][1]["payload"]["format"], "png");
    }

    #[test]
    fn test_diff_json() {
        let before = build(Template::new().value("a", "a", "x"));
        let after = build(Template::new().value("a", "a", "y"));
        let value = diff_trees(&before, &after).to_json().unwrap();
        let leaf = &value["root"]["children"][1];
        assert_eq!(leaf["status"], "modified");
        assert_eq!(leaf["key"], "a");
        assert_eq!(leaf["text_diff"][0]["op"], "replace");
        assert_eq!(leaf["before_path"], json!(["a"]));
        assert!(value["metrics"]["edit_count"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_render_diff_json() {
        let before = build(Template::new().text("a"));
        let after = build(Template::new().text("b"));
        let value = diff_rendered(&before, &after).to_json().unwrap();
        let op = &value["operations"][0];
        assert_eq!(op["op"], "replace");
        assert_eq!(op["before"]["type"], "text");
        assert_eq!(op["after"]["text"], "b");
        assert_eq!(value["element_summaries"][0]["operations"]["replace"], 1);
    }

    #[test]
    fn test_values_apply_conversion_and_nest() {
        let inner = build(Template::new().value("role", "role", "tutor"));
        let payload = crate::element::OpaquePayload::new(vec![1u8], "png");
        let tree = build(
            Template::new()
                .interp(Interpolation::new("name", "Ada").with_conversion(Conversion::Repr))
                .value("inner", "inner:xml=ctx", inner)
                .value("items", "items", vec![Tree::from_text("a"), Tree::from_text("b")])
                .value("img", "img", payload),
        );
        assert_eq!(
            tree.to_values(),
            json!({
                "name": "'Ada'",
                "inner": {"role": "tutor"},
                "items": [{}, {}],
                "img": null,
            })
        );
    }

    #[test]
    fn test_provenance_records_sources() {
        let inner = build(Template::new().text("as ").value("role", "role", "tutor"));
        let tree = build(
            Template::new()
                .text("Hi ")
                .interp(Interpolation::new("name", "Ada").with_conversion(Conversion::Repr))
                .text(", ")
                .value("inner", "inner:header", inner),
        );
        let value = tree.to_provenance();
        assert_eq!(value["strings"], json!(["Hi ", ", ", ""]));
        let nodes = value["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["key"], "name");
        assert_eq!(nodes[0]["expression"], "name");
        assert_eq!(nodes[0]["conversion"], "r");
        assert_eq!(nodes[0]["index"], 1);
        assert_eq!(nodes[0]["value"], "Ada");
        assert_eq!(nodes[1]["format_spec"], "inner:header");
        assert_eq!(nodes[1]["render_hints"], "header");
        assert_eq!(nodes[1]["value"]["strings"], json!(["as ", ""]));
        assert_eq!(nodes[1]["value"]["nodes"][0]["value"], "tutor");
    }
}
