//! Tree rebuilding: a structural copy restricted to the kept ids.
//!
//! The input mapping is never mutated; other consumers of the same payload
//! may still be reading it.

use super::classify::Classifier;
use super::tree::{Mapping, NodeRef};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Trimmed mapping plus its repaired leaf pointer
#[derive(Debug, Clone, PartialEq)]
pub struct Rebuilt {
    pub mapping: Mapping,
    pub current_node: String,
}

/// Copy the kept nodes of `mapping` with repaired links.
///
/// - `parent` survives only when the parent is kept; otherwise it becomes
///   null and the node a new root
/// - `children` is filtered to kept ids
/// - user/assistant messages get a single normalized text part; tool noise
///   collapses to an empty string
///
/// `current_node` is kept when it survives, otherwise replaced by
/// `fallback_leaf`. Mapping order of the input is preserved.
pub fn rebuild(
    mapping: &Mapping,
    keep: &HashSet<String>,
    current_node: Option<&str>,
    fallback_leaf: &str,
    classifier: &Classifier,
) -> Rebuilt {
    let mut out = Mapping::new();

    for (id, value) in mapping.iter().filter(|(id, _)| keep.contains(id.as_str())) {
        out.insert(id.clone(), rebuild_node(value, keep, classifier));
    }

    let current_node = match current_node {
        Some(id) if keep.contains(id) => id.to_string(),
        _ => fallback_leaf.to_string(),
    };

    Rebuilt {
        mapping: out,
        current_node,
    }
}

fn rebuild_node(value: &Value, keep: &HashSet<String>, classifier: &Classifier) -> Value {
    let Some(src) = value.as_object() else {
        return value.clone();
    };
    let node = NodeRef::new(value);

    let parent = node
        .parent()
        .filter(|p| keep.contains(*p))
        .map_or(Value::Null, |p| Value::String(p.to_string()));
    let children: Vec<Value> = node
        .children()
        .filter(|c| keep.contains(*c))
        .map(|c| Value::String(c.to_string()))
        .collect();
    let collapsed = classifier.collapsible_body(node).map(|body| {
        let text = if body.noise { String::new() } else { body.text };
        collapse_message(src.get("message"), text)
    });

    let mut copy = Map::with_capacity(src.len() + 2);
    for (key, field) in src {
        let field = match key.as_str() {
            "parent" => parent.clone(),
            "children" => Value::Array(children.clone()),
            "message" => match &collapsed {
                Some(message) => message.clone(),
                None => field.clone(),
            },
            _ => field.clone(),
        };
        copy.insert(key.clone(), field);
    }
    // Links are always explicit on rebuilt nodes
    copy.entry("parent").or_insert(parent);
    copy.entry("children").or_insert(Value::Array(children));

    Value::Object(copy)
}

/// Message copy with its body replaced by one text part
fn collapse_message(message: Option<&Value>, text: String) -> Value {
    let mut copy = message.and_then(Value::as_object).cloned().unwrap_or_default();
    copy.remove("parts");
    copy.remove("text");
    copy.insert(
        "content".to_string(),
        json!({ "content_type": "text", "parts": [text] }),
    );
    Value::Object(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping() -> Mapping {
        match json!({
            "root": {"id": "root", "parent": null, "children": ["u1"]},
            "u1": {"id": "u1", "parent": "root", "children": ["a1", "alt"],
                   "message": {"author": {"role": "user"},
                               "content": {"content_type": "text", "parts": ["first"]}}},
            "alt": {"id": "alt", "parent": "u1", "children": []},
            "a1": {"id": "a1", "parent": "u1", "children": ["t1"],
                   "message": {"author": {"role": "assistant"}, "status": "done",
                               "content": {"content_type": "multimodal_text",
                                           "parts": ["answer", {"content_type": "code", "language": "sh", "text": "ls"}]}}},
            "t1": {"id": "t1", "parent": "a1", "children": ["u2"],
                   "message": {"author": {"role": "assistant"},
                               "content": {"parts": ["{\"search_query\": \"q\"}"]}}},
            "u2": {"id": "u2", "parent": "t1", "children": [],
                   "message": {"author": {"role": "user"}, "content": {"parts": ["second"]}}}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn keep(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pruned_parent_becomes_root_and_children_filtered() {
        let map = mapping();
        let rebuilt = rebuild(&map, &keep(&["a1", "t1", "u2"]), Some("u2"), "u2", &Classifier::default());

        assert_eq!(rebuilt.mapping.len(), 3);
        assert_eq!(rebuilt.mapping["a1"]["parent"], Value::Null);
        assert_eq!(rebuilt.mapping["a1"]["children"], json!(["t1"]));
        assert_eq!(rebuilt.mapping["t1"]["parent"], json!("a1"));
        assert_eq!(rebuilt.current_node, "u2");
    }

    #[test]
    fn test_every_parent_and_child_reference_survives() {
        let map = mapping();
        let kept = keep(&["u1", "a1", "t1"]);
        let rebuilt = rebuild(&map, &kept, None, "t1", &Classifier::default());
        for (_, node) in &rebuilt.mapping {
            let node = NodeRef::new(node);
            if let Some(parent) = node.parent() {
                assert!(rebuilt.mapping.contains_key(parent));
            }
            for child in node.children() {
                assert!(rebuilt.mapping.contains_key(child));
            }
        }
        assert_eq!(rebuilt.mapping["u1"]["children"], json!(["a1"]));
    }

    #[test]
    fn test_messages_collapse_to_single_text_part() {
        let map = mapping();
        let rebuilt = rebuild(&map, &keep(&["a1", "t1"]), None, "t1", &Classifier::default());

        let a1 = &rebuilt.mapping["a1"]["message"];
        assert_eq!(a1["content"]["content_type"], json!("text"));
        assert_eq!(a1["content"]["parts"], json!(["Answer\n\n```sh\nls\n```"]));
        assert_eq!(a1["status"], json!("done"));

        let t1 = &rebuilt.mapping["t1"]["message"];
        assert_eq!(t1["content"]["parts"], json!([""]));
    }

    #[test]
    fn test_stale_current_node_falls_back() {
        let map = mapping();
        let rebuilt = rebuild(&map, &keep(&["u2"]), Some("alt"), "u2", &Classifier::default());
        assert_eq!(rebuilt.current_node, "u2");
    }

    #[test]
    fn test_source_mapping_is_not_mutated() {
        let map = mapping();
        let before = map.clone();
        let _ = rebuild(&map, &keep(&["a1"]), None, "a1", &Classifier::default());
        assert_eq!(map, before);
    }

    #[test]
    fn test_structural_nodes_are_copied_verbatim_apart_from_links() {
        let map = mapping();
        let rebuilt = rebuild(&map, &keep(&["root", "u1"]), None, "u1", &Classifier::default());
        assert_eq!(rebuilt.mapping["root"], json!({"id": "root", "parent": null, "children": ["u1"]}));
        let keys: Vec<_> = rebuilt.mapping.keys().cloned().collect();
        assert_eq!(keys, vec!["root", "u1"]);
    }
}
