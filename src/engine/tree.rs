//! Node-tree utilities: read-only node view, leaf discovery, chain building.
//!
//! A conversation tree is kept as the raw JSON `mapping` object so every
//! field the engine does not understand survives a rewrite untouched.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// Id-keyed node collection (the `mapping` object of a conversation)
pub type Mapping = Map<String, Value>;

/// Borrowed, typed view over one node of a [`Mapping`]
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a>(&'a Value);

impl<'a> NodeRef<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> &'a Value {
        self.0
    }

    /// Parent id, `None` for roots (absent, null or non-string)
    pub fn parent(&self) -> Option<&'a str> {
        self.0.get("parent").and_then(Value::as_str)
    }

    /// Child ids; non-string entries are skipped
    pub fn children(&self) -> impl Iterator<Item = &'a str> {
        self.0
            .get("children")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    pub fn has_children(&self) -> bool {
        self.children().next().is_some()
    }

    /// The message body; structural-only nodes have none
    pub fn message(&self) -> Option<&'a Value> {
        self.0.get("message").filter(|m| m.is_object())
    }

    /// Author role (`message.author.role`, falling back to `message.role`)
    pub fn role(&self) -> Option<&'a str> {
        let message = self.message()?;
        message
            .get("author")
            .and_then(|a| a.get("role"))
            .and_then(Value::as_str)
            .or_else(|| message.get("role").and_then(Value::as_str))
    }

    /// Declared content type of the message body
    pub fn content_type(&self) -> Option<&'a str> {
        self.message()?
            .get("content")?
            .get("content_type")
            .and_then(Value::as_str)
    }

    /// Message timestamp: `update_time`, then `create_time`
    pub fn message_time(&self) -> Option<f64> {
        let message = self.message()?;
        positive_time(message, "update_time").or_else(|| positive_time(message, "create_time"))
    }

    /// Best available timestamp, node-level fields first
    pub fn timestamp(&self) -> Option<f64> {
        positive_time(self.0, "update_time")
            .or_else(|| positive_time(self.0, "create_time"))
            .or_else(|| self.message_time())
    }
}

/// Zero, negative and non-numeric times count as missing
fn positive_time(value: &Value, key: &str) -> Option<f64> {
    value
        .get(key)
        .and_then(Value::as_f64)
        .filter(|t| *t > 0.0 && t.is_finite())
}

/// Look up a node by id
pub fn node<'a>(mapping: &'a Mapping, id: &str) -> Option<NodeRef<'a>> {
    mapping.get(id).map(NodeRef::new)
}

/// Find the most recent leaf of the tree.
///
/// Among childless nodes the one with the greatest timestamp wins; on equal
/// timestamps the first one in mapping order is kept. When no childless node
/// carries a usable timestamp the last key of the mapping is returned.
/// `None` only for an empty mapping.
pub fn find_leaf(mapping: &Mapping) -> Option<&str> {
    let mut best: Option<(&str, f64)> = None;

    for (id, value) in mapping {
        let node = NodeRef::new(value);
        if node.has_children() {
            continue;
        }
        let Some(time) = node.timestamp() else {
            continue;
        };
        match best {
            Some((_, best_time)) if time <= best_time => {}
            _ => best = Some((id.as_str(), time)),
        }
    }

    best.map(|(id, _)| id)
        .or_else(|| mapping.keys().next_back().map(String::as_str))
}

/// Walk `parent` links from `leaf_id` up to the root and return the ids in
/// root-to-leaf order.
///
/// Stops at the first id that is missing from the mapping or already seen,
/// so malformed trees with cycles still terminate with a partial chain.
pub fn build_chain(mapping: &Mapping, leaf_id: &str) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut cursor = Some(leaf_id);

    while let Some(id) = cursor {
        let Some(value) = mapping.get(id) else {
            break;
        };
        if !seen.insert(id.to_string()) {
            tracing::debug!(node = %id, "Cycle in parent links, chain truncated");
            break;
        }
        chain.push(id.to_string());
        cursor = NodeRef::new(value).parent();
    }

    chain.reverse();
    chain
}

/// Preferred leaf: `current_node` when it names an existing node, otherwise
/// the most recent leaf.
pub fn resolve_leaf<'a>(mapping: &'a Mapping, current_node: Option<&'a str>) -> Option<&'a str> {
    match current_node {
        Some(id) if mapping.contains_key(id) => Some(id),
        _ => find_leaf(mapping),
    }
}
