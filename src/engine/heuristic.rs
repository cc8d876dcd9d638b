//! Cheap guesses used when a node-tree shows up without its envelope.
//!
//! Everything here is statistical: false positives and negatives are
//! accepted in exchange for a scan that stays cheap on streamed text.

use crate::util::floor_char_boundary;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Keys sampled from a candidate mapping
const SAMPLE_KEYS: usize = 12;
/// UUID-shaped keys required among the sample
const MIN_UUID_KEYS: usize = 2;
/// Node-shaped values required among the sample
const MIN_NODE_VALUES: usize = 1;

/// Bytes searched before a bare mapping for its `current_node`
const CURRENT_NODE_LOOKBEHIND: usize = 2_000;
/// Bytes searched after a bare mapping for its `current_node`
const CURRENT_NODE_LOOKAHEAD: usize = 200_000;

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("static pattern")
});

static CONVERSATION_ID_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"conversation_id"\s*:\s*"([0-9a-f-]{36})""#).expect("static pattern")
});

static CONVERSATION_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/(?:c|share)/([0-9a-f-]{36})").expect("static pattern"));

static API_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/backend-api/conversation/([0-9a-f-]{36})(?:\?.*)?$").expect("static pattern")
});

static ANY_UUID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[0-9a-f-]{36}").expect("static pattern"));

static CURRENT_NODE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"current_node"\s*:\s*"([0-9a-f-]{36})""#).expect("static pattern")
});

pub fn is_uuid(s: &str) -> bool {
    UUID.is_match(s)
}

fn is_node_shaped(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.get("message").is_some_and(|m| !m.is_null())
        || obj.contains_key("parent")
        || obj.get("children").is_some_and(Value::is_array)
}

/// Guess whether an object is a conversation node-tree.
///
/// Samples the first twelve keys; at least two must be UUID-shaped and at
/// least one value node-shaped (a `message`, a `parent` field, or a
/// `children` array). Objects with fewer than two keys are rejected.
pub fn is_likely_conversation_mapping(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    if map.len() < 2 {
        return false;
    }

    let (uuid_keys, node_values) = map
        .iter()
        .take(SAMPLE_KEYS)
        .fold((0, 0), |(uuids, nodes), (key, value)| {
            (
                uuids + usize::from(is_uuid(key)),
                nodes + usize::from(is_node_shaped(value)),
            )
        });

    let likely = uuid_keys >= MIN_UUID_KEYS && node_values >= MIN_NODE_VALUES;
    tracing::debug!(likely, uuid_keys, node_values, total_keys = map.len(), "Mapping likelihood");
    likely
}

/// Conversation id mentioned in fragment text: a `conversation_id` field,
/// then a `/c/<id>` or `/share/<id>` path.
pub fn find_conversation_id_in_text(text: &str) -> Option<&str> {
    CONVERSATION_ID_FIELD
        .captures(text)
        .or_else(|| CONVERSATION_PATH.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Conversation id carried by a URL.
///
/// Tries the conversation API path, then a `/c/` or `/share/` page path,
/// then any UUID-like run.
pub fn conversation_id_from_url(url: &str) -> Option<&str> {
    API_PATH
        .captures(url)
        .or_else(|| CONVERSATION_PATH.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .or_else(|| ANY_UUID.find(url).map(|m| m.as_str()))
}

/// The `current_node` id that belongs to a bare mapping found at `from`.
///
/// The first occurrence at or after `from` (within the lookahead window)
/// wins; otherwise the closest preceding one within the lookbehind window.
pub fn find_current_node_near(text: &str, from: usize) -> Option<&str> {
    let from = floor_char_boundary(text, from);
    let start = floor_char_boundary(text, from.saturating_sub(CURRENT_NODE_LOOKBEHIND));
    let end = floor_char_boundary(text, from.saturating_add(CURRENT_NODE_LOOKAHEAD));

    let mut closest_before: Option<&str> = None;
    for caps in CURRENT_NODE_FIELD.captures_iter(&text[start..end]) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if start + whole.start() >= from {
            return Some(id.as_str());
        }
        closest_before = Some(id.as_str());
    }
    closest_before
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const A: &str = "0b2c6f38-1c0e-4a43-9b3c-1d2e3f4a5b6c";
    const B: &str = "1b2c6f38-1c0e-4a43-9b3c-1d2e3f4a5b6c";
    const C: &str = "2b2c6f38-1c0e-4a43-9b3c-1d2e3f4a5b6c";

    #[test]
    fn test_three_uuid_nodes_are_conversation_like() {
        let value = json!({
            A: {"message": {"author": {"role": "user"}}},
            B: {"message": {"author": {"role": "assistant"}}},
            C: {"message": {"author": {"role": "user"}}}
        });
        assert!(is_likely_conversation_mapping(&value));
    }

    #[test]
    fn test_single_uuid_key_is_not() {
        let value = json!({
            A: {"message": {}},
            "client-created-root": {"parent": null, "children": [A]}
        });
        assert!(!is_likely_conversation_mapping(&value));
    }

    #[test]
    fn test_uuid_keys_without_node_values_is_not() {
        let value = json!({A: 1, B: "x", C: [1]});
        assert!(!is_likely_conversation_mapping(&value));
    }

    #[test]
    fn test_small_or_non_object_is_rejected() {
        assert!(!is_likely_conversation_mapping(&json!({A: {"parent": null}})));
        assert!(!is_likely_conversation_mapping(&json!([A, B])));
    }

    #[test]
    fn test_only_first_twelve_keys_are_sampled() {
        let mut map = serde_json::Map::new();
        for i in 0..12 {
            map.insert(format!("plain-{i}"), json!({"parent": null}));
        }
        map.insert(A.to_string(), json!({"parent": null}));
        map.insert(B.to_string(), json!({"parent": null}));
        assert!(!is_likely_conversation_mapping(&Value::Object(map)));
    }

    #[test]
    fn test_conversation_id_in_text() {
        let text = format!(r#"{{"title":"x","conversation_id" : "{A}"}}"#);
        assert_eq!(find_conversation_id_in_text(&text), Some(A));
        let text = format!("see https://chat.example.com/share/{B} now");
        assert_eq!(find_conversation_id_in_text(&text), Some(B));
        assert_eq!(find_conversation_id_in_text("nothing"), None);
    }

    #[test]
    fn test_conversation_id_from_url() {
        assert_eq!(
            conversation_id_from_url(&format!("https://h/backend-api/conversation/{A}?x=1")),
            Some(A)
        );
        assert_eq!(conversation_id_from_url(&format!("https://h/c/{B}")), Some(B));
        assert_eq!(conversation_id_from_url(&format!("https://h/g/{C}/x")), Some(C));
        assert_eq!(conversation_id_from_url("https://h/"), None);
    }

    #[test]
    fn test_current_node_prefers_following_occurrence() {
        let text = format!(
            r#"{{"current_node":"{A}"}} "mapping":{{}} {{"current_node":"{B}"}}"#
        );
        let from = text.find("\"mapping\"").unwrap();
        assert_eq!(find_current_node_near(&text, from), Some(B));
    }

    #[test]
    fn test_current_node_falls_back_to_closest_preceding() {
        let text = format!(
            r#"{{"current_node":"{A}","current_node":"{C}"}} "mapping":{{}}"#
        );
        let from = text.find("\"mapping\"").unwrap();
        assert_eq!(find_current_node_near(&text, from), Some(C));
    }

    #[test]
    fn test_current_node_outside_window_is_ignored() {
        let text = format!(r#"{{"current_node":"{A}"}}{}"mapping":{{}}"#, " ".repeat(3_000));
        let from = text.find("\"mapping\"").unwrap();
        assert_eq!(find_current_node_near(&text, from), None);
    }
}
