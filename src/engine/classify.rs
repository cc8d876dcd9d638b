//! Content classification: which nodes are renderable, and how a multi-part
//! message body collapses into one string.
//!
//! # Detection Strategy
//!
//! A node is renderable when all of these hold:
//! 1. Author role is `user` or `assistant`
//! 2. Content type is not a reasoning/thought variant
//! 3. The normalized text is non-empty
//! 4. The text is not tool noise (a JSON object literal carrying a key from
//!    the noise vocabulary, such as `{"search_query": "..."}`)

use super::tree::NodeRef;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Keys that mark a JSON object literal as a tool invocation artifact
pub const DEFAULT_NOISE_KEYS: &[&str] = &[
    "search_query",
    "image_query",
    "product_query",
    "open",
    "click",
    "find",
    "screenshot",
    "finance",
    "weather",
    "sports",
    "calculator",
    "time",
    "response_length",
    "domains",
    "recency",
];

/// Declared part types that never contribute text
pub const DEFAULT_TOOL_PART_TYPES: &[&str] = &[
    "tool",
    "tools",
    "function_call",
    "function_output",
    "system",
    "thought",
    "reasoning",
    "search_query",
    "image_query",
    "product_query",
    "open",
    "click",
    "find",
    "screenshot",
    "finance",
    "weather",
    "sports",
    "calculator",
    "time",
    "response_length",
    "web.run",
];

/// Any `"key":` occurrence; the captured key is checked against the vocabulary
static KEY_PROBE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"\\]+)"\s*:"#).expect("static pattern"));

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_-]*\n?").expect("static pattern"));

/// Openers of formatted markdown/HTML whose casing must not be touched
static FORMATTED_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:```|#|>|[-*+]\s|\d+\.\s|<\w)").expect("static pattern")
});

/// Whether a content type is a reasoning/thought variant
pub fn is_reasoning_type(content_type: &str) -> bool {
    let lower = content_type.to_lowercase();
    lower.contains("thought") || lower.contains("reasoning") || lower.contains("model_editable_context")
}

/// Roles whose messages are shown to the reader
pub fn is_conversational_role(role: &str) -> bool {
    role == "user" || role == "assistant"
}

// ============================================================================
// Parts
// ============================================================================

/// One element of a message body, classified by its declared kind
#[derive(Debug, Clone, PartialEq)]
pub enum Part<'a> {
    /// Bare string part
    Plain(&'a str),
    /// `multimodal_text` part
    Multimodal(&'a str),
    /// `code` part or any part carrying a language tag
    Code { code: &'a str, language: &'a str },
    /// Unknown type exposing a `text`, `content` or `value` string
    Text(&'a str),
    /// Declared type is in the tool vocabulary
    Tool,
    /// Nothing usable
    Unknown,
}

impl<'a> Part<'a> {
    /// Text this part contributes to the normalized body
    fn contribution(&self) -> Option<String> {
        match self {
            Part::Plain(s) | Part::Multimodal(s) | Part::Text(s) => Some((*s).to_string()),
            Part::Code { code, language } => Some(wrap_fence(code, language)),
            Part::Tool | Part::Unknown => None,
        }
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn wrap_fence(code: &str, language: &str) -> String {
    format!(
        "\n```{}\n{}\n```\n",
        language.trim().to_lowercase(),
        code.trim_end()
    )
}

/// Upper-case the first letter unless the text opens with formatting
pub fn capitalize_first(text: &str) -> String {
    if FORMATTED_START.is_match(text) {
        return text.to_string();
    }
    match text.char_indices().find(|(_, c)| c.is_alphabetic()) {
        Some((idx, ch)) => {
            let mut out = String::with_capacity(text.len() + 2);
            out.push_str(&text[..idx]);
            out.extend(ch.to_uppercase());
            out.push_str(&text[idx + ch.len_utf8()..]);
            out
        }
        None => text.to_string(),
    }
}

/// Where a message keeps its body: `content.parts`, `message.parts`, then a
/// legacy `content.text` / `message.text` string.
pub fn message_parts(message: &Value) -> Vec<&Value> {
    let content = message.get("content");
    if let Some(parts) = content.and_then(|c| c.get("parts")).and_then(Value::as_array) {
        return parts.iter().collect();
    }
    if let Some(parts) = message.get("parts").and_then(Value::as_array) {
        return parts.iter().collect();
    }
    content
        .and_then(|c| c.get("text"))
        .filter(|t| t.is_string())
        .or_else(|| message.get("text").filter(|t| t.is_string()))
        .into_iter()
        .collect()
}

// ============================================================================
// Noise Filter
// ============================================================================

/// Detects tool-invocation artifacts rendered as message text
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    keys: HashSet<String>,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_KEYS.iter().copied())
    }
}

impl NoiseFilter {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// True when the trimmed text (optionally inside one code fence) is a
    /// JSON object with at least one top-level key from the vocabulary.
    ///
    /// A cheap key probe runs first; the verdict is confirmed by parsing.
    /// Unparseable text is never noise.
    pub fn is_tool_noise(&self, raw: &str) -> bool {
        let mut text = raw.trim();
        if text.starts_with("```") {
            let opened = FENCE_OPEN.find(text).map_or(0, |m| m.end());
            text = text[opened..].strip_suffix("```").unwrap_or(&text[opened..]).trim();
        }
        if !text.starts_with('{') || !text.ends_with('}') {
            return false;
        }

        let probed = KEY_PROBE
            .captures_iter(text)
            .any(|caps| self.keys.contains(&caps[1]));
        if !probed {
            return false;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(obj)) => obj.keys().any(|k| self.keys.contains(k)),
            _ => false,
        }
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Decides renderability and normalizes message bodies
#[derive(Debug, Clone)]
pub struct Classifier {
    noise: NoiseFilter,
    tool_part_types: HashSet<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            NoiseFilter::default(),
            DEFAULT_TOOL_PART_TYPES.iter().copied(),
        )
    }
}

impl Classifier {
    pub fn new<I, S>(noise: NoiseFilter, tool_part_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            noise,
            tool_part_types: tool_part_types
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .collect(),
        }
    }

    pub fn noise(&self) -> &NoiseFilter {
        &self.noise
    }

    pub fn is_tool_noise(&self, text: &str) -> bool {
        self.noise.is_tool_noise(text)
    }

    /// Classify one part by its declared type
    pub fn classify_part<'a>(&self, part: &'a Value) -> Part<'a> {
        if let Some(s) = part.as_str() {
            return Part::Plain(s);
        }
        if !part.is_object() {
            return Part::Unknown;
        }

        let kind = part
            .get("content_type")
            .or_else(|| part.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        if self.tool_part_types.contains(&kind) {
            return Part::Tool;
        }
        if kind == "multimodal_text" {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                return Part::Multimodal(text);
            }
        }

        let language = non_empty_str(part, "language");
        if kind == "code" || language.is_some() {
            let code = ["text", "code", "content"]
                .iter()
                .find_map(|k| part.get(*k).and_then(Value::as_str))
                .unwrap_or("");
            let language = language
                .or_else(|| non_empty_str(part, "lang"))
                .or_else(|| part.get("metadata").and_then(|m| non_empty_str(m, "language")))
                .unwrap_or("");
            return Part::Code { code, language };
        }

        ["text", "content", "value"]
            .iter()
            .find_map(|k| part.get(*k).and_then(Value::as_str))
            .map_or(Part::Unknown, Part::Text)
    }

    /// Join part contributions with newlines and trim, without casing
    pub fn join_parts(&self, parts: &[&Value]) -> String {
        parts
            .iter()
            .filter_map(|p| self.classify_part(p).contribution())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Join part contributions and apply assistant casing
    pub fn normalize_parts(&self, parts: &[&Value], role: &str) -> String {
        apply_casing(self.join_parts(parts), role)
    }

    /// Normalized body of a message object
    pub fn normalize_message(&self, message: &Value, role: &str) -> String {
        self.normalize_parts(&message_parts(message), role)
    }

    /// Body of a node that may be collapsed: user/assistant messages that
    /// are not reasoning content.
    ///
    /// The noise verdict is taken before casing so `{"search_query": ..}`
    /// is still recognized in assistant messages.
    pub fn collapsible_body<'a>(&self, node: NodeRef<'a>) -> Option<Body<'a>> {
        let role = node.role().filter(|r| is_conversational_role(r))?;
        if node.content_type().is_some_and(is_reasoning_type) {
            return None;
        }
        let raw = self.join_parts(&message_parts(node.message()?));
        let noise = !raw.is_empty() && self.noise.is_tool_noise(&raw);
        Some(Body {
            role,
            text: apply_casing(raw, role),
            noise,
        })
    }

    /// Body of a renderable node, `None` otherwise
    pub fn renderable_body<'a>(&self, node: NodeRef<'a>) -> Option<Body<'a>> {
        self.collapsible_body(node)
            .filter(|body| !body.text.is_empty() && !body.noise)
    }

    pub fn is_renderable(&self, node: NodeRef<'_>) -> bool {
        self.renderable_body(node).is_some()
    }
}

/// Normalized message body of one node
#[derive(Debug, Clone, PartialEq)]
pub struct Body<'a> {
    pub role: &'a str,
    pub text: String,
    /// Text is a tool invocation artifact
    pub noise: bool,
}

fn apply_casing(text: String, role: &str) -> String {
    if role == "assistant" {
        capitalize_first(&text)
    } else {
        text
    }
}
