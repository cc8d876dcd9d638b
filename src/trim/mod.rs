//! Trim orchestrator: wires the engine to the cache, policy and notifier
//!
//! # Delivery shapes
//!
//! ```text
//! full document ─► trim_document ──┐
//! stream chunk  ─► trim_fragment ──┼─► shrink_mapping ─► rebuild
//! inline script ─► trim_embedded ──┘         │
//!                                            ├─► CacheStore (flat, meta)
//!                                            └─► Notifier (TailMeta, Trimmed)
//! ```
//!
//! # Fail-Safe Guarantee
//!
//! Every entry point ALWAYS returns. Parse failures, truncated fragments,
//! disabled conversations and trees that already fit all come back as
//! [`TrimOutcome::Unchanged`], and the caller keeps its original bytes.
//!
//! Fragments are processed independently: nothing carries partial-parse
//! state from one chunk to the next. A scoped object split across chunks is
//! left alone and the transport is relied on to deliver it whole eventually.

use crate::cache::{CacheStore, FlatMessage, TailMeta};
use crate::config::TrimSettings;
use crate::engine::{
    build_chain, close_over_ancestors, conversation_id_from_url, find_conversation_id_in_text,
    find_current_node_near, is_likely_conversation_mapping, rebuild, replace_scoped_key,
    resolve_leaf, select_tail, tree, Body, Classifier, Mapping, Rebuilt, ScopedReplace,
    TailSelection,
};
use crate::events::{Channel, Notifier, TrimEvent};
use crate::policy::EnablementPolicy;
use crate::util::truncate_utf8_safe;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{Map, Value};


/// Conversation id used when nothing better is known
pub const UNKNOWN_CONVERSATION: &str = "unknown";

// ============================================================================
// Trim Result
// ============================================================================

/// What one trim did to one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimStats {
    pub conv_id: String,
    /// Nodes in the mapping before trimming
    pub nodes_before: usize,
    /// Nodes in the rebuilt mapping
    pub nodes_after: usize,
    /// Renderable messages on the active chain
    pub renderable_total: usize,
    /// Renderable messages left in the payload
    pub kept_renderable: usize,
}

/// Result of trimming one payload
#[derive(Debug, Clone, PartialEq)]
pub enum TrimOutcome {
    /// Payload unchanged - pass the original bytes through
    Unchanged,

    /// Payload rewritten - use this text instead
    Modified {
        /// The transformed payload
        text: String,
        /// Scoped objects replaced in the payload
        replacements: usize,
        /// One entry per trimmed conversation
        stats: Vec<TrimStats>,
    },
}

impl TrimOutcome {
    pub fn is_modified(&self) -> bool {
        matches!(self, Self::Modified { .. })
    }

    pub fn replacements(&self) -> usize {
        match self {
            Self::Unchanged => 0,
            Self::Modified { replacements, .. } => *replacements,
        }
    }

    /// Rewritten text, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Unchanged => None,
            Self::Modified { text, .. } => Some(text),
        }
    }

    /// The text to deliver: the rewrite, or `original` when unchanged
    pub fn into_text(self, original: &str) -> String {
        match self {
            Self::Unchanged => original.to_string(),
            Self::Modified { text, .. } => text,
        }
    }
}

// ============================================================================
// Trim Context
// ============================================================================

/// Caller-supplied hints for conversation id resolution
///
/// The trimmer never looks at ambient state (current page, globals); what it
/// knows about the surroundings arrives here.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimContext<'a> {
    /// Conversation id known to the caller
    pub conv_id: Option<&'a str>,

    /// URL the payload was fetched from, or the page it was embedded in
    pub url: Option<&'a str>,
}

impl<'a> TrimContext<'a> {
    pub fn new(conv_id: Option<&'a str>, url: Option<&'a str>) -> Self {
        Self { conv_id, url }
    }

    pub fn with_conv_id(conv_id: &'a str) -> Self {
        Self {
            conv_id: Some(conv_id),
            url: None,
        }
    }
}

// ============================================================================
// Trimmer
// ============================================================================

/// Trim orchestrator
///
/// Generic over its collaborators so callers decide where cached state lives
/// (`C`), who gets to switch trimming off (`P`), and who hears about changes
/// (`N`). All three are usually borrowed: `&mut FileCache`, an
/// `OptimizerSwitch`, and an `mpsc::Sender<TrimEvent>`.
pub struct Trimmer<C, P, N> {
    settings: TrimSettings,
    classifier: Classifier,
    fixed_tail: Option<usize>,
    cache: C,
    policy: P,
    notifier: N,
}

impl<C, P, N> Trimmer<C, P, N>
where
    C: CacheStore,
    P: EnablementPolicy,
    N: Notifier,
{
    pub fn new(settings: TrimSettings, cache: C, policy: P, notifier: N) -> Self {
        let classifier = settings.classifier();
        Self {
            settings,
            classifier,
            fixed_tail: None,
            cache,
            policy,
            notifier,
        }
    }

    /// Use one tail size for every conversation, ignoring stored tails
    pub fn with_fixed_tail(mut self, tail: usize) -> Self {
        self.fixed_tail = Some(self.settings.clamp(tail));
        self
    }

    pub fn settings(&self) -> &TrimSettings {
        &self.settings
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    pub fn into_cache(self) -> C {
        self.cache
    }

    /// Tail size in effect for a conversation
    pub fn tail_for(&self, conv_id: &str) -> usize {
        self.fixed_tail
            .unwrap_or_else(|| self.settings.effective_tail(self.cache.tail_size(conv_id)))
    }

    // ------------------------------------------------------------------------
    // Delivery shapes
    // ------------------------------------------------------------------------

    /// Trim a complete JSON document: a conversation object, or an object
    /// wrapping one under `conversation`.
    pub fn trim_document(&mut self, text: &str, ctx: TrimContext<'_>) -> TrimOutcome {
        if !text.trim_start().starts_with('{') {
            return TrimOutcome::Unchanged;
        }
        let doc: Value = match serde_json::from_str(text) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    preview = truncate_utf8_safe(text, 120),
                    "Document is not JSON, left unchanged"
                );
                return TrimOutcome::Unchanged;
            }
        };
        let Some(root) = doc.as_object() else {
            return TrimOutcome::Unchanged;
        };

        let wrapped = !has_mapping(&doc);
        let conv = if wrapped {
            match root.get("conversation").filter(|c| has_mapping(c)) {
                Some(conv) => conv,
                None => return TrimOutcome::Unchanged,
            }
        } else {
            &doc
        };

        let conv_id = self.resolve_conv_id(Some(conv), None, ctx);
        let Some((trimmed, stats)) = self.shrink_conversation(conv, &conv_id) else {
            return TrimOutcome::Unchanged;
        };

        let out = if wrapped {
            Value::Object(replace_fields(root, [("conversation", trimmed)]))
        } else {
            trimmed
        };

        match serde_json::to_string(&out) {
            Ok(text) => self.finish(Channel::Document, text, 1, vec![stats]),
            Err(e) => {
                tracing::warn!(error = %e, "Trimmed document failed to serialize, left unchanged");
                TrimOutcome::Unchanged
            }
        }
    }

    /// Trim a streamed text fragment
    pub fn trim_fragment(&mut self, text: &str, ctx: TrimContext<'_>) -> TrimOutcome {
        self.trim_text(text, ctx, Channel::Fragment)
    }

    /// Trim JSON embedded in host text, such as an inline bootstrap script
    pub fn trim_embedded(&mut self, text: &str, ctx: TrimContext<'_>) -> TrimOutcome {
        self.trim_text(text, ctx, Channel::Embedded)
    }

    /// Trim a raw stream chunk; `None` means "forward the chunk as is".
    ///
    /// Chunks that are not valid UTF-8 (a multi-byte character split at the
    /// chunk edge, binary bodies) are declined.
    pub fn trim_chunk(&mut self, chunk: &[u8], ctx: TrimContext<'_>) -> Option<Bytes> {
        let text = match std::str::from_utf8(chunk) {
            Ok(text) => text,
            Err(e) => {
                tracing::trace!(error = %e, len = chunk.len(), "Chunk is not UTF-8, passed through");
                return None;
            }
        };
        match self.trim_fragment(text, ctx) {
            TrimOutcome::Modified { text, .. } => Some(Bytes::from(text)),
            TrimOutcome::Unchanged => None,
        }
    }

    /// Scoped-key pass over arbitrary text.
    ///
    /// `"conversation"` objects holding a `mapping` are trimmed first. Only
    /// when none was seen does the pass fall back to bare `"mapping"`
    /// objects, which must be big enough and look like a node-tree.
    pub(crate) fn trim_text(
        &mut self,
        text: &str,
        ctx: TrimContext<'_>,
        channel: Channel,
    ) -> TrimOutcome {
        let has_conversation = text.contains("\"conversation\"");
        let has_mapping_key = text.contains("\"mapping\"");
        if !has_conversation && !has_mapping_key {
            return TrimOutcome::Unchanged;
        }

        let mut stats = Vec::new();
        let mut envelope_seen = false;

        let first = if has_conversation {
            replace_scoped_key(text, "conversation", |object, _| {
                let conv: Value = serde_json::from_str(object)?;
                if !has_mapping(&conv) {
                    return Ok(None);
                }
                envelope_seen = true;
                let conv_id = self.resolve_conv_id(Some(&conv), Some(text), ctx);
                let Some((trimmed, s)) = self.shrink_conversation(&conv, &conv_id) else {
                    return Ok(None);
                };
                let json = serde_json::to_string(&trimmed)?;
                stats.push(s);
                Ok(Some(json))
            })
        } else {
            ScopedReplace {
                text: text.to_string(),
                matched: 0,
                replaced: 0,
            }
        };

        let mut replacements = first.replaced;
        let mut out = first.text;

        if !envelope_seen && has_mapping_key {
            let source = out;
            let second = replace_scoped_key(&source, "mapping", |object, key_at| {
                if object.len() < self.settings.mapping_min_bytes {
                    tracing::trace!(len = object.len(), "Bare mapping too small, skipped");
                    return Ok(None);
                }
                let value: Value = serde_json::from_str(object)?;
                if !is_likely_conversation_mapping(&value) {
                    return Ok(None);
                }
                let Some(mapping) = value.as_object() else {
                    return Ok(None);
                };
                let conv_id = self.resolve_conv_id(None, Some(&source), ctx);
                let current = find_current_node_near(&source, key_at);
                let Some((rebuilt, s)) = self.shrink_mapping(mapping, current, &conv_id) else {
                    return Ok(None);
                };
                let json = serde_json::to_string(&rebuilt.mapping)?;
                stats.push(s);
                Ok(Some(json))
            });
            replacements += second.replaced;
            out = second.text;
        }

        if replacements == 0 {
            return TrimOutcome::Unchanged;
        }
        self.finish(channel, out, replacements, stats)
    }

    // ------------------------------------------------------------------------
    // Core
    // ------------------------------------------------------------------------

    /// Trim a conversation object (an object with a `mapping`).
    ///
    /// Returns a copy with `mapping` and `current_node` replaced, or `None`
    /// when the conversation stays as it is. The input is never mutated.
    pub fn shrink_conversation(&mut self, conv: &Value, conv_id: &str) -> Option<(Value, TrimStats)> {
        let fields = conv.as_object()?;
        let mapping = fields.get("mapping")?.as_object()?;
        let current = fields.get("current_node").and_then(Value::as_str);

        let (rebuilt, stats) = self.shrink_mapping(mapping, current, conv_id)?;
        let trimmed = replace_fields(
            fields,
            [
                ("mapping", Value::Object(rebuilt.mapping)),
                ("current_node", Value::String(rebuilt.current_node)),
            ],
        );
        Some((Value::Object(trimmed), stats))
    }

    /// Trim a bare node-tree.
    ///
    /// Records the observation in the cache whether or not anything is cut,
    /// then rebuilds the mapping around the tail window.
    pub fn shrink_mapping(
        &mut self,
        mapping: &Mapping,
        current_node: Option<&str>,
        conv_id: &str,
    ) -> Option<(Rebuilt, TrimStats)> {
        if mapping.is_empty() {
            return None;
        }
        if !self.policy.is_enabled(conv_id) {
            tracing::debug!(conv_id, "Optimizer disabled for conversation");
            return None;
        }

        let leaf = resolve_leaf(mapping, current_node)?;
        let chain = build_chain(mapping, leaf);
        let bodies: Vec<Option<Body<'_>>> = chain
            .iter()
            .map(|id| tree::node(mapping, id).and_then(|n| self.classifier.renderable_body(n)))
            .collect();
        let renderable: Vec<bool> = bodies.iter().map(Option::is_some).collect();

        let tail = self.tail_for(conv_id);
        let selection = select_tail(&renderable, tail);

        let kept_renderable = match selection {
            TailSelection::Untouched { renderable_total } => renderable_total,
            TailSelection::Suffix {
                kept_renderable, ..
            } => kept_renderable,
        };
        self.record_observation(conv_id, mapping, &chain, bodies, kept_renderable);

        let TailSelection::Suffix {
            start,
            renderable_total,
            kept_renderable,
        } = selection
        else {
            tracing::debug!(conv_id, tail, chain = chain.len(), "Tail fits, no trim needed");
            return None;
        };

        let classifier = &self.classifier;
        let keep = close_over_ancestors(mapping, &chain[start..], |n| classifier.is_renderable(n));
        let rebuilt = rebuild(mapping, &keep, current_node, leaf, classifier);

        let stats = TrimStats {
            conv_id: conv_id.to_string(),
            nodes_before: mapping.len(),
            nodes_after: rebuilt.mapping.len(),
            renderable_total,
            kept_renderable,
        };
        Some((rebuilt, stats))
    }

    /// Merge what this payload showed into the cache.
    ///
    /// Only a payload showing more renderable messages than the cache
    /// already knows about is recorded. A smaller or stale view leaves the
    /// flat list, the metadata and the notifier untouched.
    fn record_observation(
        &mut self,
        conv_id: &str,
        mapping: &Mapping,
        chain: &[String],
        bodies: Vec<Option<Body<'_>>>,
        kept_renderable: usize,
    ) {
        let observed = bodies.iter().filter(|b| b.is_some()).count();
        let cached_total = self
            .cache
            .flat(conv_id)
            .len()
            .max(self.cache.meta(conv_id).map_or(0, |m| m.renderable_total));
        if observed <= cached_total {
            tracing::trace!(conv_id, observed, cached_total, "Cache already holds a larger view");
            return;
        }

        let flat: Vec<FlatMessage> = chain
            .iter()
            .zip(bodies)
            .filter_map(|(id, body)| {
                let body = body?;
                Some(FlatMessage {
                    id: id.clone(),
                    role: body.role.to_string(),
                    text: body.text,
                    time: tree::node(mapping, id)
                        .and_then(|n| n.message_time())
                        .unwrap_or(0.0),
                })
            })
            .collect();
        self.cache.set_flat(conv_id, flat);

        let meta = TailMeta {
            renderable_total: observed,
            kept_renderable_by_react: kept_renderable,
        };
        self.cache.set_meta(conv_id, meta);
        tracing::debug!(
            conv_id,
            total = meta.renderable_total,
            kept = meta.kept_renderable_by_react,
            "Tail metadata updated"
        );
        self.notifier.notify(TrimEvent::TailMeta {
            conv_id: conv_id.to_string(),
            timestamp: Utc::now(),
            renderable_total: meta.renderable_total,
            kept_renderable: meta.kept_renderable_by_react,
        });
    }

    /// Conversation id: the object's own id, the caller's hint, an id in
    /// the surrounding text, the caller's URL, then [`UNKNOWN_CONVERSATION`].
    fn resolve_conv_id(&self, conv: Option<&Value>, text: Option<&str>, ctx: TrimContext<'_>) -> String {
        conv.and_then(|c| non_empty_str(c, "conversation_id").or_else(|| non_empty_str(c, "id")))
            .or(ctx.conv_id.filter(|id| !id.is_empty()))
            .or_else(|| text.and_then(find_conversation_id_in_text))
            .or_else(|| ctx.url.and_then(conversation_id_from_url))
            .unwrap_or(UNKNOWN_CONVERSATION)
            .to_string()
    }

    /// Report the trims of one payload and wrap up the outcome
    fn finish(
        &self,
        channel: Channel,
        text: String,
        replacements: usize,
        stats: Vec<TrimStats>,
    ) -> TrimOutcome {
        for s in &stats {
            tracing::info!(
                conv_id = %s.conv_id,
                channel = channel.as_str(),
                total = s.renderable_total,
                kept = s.kept_renderable,
                nodes_before = s.nodes_before,
                nodes_after = s.nodes_after,
                "Conversation trimmed"
            );
            self.notifier.notify(TrimEvent::Trimmed {
                conv_id: s.conv_id.clone(),
                timestamp: Utc::now(),
                channel,
                nodes_before: s.nodes_before,
                nodes_after: s.nodes_after,
                renderable_total: s.renderable_total,
                kept_renderable: s.kept_renderable,
            });
        }

        TrimOutcome::Modified {
            text,
            replacements,
            stats,
        }
    }
}

fn has_mapping(value: &Value) -> bool {
    value.get("mapping").is_some_and(Value::is_object)
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Copy of `fields` with some values replaced in place; missing keys are
/// appended at the end.
fn replace_fields<const K: usize>(fields: &Map<String, Value>, replacements: [(&str, Value); K]) -> Map<String, Value> {
    let mut replacements: Vec<(&str, Option<Value>)> =
        replacements.into_iter().map(|(k, v)| (k, Some(v))).collect();
    let mut out = Map::with_capacity(fields.len() + K);

    for (key, value) in fields {
        let replacement = replacements
            .iter_mut()
            .find(|(k, _)| *k == key.as_str())
            .and_then(|(_, v)| v.take());
        out.insert(key.clone(), replacement.unwrap_or_else(|| value.clone()));
    }
    for (key, value) in replacements {
        if let Some(value) = value {
            out.insert(key.to_string(), value);
        }
    }
    out
}
