// SSE (Server-Sent Events) delivery shape
//
// Conversation payloads pushed over an event stream arrive one JSON document
// per `data:` line:
// ```
// event: <event_type>
// data: <json_payload>
// ```
//
// Each `data:` payload is trimmed as an independent fragment. Everything else
// (event names, ids, comments, blank separators, line endings) is copied
// through byte for byte. A payload split over several `data:` lines is never
// balanced on any single line and is therefore left alone.

use crate::cache::CacheStore;
use crate::events::{Channel, Notifier};
use crate::policy::EnablementPolicy;
use crate::trim::{TrimContext, TrimOutcome, Trimmer};

// ============================================================================
// SSE Detection
// ============================================================================

/// Check if a body is SSE based on its content-type
pub fn is_event_stream(content_type: &str) -> bool {
    content_type
        .to_ascii_lowercase()
        .contains("text/event-stream")
}

// ============================================================================
// Stream Trimming
// ============================================================================

/// Trim every `data:` payload of an event-stream body
pub fn trim_event_stream<C, P, N>(
    trimmer: &mut Trimmer<C, P, N>,
    body: &str,
    ctx: TrimContext<'_>,
) -> TrimOutcome
where
    C: CacheStore,
    P: EnablementPolicy,
    N: Notifier,
{
    let mut out = String::with_capacity(body.len());
    let mut replacements = 0;
    let mut stats = Vec::new();

    for line in body.split_inclusive('\n') {
        let Some((prefix, payload, ending)) = split_data_line(line) else {
            out.push_str(line);
            continue;
        };

        match trimmer.trim_text(payload, ctx, Channel::EventStream) {
            TrimOutcome::Modified {
                text,
                replacements: n,
                stats: s,
            } => {
                out.push_str(prefix);
                out.push_str(&text);
                out.push_str(ending);
                replacements += n;
                stats.extend(s);
            }
            TrimOutcome::Unchanged => out.push_str(line),
        }
    }

    if replacements == 0 {
        return TrimOutcome::Unchanged;
    }
    TrimOutcome::Modified {
        text: out,
        replacements,
        stats,
    }
}

// ============================================================================
// Internal Helpers
// ============================================================================

/// Split a `data:` line into (prefix incl. optional space, payload, line ending)
///
/// Returns None if the line is not a data line or carries no JSON payload
/// (empty or `[DONE]`).
fn split_data_line(line: &str) -> Option<(&str, &str, &str)> {
    let content = line
        .strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line);
    let ending = &line[content.len()..];

    let rest = content.strip_prefix("data:")?;
    let prefix_len = "data:".len() + usize::from(rest.starts_with(' '));
    let payload = &content[prefix_len..];

    if payload.trim().is_empty() || payload.trim() == "[DONE]" {
        return None;
    }
    Some((&content[..prefix_len], payload, ending))
}
