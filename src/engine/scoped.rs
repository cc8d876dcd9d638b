//! Scoped-key transform: replace the object value of one named key inside
//! arbitrary text without parsing the surrounding text.
//!
//! Output is byte-identical to the input outside successfully replaced
//! spans, and replaced content is never scanned again in the same pass.

use super::extract::extract_object;
use crate::util::truncate_utf8_safe;

/// Result of one scoped-key pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedReplace {
    /// Text with replacements spliced in
    pub text: String,
    /// Balanced objects found under the key and handed to the processor
    pub matched: usize,
    /// Objects the processor replaced
    pub replaced: usize,
}

impl ScopedReplace {
    pub fn is_changed(&self) -> bool {
        self.replaced > 0
    }
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Find every `"<key>": {...}` in `text` and let `processor` rewrite the
/// object.
///
/// The processor receives the object text and the offset of the key and
/// returns `Ok(Some(json))` to replace the object, `Ok(None)` to keep it, or
/// an error, which is logged and treated like `Ok(None)`.
///
/// Occurrences of the quoted key that are not followed by `:` and an object
/// are copied through. An object that does not close before the end of the
/// text (a truncated fragment) ends the scan with the remainder untouched.
pub fn replace_scoped_key<F>(text: &str, key: &str, mut processor: F) -> ScopedReplace
where
    F: FnMut(&str, usize) -> anyhow::Result<Option<String>>,
{
    let needle = format!("\"{}\"", key);
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    let mut matched = 0;
    let mut replaced = 0;

    tracing::trace!(key, text_len = text.len(), "Scoped key scan started");

    while let Some(found) = text[pos..].find(&needle) {
        let key_idx = pos + found;
        out.push_str(&text[pos..key_idx]);

        let after_key = key_idx + needle.len();
        let colon = skip_whitespace(bytes, after_key);
        if bytes.get(colon) != Some(&b':') {
            // Not a key (e.g. a string value equal to the key name)
            out.push_str(&needle);
            pos = after_key;
            continue;
        }

        let brace = skip_whitespace(bytes, colon + 1);
        match bytes.get(brace) {
            Some(b'{') => {}
            Some(_) => {
                tracing::trace!(key, pos = key_idx, "Scoped key value is not an object");
                out.push_str(&text[key_idx..brace]);
                pos = brace;
                continue;
            }
            None => {
                pos = key_idx;
                break;
            }
        }

        let Some((object, end)) = extract_object(text, brace) else {
            tracing::debug!(key, pos = key_idx, "Scoped object incomplete, leaving remainder untouched");
            pos = key_idx;
            break;
        };

        matched += 1;
        tracing::trace!(key, pos = key_idx, json_size = object.len(), "Scoped object extracted");

        match processor(object, key_idx) {
            Ok(Some(replacement)) => {
                out.push_str(&needle);
                out.push(':');
                out.push_str(&replacement);
                replaced += 1;
            }
            Ok(None) => {
                out.push_str(&text[key_idx..end]);
            }
            Err(error) => {
                tracing::debug!(
                    key,
                    pos = key_idx,
                    error = %error,
                    preview = truncate_utf8_safe(object, 120),
                    "Scoped processor failed, object kept"
                );
                out.push_str(&text[key_idx..end]);
            }
        }
        pos = end;
    }

    out.push_str(&text[pos..]);
    tracing::trace!(key, matched, replaced, "Scoped key scan done");

    ScopedReplace {
        text: out,
        matched,
        replaced,
    }
}
