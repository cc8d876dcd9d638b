//! Positional JSON object extraction.
//!
//! Not a parser: counts brace depth from an opening `{`, ignoring braces
//! inside string literals, and hands back the balanced span. All delimiters
//! are ASCII, so scanning bytes keeps every returned slice on a char boundary.

/// Extract one balanced JSON object starting at byte offset `start`.
///
/// `start` must point at `{`. Returns the object text (opening through
/// matching closing brace) and the offset just past it. `None` when `start`
/// is not a `{` or the text ends before the object closes, which for a
/// streamed fragment means "not yet extractable".
///
/// ```
/// use tailtrim::engine::extract_object;
///
/// let text = r#"foo":{"a":{"b":1},"c":"}"} tail"#;
/// let (object, end) = extract_object(text, 5).unwrap();
/// assert_eq!(object, r#"{"a":{"b":1},"c":"}"}"#);
/// assert_eq!(&text[end..], " tail");
/// ```
pub fn extract_object(text: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth: usize = 0;
    let mut in_string = false;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            match b {
                // Escape swallows the next byte, whatever it is
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((&text[start..=i], i + 1));
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    None
}
