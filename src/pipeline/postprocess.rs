//! Post-processing: deterministic cleanup of a vision model's JSON reply.
//!
//! Replies often arrive wrapped in ` ```json ` fences, surrounded by prose, or
//! carrying a BOM and zero-width characters that `serde_json` rejects.
//!
//! ## Rule Order
//!
//! Invisible characters go first so fence detection sees clean input; the
//! JSON span is cut last, after fences are gone.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Apply all cleanup rules to a raw model reply.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip outer code fences
/// 4. Cut the first complete JSON object or object array out of surrounding prose
pub fn clean_json_reply(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_code_fences(&s);
    extract_json_span(&s).to_string()
}

// ── Rule 1: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

static RE_INNER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n(.*?)\n?```").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        return caps[1].trim().to_string();
    }
    // Fenced block embedded in prose.
    if let Some(caps) = RE_INNER_FENCE.captures(trimmed) {
        return caps[1].trim().to_string();
    }
    trimmed.to_string()
}

// ── Rule 4: Extract the JSON span ────────────────────────────────────────────

/// Cut the first complete JSON value that looks like an element list out of
/// surrounding prose.
///
/// Every `{`/`[` is tried as a start position. An object, or an array whose
/// items are all objects, wins. Otherwise the first complete value of any
/// shape is used, so `I found [3] items` does not hide the object after it.
/// Returns the input unchanged when nothing parses; the parser then reports
/// the real error.
fn extract_json_span(input: &str) -> &str {
    let mut first_value: Option<&str> = None;
    for (start, _) in input.match_indices(['{', '[']) {
        let Some((span, value)) = complete_value_at(input, start) else {
            continue;
        };
        if looks_like_elements(&value) {
            return span;
        }
        first_value.get_or_insert(span);
    }
    first_value.unwrap_or(input)
}

fn complete_value_at(input: &str, start: usize) -> Option<(&str, Value)> {
    let tail = &input[start..];
    let mut stream = serde_json::Deserializer::from_str(tail).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some((&tail[..stream.byte_offset()], value)),
        _ => None,
    }
}

fn looks_like_elements(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_object),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_is_unchanged() {
        let raw = r#"{"elements":[]}"#;
        assert_eq!(clean_json_reply(raw), raw);
    }

    #[test]
    fn strips_json_fences() {
        let raw = "```json\n{\"elements\": []}\n```";
        assert_eq!(clean_json_reply(raw), "{\"elements\": []}");
    }

    #[test]
    fn strips_bare_fences() {
        let raw = "```\n[1, 2]\n```\n";
        assert_eq!(clean_json_reply(raw), "[1, 2]");
    }

    #[test]
    fn cuts_surrounding_prose() {
        let raw = "Here are the elements:\n{\"elements\": [{\"label\": \"A\"}]}\nHope this helps!";
        assert_eq!(clean_json_reply(raw), "{\"elements\": [{\"label\": \"A\"}]}");
    }

    #[test]
    fn fenced_block_inside_prose() {
        let raw = "Sure!\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(clean_json_reply(raw), "{\"a\": 1}");
    }

    #[test]
    fn removes_bom_and_zero_width() {
        let raw = "\u{FEFF}{\"a\":\u{200B}1}";
        assert_eq!(clean_json_reply(raw), "{\"a\":1}");
    }

    #[test]
    fn bracketed_prose_before_object() {
        let raw = "I found [3] elements:\n{\"elements\":[{\"label\":\"Chef\"}]}";
        assert_eq!(clean_json_reply(raw), "{\"elements\":[{\"label\":\"Chef\"}]}");
    }

    #[test]
    fn trailing_prose_with_braces_is_ignored() {
        let raw = "{\"a\": 1}\nNote: labels use {curly} names.";
        assert_eq!(clean_json_reply(raw), "{\"a\": 1}");
    }

    #[test]
    fn unbalanced_reply_is_left_for_the_parser() {
        let raw = "{\"elements\": [";
        assert_eq!(clean_json_reply(raw), raw);
    }

    #[test]
    fn no_json_returns_trimmed_text() {
        assert_eq!(clean_json_reply("  sorry, I cannot  "), "sorry, I cannot");
    }
}
