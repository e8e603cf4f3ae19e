//! Plain-text helpers for email bodies.
//!
//! Email bodies frequently arrive as HTML. Everything downstream of search
//! (relevance gating, context assembly, citation snippets) works on cleaned
//! plain text produced here.

use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// Strip HTML tags and decode common entities from an email body.
///
/// Entities are decoded both before and after tag removal so entities that
/// were hiding inside attribute values do not survive. This is a coarse
/// regex-based cleaner, not an HTML parser; it is good enough for
/// relevance checks and context previews.
pub fn clean_html(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let decoded = decode_entities(input);
    let stripped = tag_re().replace_all(&decoded, "");
    let decoded = decode_entities(&stripped);
    let collapsed = whitespace_re().replace_all(&decoded, " ");
    collapsed.trim().to_string()
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Truncate to at most `max_chars` characters, appending an ellipsis
/// marker only when something was actually cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}
