//! Keyword extraction and search-query expansion.
//!
//! Questions like "what did the client say about pricing?" are full of
//! words that carry no retrieval signal. [`extract_keywords`] keeps only
//! the content words; [`expand_query`] turns them into a boolean FTS
//! query that maximizes recall (keyword OR) while recovering precision
//! for compound terms (adjacent-pair phrase OR).

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Words dropped during extraction: articles, wh-words, coordinating
/// conjunctions, and generic query verbs.
const STOP_WORDS: &[&str] = &[
    "the", "what", "when", "where", "who", "why", "how", "with", "about", "from", "for", "and",
    "or", "but", "did", "happened", "said", "say", "give", "me", "brief", "tell", "show", "find",
    "search", "query",
];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Hyphenated terms ("follow-up") count as one token.
    RE.get_or_init(|| Regex::new(r"[\w-]+").expect("word regex"))
}

/// Extract lowercase content keywords from a question.
///
/// Tokens of length <= 2 and stop words are dropped; duplicates are
/// removed while preserving first-seen order (the order matters for
/// phrase expansion).
pub fn extract_keywords(question: &str) -> Vec<String> {
    let lowered = question.to_lowercase();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut keywords = Vec::new();

    for m in word_re().find_iter(&lowered) {
        let word = m.as_str();
        if word.len() <= 2 || STOP_WORDS.contains(&word) {
            continue;
        }
        if seen.insert(word) {
            keywords.push(word.to_string());
        }
    }

    keywords
}

/// Build an enhanced boolean search query from a question.
///
/// With two or more keywords the base query is their OR-disjunction;
/// otherwise the raw question is used as-is. Every adjacent keyword pair
/// additionally contributes a quoted two-word phrase, and the result is
/// `(<keywords>) OR (<phrases>)`.
pub fn expand_query(question: &str) -> String {
    let keywords = extract_keywords(question);

    let base = if keywords.len() >= 2 {
        keywords.join(" OR ")
    } else {
        question.trim().to_string()
    };

    let phrases: Vec<String> = keywords
        .windows(2)
        .map(|pair| format!("\"{} {}\"", pair[0], pair[1]))
        .collect();

    if phrases.is_empty() {
        base
    } else {
        format!("({}) OR ({})", base, phrases.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_drops_stop_words() {
        let kws = extract_keywords("what did the client say about pricing");
        assert_eq!(kws, vec!["client", "pricing"]);
    }

    #[test]
    fn test_extract_drops_short_tokens() {
        let kws = extract_keywords("is it an ROI analysis");
        assert_eq!(kws, vec!["roi", "analysis"]);
    }

    #[test]
    fn test_extract_lowercases() {
        let kws = extract_keywords("Quarterly Budget Review");
        assert_eq!(kws, vec!["quarterly", "budget", "review"]);
    }

    #[test]
    fn test_extract_deduplicates_preserving_order() {
        let kws = extract_keywords("budget budget meeting budget");
        assert_eq!(kws, vec!["budget", "meeting"]);
    }

    #[test]
    fn test_extract_keeps_hyphenated_terms() {
        let kws = extract_keywords("status of the follow-up items");
        assert_eq!(kws, vec!["status", "follow-up", "items"]);
    }

    #[test]
    fn test_extract_empty_question() {
        assert!(extract_keywords("").is_empty());
        assert!(extract_keywords("the what and or").is_empty());
    }

    #[test]
    fn test_expand_two_keywords() {
        let q = expand_query("sales pricing");
        assert_eq!(q, r#"(sales OR pricing) OR ("sales pricing")"#);
    }

    #[test]
    fn test_expand_three_keywords_has_adjacent_phrases() {
        let q = expand_query("quarterly budget review");
        assert_eq!(
            q,
            r#"(quarterly OR budget OR review) OR ("quarterly budget" OR "budget review")"#
        );
    }

    #[test]
    fn test_expand_single_keyword_falls_back_to_question() {
        assert_eq!(expand_query("invoices"), "invoices");
    }

    #[test]
    fn test_expand_no_keywords_falls_back_to_question() {
        assert_eq!(expand_query("why me"), "why me");
    }
}
