//! Conversation-thread grouping and the lexical relevance gate.

use std::collections::HashMap;

use crate::models::EmailRecord;
use crate::text::clean_html;

/// Group a flat, ranked search-result list into conversation threads.
///
/// Emails sharing a `conversation_id` form one thread; emails without one
/// form singleton threads keyed by their own id. Returns the threads
/// ordered by their best hit's rank (ascending = better), paired with the
/// full membership map. Ties break on thread id for determinism.
pub fn group_threads(
    results: &[EmailRecord],
) -> (Vec<(String, EmailRecord)>, HashMap<String, Vec<EmailRecord>>) {
    let mut groups: HashMap<String, Vec<EmailRecord>> = HashMap::new();
    for email in results {
        groups
            .entry(email.thread_key().to_string())
            .or_default()
            .push(email.clone());
    }

    let mut ordered: Vec<(String, EmailRecord)> = Vec::with_capacity(groups.len());
    for (thread_id, members) in &groups {
        let mut best: Option<&EmailRecord> = None;
        for member in members {
            if best.map_or(true, |b| member.rank < b.rank) {
                best = Some(member);
            }
        }
        if let Some(best) = best {
            ordered.push((thread_id.clone(), best.clone()));
        }
    }

    ordered.sort_by(|a, b| {
        a.1.rank
            .partial_cmp(&b.1.rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    (ordered, groups)
}

/// Coarse lexical relevance gate, applied after thread expansion.
///
/// An empty keyword list means no filtering. Otherwise the email passes
/// iff any keyword is a substring of the lowercased subject or of the
/// lowercased HTML-cleaned body. This keeps threads from pulling in
/// members that only rode along on the conversation id.
pub fn is_relevant(email: &EmailRecord, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }

    let subject = email.subject.to_lowercase();
    let body = clean_html(&email.body).to_lowercase();

    keywords
        .iter()
        .any(|k| subject.contains(k.as_str()) || body.contains(k.as_str()))
}
