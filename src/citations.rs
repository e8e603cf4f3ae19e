//! Citation extraction from retrieved emails.

use crate::models::{Citation, EmailRecord};
use crate::text::{clean_html, truncate_with_ellipsis};
use crate::threads::is_relevant;

/// Snippet budget per citation.
const SNIPPET_CHARS: usize = 200;

/// Build citations for the emails that actually grounded the answer.
///
/// The same lexical gate used during retrieval applies here, so an email
/// that slipped through on thread membership alone never gets cited.
/// Input order (retrieval order) is preserved.
pub fn build_citations(emails: &[EmailRecord], keywords: &[String]) -> Vec<Citation> {
    emails
        .iter()
        .filter(|e| is_relevant(e, keywords))
        .map(|e| Citation {
            id: e.id.clone(),
            subject: e.subject.clone(),
            sender: e.sender_name.clone(),
            sender_email: e.sender_email.clone(),
            received_time: e.received_time,
            snippet: truncate_with_ellipsis(&clean_html(&e.body), SNIPPET_CHARS),
        })
        .collect()
}
