//! Grounding-context assembly and prompt construction.
//!
//! Retrieved emails are rendered into a single text block the answer
//! generator can cite from. Threaded messages are grouped and presented
//! chronologically so the model sees each conversation in order;
//! standalone emails follow as their own blocks. A single block counter
//! runs across both kinds, in first-seen order.

use std::collections::HashMap;

use crate::models::{AttachmentText, EmailRecord, ThreadInfo};
use crate::text::{clean_html, truncate_with_ellipsis};

/// Per-message body budget inside a thread block.
const BODY_PREVIEW_CHARS: usize = 2000;
/// Per-attachment text budget.
const ATTACHMENT_PREVIEW_CHARS: usize = 500;
/// Attachments rendered per email, longest first as the store returns them.
const MAX_ATTACHMENTS_PER_EMAIL: usize = 5;

/// Render retrieved emails into the grounding-context string.
///
/// `thread_info` carries the subject/count recorded during thread
/// selection; `attachments` maps email id to pre-fetched attachment text.
pub fn build_thread_context(
    emails: &[EmailRecord],
    thread_info: &HashMap<String, ThreadInfo>,
    attachments: &HashMap<String, Vec<AttachmentText>>,
) -> String {
    // Partition into threads (first-seen order) and standalone emails.
    let mut threads: Vec<(String, Vec<&EmailRecord>)> = Vec::new();
    let mut thread_index: HashMap<&str, usize> = HashMap::new();
    let mut standalone: Vec<&EmailRecord> = Vec::new();

    for email in emails {
        match email.conversation() {
            Some(conv) => {
                if let Some(&i) = thread_index.get(conv) {
                    threads[i].1.push(email);
                } else {
                    thread_index.insert(conv, threads.len());
                    threads.push((conv.to_string(), vec![email]));
                }
            }
            None => standalone.push(email),
        }
    }

    for (_, members) in &mut threads {
        members.sort_by_key(|e| e.received_time);
    }

    let mut parts: Vec<String> = Vec::new();
    let mut block_num = 1;

    for (conv_id, members) in &threads {
        let info = thread_info.get(conv_id);
        let count = info.map_or(members.len(), |i| i.count);
        let subject = info
            .map(|i| i.subject.as_str())
            .unwrap_or_else(|| members[0].subject.as_str());

        parts.push(format!(
            "THREAD {} ({} messages):\nSubject: {}\nConversation ID: {}\n",
            block_num, count, subject, conv_id
        ));

        for (msg_num, email) in members.iter().enumerate() {
            parts.push(format!(
                "  Message {}:\n  From: {} <{}>\n  Date: {}\n  Body: {}",
                msg_num + 1,
                email.sender_name,
                email.sender_email,
                email.received_time.to_rfc3339(),
                truncate_with_ellipsis(&clean_html(&email.body), BODY_PREVIEW_CHARS),
            ));
            push_attachments(&mut parts, attachments, &email.id, "  ");
            parts.push(String::new());
        }

        block_num += 1;
    }

    for email in &standalone {
        parts.push(format!(
            "STANDALONE EMAIL {}:\nSubject: {}\nFrom: {} <{}>\nDate: {}\nBody: {}",
            block_num,
            email.subject,
            email.sender_name,
            email.sender_email,
            email.received_time.to_rfc3339(),
            truncate_with_ellipsis(&clean_html(&email.body), BODY_PREVIEW_CHARS),
        ));
        push_attachments(&mut parts, attachments, &email.id, "");
        parts.push(String::new());
        block_num += 1;
    }

    parts.join("\n")
}

fn push_attachments(
    parts: &mut Vec<String>,
    attachments: &HashMap<String, Vec<AttachmentText>>,
    email_id: &str,
    indent: &str,
) {
    let Some(atts) = attachments.get(email_id) else {
        return;
    };
    if atts.is_empty() {
        return;
    }

    parts.push(format!("{}Attachments:", indent));
    for att in atts.iter().take(MAX_ATTACHMENTS_PER_EMAIL) {
        if att.text.is_empty() {
            continue;
        }
        parts.push(format!(
            "{}  - {}: {}",
            indent,
            att.filename,
            truncate_with_ellipsis(&att.text, ATTACHMENT_PREVIEW_CHARS),
        ));
    }
}

/// Build the answer-generation prompt from the question and context.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are a helpful assistant that answers questions based on company emails.

IMPORTANT RULES:
1. Answer ONLY using information from the emails/threads provided below
2. If the answer is not in the emails, say "I don't have enough information in the emails to answer that."
3. When referencing emails, cite by thread number and message number (e.g., "According to Thread 1, Message 2...")
4. Pay attention to the full conversation context in each thread - earlier messages may provide important context
5. Be concise and factual
6. If multiple threads discuss the same topic, synthesize information across threads

EMAIL THREADS:
{}

QUESTION:
{}

Please provide:
1. A clear, concise answer based on the email threads
2. Citations to specific threads and messages that support your answer
"#,
        context, question
    )
}
