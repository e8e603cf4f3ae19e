//! The question-answering pipeline.
//!
//! One [`QueryService::query`] call runs the whole retrieval chain:
//! keyword extraction, boolean query expansion, FTS search, thread
//! grouping, per-thread expansion with a lexical relevance gate, optional
//! vector reranking, context assembly, answer generation, and citation
//! extraction.
//!
//! The pipeline is deliberately infallible. Collaborator failures degrade
//! the result (empty hits, lexical order instead of reranked, an error
//! note instead of an answer) rather than surfacing as errors; `success`
//! reports whether usable emails were found, independent of whether the
//! answer generator cooperated.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::citations::build_citations;
use crate::config::{Config, RetrievalConfig};
use crate::context::{build_prompt, build_thread_context};
use crate::db;
use crate::embedding::create_reranker;
use crate::generate::create_generator;
use crate::keywords::{expand_query, extract_keywords};
use crate::models::{AttachmentText, EmailRecord, QueryResult, ThreadInfo};
use crate::progress::{NoProgress, QueryProgressEvent, QueryProgressReporter};
use crate::store::{SqliteAttachmentStore, SqliteSearcher};
use crate::threads::{group_threads, is_relevant};
use crate::traits::{AnswerGenerator, AttachmentStore, Reranker, Searcher};

const NO_RESULTS_ANSWER: &str =
    "I couldn't find any relevant emails to answer your question.";

pub struct QueryService {
    searcher: Box<dyn Searcher>,
    reranker: Reranker,
    attachments: Box<dyn AttachmentStore>,
    generator: Box<dyn AnswerGenerator>,
    retrieval: RetrievalConfig,
}

impl QueryService {
    pub fn new(
        searcher: Box<dyn Searcher>,
        reranker: Reranker,
        attachments: Box<dyn AttachmentStore>,
        generator: Box<dyn AnswerGenerator>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            searcher,
            reranker,
            attachments,
            generator,
            retrieval,
        }
    }

    /// Wire up the SQLite-backed service from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.db).await?;
        let searcher = Box::new(SqliteSearcher::new(pool.clone()));
        let attachments = Box::new(SqliteAttachmentStore::new(pool.clone()));
        let reranker = create_reranker(config, pool);
        let generator = create_generator(&config.generation)?;

        Ok(Self::new(
            searcher,
            reranker,
            attachments,
            generator,
            config.retrieval.clone(),
        ))
    }

    /// Answer a question against the email store.
    ///
    /// `top_k` overrides the configured thread budget for this call.
    pub async fn query(&self, question: &str, top_k: Option<usize>) -> QueryResult {
        self.query_with_progress(question, top_k, &NoProgress).await
    }

    pub async fn query_with_progress(
        &self,
        question: &str,
        top_k: Option<usize>,
        progress: &dyn QueryProgressReporter,
    ) -> QueryResult {
        let top_k = top_k.unwrap_or(self.retrieval.top_k).max(1);
        let keywords = extract_keywords(question);

        progress.report(&QueryProgressEvent::Expanding);
        let expanded = expand_query(question);

        progress.report(&QueryProgressEvent::Searching {
            query: expanded.clone(),
        });
        let hits = self
            .searcher
            .search(&expanded, top_k * self.retrieval.overfetch_factor)
            .await
            .unwrap_or_default();

        if hits.is_empty() {
            return QueryResult {
                success: false,
                answer: NO_RESULTS_ANSWER.to_string(),
                citations: Vec::new(),
                retrieved_emails: Vec::new(),
            };
        }

        progress.report(&QueryProgressEvent::Grouping { hits: hits.len() });
        let (ordered, groups) = group_threads(&hits);

        progress.report(&QueryProgressEvent::Fetching {
            threads: ordered.len().min(top_k),
        });
        let mut emails: Vec<EmailRecord> = Vec::new();
        let mut thread_info: HashMap<String, ThreadInfo> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (thread_key, best) in ordered.iter().take(top_k) {
            let members = self.thread_members(thread_key, best, &groups).await;
            for email in members {
                if !seen.insert(email.id.clone()) {
                    continue;
                }
                if !is_relevant(&email, &keywords) {
                    continue;
                }
                if let Some(conv) = email.conversation() {
                    thread_info.entry(conv.to_string()).or_insert_with(|| {
                        ThreadInfo {
                            count: 0,
                            subject: email.subject.clone(),
                        }
                    });
                }
                emails.push(email);
            }
        }

        for (conv, info) in thread_info.iter_mut() {
            info.count = emails
                .iter()
                .filter(|e| e.conversation() == Some(conv.as_str()))
                .count();
        }

        if emails.is_empty() {
            return QueryResult {
                success: false,
                answer: NO_RESULTS_ANSWER.to_string(),
                citations: Vec::new(),
                retrieved_emails: Vec::new(),
            };
        }

        emails = self.maybe_rerank(question, emails, top_k, progress).await;

        progress.report(&QueryProgressEvent::BuildingContext {
            emails: emails.len(),
        });
        let attachments = self.prefetch_attachments(&emails).await;
        let context = build_thread_context(&emails, &thread_info, &attachments);
        let prompt = build_prompt(question, &context);

        progress.report(&QueryProgressEvent::Generating);
        let answer = match self.generator.generate(&prompt).await {
            Ok(generated) => generated.answer,
            Err(e) => format!(
                "I found relevant emails but encountered an error generating the answer: {}",
                e
            ),
        };

        let citations = build_citations(&emails, &keywords);
        progress.report(&QueryProgressEvent::Done {
            citations: citations.len(),
        });

        emails.truncate(top_k * self.retrieval.retained_factor);

        QueryResult {
            success: true,
            answer,
            citations,
            retrieved_emails: emails,
        }
    }

    /// Expand one selected thread into its member emails.
    ///
    /// Prefers the full conversation from the store; if that fetch fails
    /// or comes back empty (the conversation id may be stale), the search
    /// hits that formed the group stand in.
    async fn thread_members(
        &self,
        thread_key: &str,
        best: &EmailRecord,
        groups: &HashMap<String, Vec<EmailRecord>>,
    ) -> Vec<EmailRecord> {
        if best.conversation().is_some() {
            if let Ok(members) = self.searcher.thread_emails(thread_key).await {
                if !members.is_empty() {
                    return members;
                }
            }
        }
        groups.get(thread_key).cloned().unwrap_or_default()
    }

    /// Rerank by vector similarity when the capability is present and the
    /// candidate pool is large enough to benefit. Any failure leaves the
    /// lexical order untouched.
    async fn maybe_rerank(
        &self,
        question: &str,
        emails: Vec<EmailRecord>,
        top_k: usize,
        progress: &dyn QueryProgressReporter,
    ) -> Vec<EmailRecord> {
        let Reranker::Embedding(embedder) = &self.reranker else {
            progress.report(&QueryProgressEvent::RerankSkipped);
            return emails;
        };

        if emails.len() <= top_k * self.retrieval.rerank_pool_factor {
            progress.report(&QueryProgressEvent::RerankSkipped);
            return emails;
        }

        progress.report(&QueryProgressEvent::Reranking {
            pool: emails.len(),
        });

        let query_vector = match embedder.embed_query(question).await {
            Ok(v) => v,
            Err(_) => return emails,
        };

        let ids: Vec<String> = emails.iter().map(|e| e.id.clone()).collect();
        let ranked = match embedder
            .rerank(&query_vector, &ids, top_k * self.retrieval.rerank_pool_factor)
            .await
        {
            Ok(r) if !r.is_empty() => r,
            _ => return emails,
        };

        let by_id: HashMap<&str, &EmailRecord> =
            emails.iter().map(|e| (e.id.as_str(), e)).collect();

        ranked
            .iter()
            .filter_map(|r| by_id.get(r.id.as_str()).map(|&e| e.clone()))
            .collect()
    }

    async fn prefetch_attachments(
        &self,
        emails: &[EmailRecord],
    ) -> HashMap<String, Vec<AttachmentText>> {
        let mut map = HashMap::new();
        for email in emails {
            let atts = self
                .attachments
                .extracted_text(&email.id)
                .await
                .unwrap_or_default();
            if !atts.is_empty() {
                map.insert(email.id.clone(), atts);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{GeneratedAnswer, QueryEmbedder};
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn email(id: &str, conv: Option<&str>, subject: &str, body: &str, rank: f64) -> EmailRecord {
        EmailRecord {
            id: id.to_string(),
            conversation_id: conv.map(|c| c.to_string()),
            subject: subject.to_string(),
            sender_name: "Alice".to_string(),
            sender_email: "alice@example.com".to_string(),
            received_time: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
            body: body.to_string(),
            rank,
        }
    }

    struct FakeSearcher {
        hits: Vec<EmailRecord>,
        threads: HashMap<String, Vec<EmailRecord>>,
    }

    #[async_trait]
    impl Searcher for FakeSearcher {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<EmailRecord>> {
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        async fn thread_emails(&self, conversation_id: &str) -> Result<Vec<EmailRecord>> {
            Ok(self.threads.get(conversation_id).cloned().unwrap_or_default())
        }
    }

    struct NoAttachments;

    #[async_trait]
    impl AttachmentStore for NoAttachments {
        async fn extracted_text(&self, _email_id: &str) -> Result<Vec<AttachmentText>> {
            Ok(Vec::new())
        }
    }

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl AnswerGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedAnswer> {
            Ok(GeneratedAnswer {
                answer: self.0.to_string(),
                citations: Vec::new(),
            })
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl AnswerGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedAnswer> {
            bail!("model endpoint unreachable")
        }
    }

    struct SpyEmbedder {
        called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl QueryEmbedder for SpyEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            self.called.store(true, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }

        async fn rerank(
            &self,
            _query_vector: &[f32],
            candidate_ids: &[String],
            top_k: usize,
        ) -> Result<Vec<crate::models::RankedEmail>> {
            // Reverse order to make reordering observable.
            Ok(candidate_ids
                .iter()
                .rev()
                .take(top_k)
                .map(|id| crate::models::RankedEmail {
                    id: id.clone(),
                    similarity: 1.0,
                })
                .collect())
        }
    }

    fn service(
        searcher: FakeSearcher,
        reranker: Reranker,
        generator: Box<dyn AnswerGenerator>,
        retrieval: RetrievalConfig,
    ) -> QueryService {
        QueryService::new(
            Box::new(searcher),
            reranker,
            Box::new(NoAttachments),
            generator,
            retrieval,
        )
    }

    #[tokio::test]
    async fn test_matching_email_answered_and_cited() {
        let searcher = FakeSearcher {
            hits: vec![email(
                "mail-001",
                None,
                "Sales meeting with client",
                "We discussed pricing options.",
                1.0,
            )],
            threads: HashMap::new(),
        };
        let svc = service(
            searcher,
            Reranker::Disabled,
            Box::new(FixedGenerator("Pricing was discussed.")),
            RetrievalConfig::default(),
        );

        let result = svc.query("sales pricing", None).await;
        assert!(result.success);
        assert_eq!(result.answer, "Pricing was discussed.");
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].id, "mail-001");
        assert_eq!(result.retrieved_emails.len(), 1);
    }

    #[tokio::test]
    async fn test_no_hits_yields_failure_answer() {
        let searcher = FakeSearcher {
            hits: Vec::new(),
            threads: HashMap::new(),
        };
        let svc = service(
            searcher,
            Reranker::Disabled,
            Box::new(FixedGenerator("unused")),
            RetrievalConfig::default(),
        );

        let result = svc.query("nonexistent gibberish", None).await;
        assert!(!result.success);
        assert_eq!(
            result.answer,
            "I couldn't find any relevant emails to answer your question."
        );
        assert!(result.citations.is_empty());
        assert!(result.retrieved_emails.is_empty());
    }

    #[tokio::test]
    async fn test_all_hits_gated_out_reports_failure() {
        // Search returns hits, but none of them mention the question's
        // keywords, so the relevance gate empties the pool.
        let searcher = FakeSearcher {
            hits: vec![
                email("m1", None, "Lunch menu", "pizza on friday", 1.0),
                email("m2", None, "Parking reminder", "move your car", 2.0),
            ],
            threads: HashMap::new(),
        };
        let svc = service(
            searcher,
            Reranker::Disabled,
            Box::new(FixedGenerator("unused")),
            RetrievalConfig::default(),
        );

        let result = svc.query("pricing", None).await;
        assert!(!result.success);
        assert_eq!(
            result.answer,
            "I couldn't find any relevant emails to answer your question."
        );
        assert!(result.citations.is_empty());
        assert!(result.retrieved_emails.is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_degrades_but_succeeds() {
        let searcher = FakeSearcher {
            hits: vec![email("m1", None, "Budget review", "budget numbers", 1.0)],
            threads: HashMap::new(),
        };
        let svc = service(
            searcher,
            Reranker::Disabled,
            Box::new(FailingGenerator),
            RetrievalConfig::default(),
        );

        let result = svc.query("budget", None).await;
        assert!(result.success);
        assert!(result
            .answer
            .starts_with("I found relevant emails but encountered an error"));
        assert!(result.answer.contains("model endpoint unreachable"));
        assert_eq!(result.citations.len(), 1);
    }

    #[tokio::test]
    async fn test_thread_expansion_pulls_full_conversation() {
        let hit = email("m2", Some("conv1"), "Re: Plan", "plan details", 1.0);
        let mut threads = HashMap::new();
        threads.insert(
            "conv1".to_string(),
            vec![
                email("m1", Some("conv1"), "Plan", "plan kickoff", 99.0),
                hit.clone(),
                email("m3", Some("conv1"), "Re: Plan", "plan wrap-up", 99.0),
            ],
        );
        let searcher = FakeSearcher {
            hits: vec![hit],
            threads,
        };
        let svc = service(
            searcher,
            Reranker::Disabled,
            Box::new(FixedGenerator("ok")),
            RetrievalConfig::default(),
        );

        let result = svc.query("plan", None).await;
        assert!(result.success);
        assert_eq!(result.retrieved_emails.len(), 3);
        assert_eq!(result.citations.len(), 3);
    }

    #[tokio::test]
    async fn test_irrelevant_thread_members_filtered() {
        let hit = email("m1", Some("conv1"), "Invoice query", "invoice attached", 1.0);
        let mut threads = HashMap::new();
        threads.insert(
            "conv1".to_string(),
            vec![
                hit.clone(),
                email("m2", Some("conv1"), "Re: lunch", "pizza friday", 99.0),
            ],
        );
        let searcher = FakeSearcher {
            hits: vec![hit],
            threads,
        };
        let svc = service(
            searcher,
            Reranker::Disabled,
            Box::new(FixedGenerator("ok")),
            RetrievalConfig::default(),
        );

        let result = svc.query("invoice", None).await;
        assert_eq!(result.retrieved_emails.len(), 1);
        assert_eq!(result.retrieved_emails[0].id, "m1");
    }

    #[tokio::test]
    async fn test_rerank_skipped_for_small_pool() {
        let called = Arc::new(AtomicBool::new(false));
        let searcher = FakeSearcher {
            hits: vec![email("m1", None, "Budget", "budget", 1.0)],
            threads: HashMap::new(),
        };
        let svc = service(
            searcher,
            Reranker::Embedding(Box::new(SpyEmbedder {
                called: called.clone(),
            })),
            Box::new(FixedGenerator("ok")),
            RetrievalConfig::default(),
        );

        let result = svc.query("budget", None).await;
        assert!(result.success);
        // Pool of 1 never exceeds top_k * rerank_pool_factor.
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_rerank_applied_for_large_pool() {
        let called = Arc::new(AtomicBool::new(false));
        let hit = email("m0", Some("conv1"), "Status report", "status update 0", 1.0);
        let mut threads = HashMap::new();
        threads.insert(
            "conv1".to_string(),
            (0..6)
                .map(|i| {
                    email(
                        &format!("m{}", i),
                        Some("conv1"),
                        "Status report",
                        &format!("status update {}", i),
                        99.0,
                    )
                })
                .collect::<Vec<_>>(),
        );
        let searcher = FakeSearcher {
            hits: vec![hit],
            threads,
        };
        let retrieval = RetrievalConfig {
            top_k: 1,
            ..RetrievalConfig::default()
        };
        let svc = service(
            searcher,
            Reranker::Embedding(Box::new(SpyEmbedder {
                called: called.clone(),
            })),
            Box::new(FixedGenerator("ok")),
            retrieval,
        );

        // Pool of 6 exceeds 1 * 5, so the spy reranker runs and reverses
        // the order.
        let result = svc.query("status", Some(1)).await;
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(result.retrieved_emails[0].id, "m5");
    }

    #[tokio::test]
    async fn test_duplicate_thread_hits_fetch_once() {
        let h1 = email("m1", Some("conv1"), "Deal", "deal terms", 1.0);
        let h2 = email("m2", Some("conv1"), "Re: Deal", "deal update", 2.0);
        let mut threads = HashMap::new();
        threads.insert("conv1".to_string(), vec![h1.clone(), h2.clone()]);
        let searcher = FakeSearcher {
            hits: vec![h1, h2],
            threads,
        };
        let svc = service(
            searcher,
            Reranker::Disabled,
            Box::new(FixedGenerator("ok")),
            RetrievalConfig::default(),
        );

        let result = svc.query("deal", None).await;
        // One thread, two members, no duplicates.
        assert_eq!(result.retrieved_emails.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_conversation_falls_back_to_hit() {
        // conversation_id present but the store has no members for it.
        let hit = email("m1", Some("ghost"), "Quarterly numbers", "numbers inside", 1.0);
        let searcher = FakeSearcher {
            hits: vec![hit],
            threads: HashMap::new(),
        };
        let svc = service(
            searcher,
            Reranker::Disabled,
            Box::new(FixedGenerator("ok")),
            RetrievalConfig::default(),
        );

        let result = svc.query("quarterly numbers", None).await;
        assert!(result.success);
        assert_eq!(result.retrieved_emails.len(), 1);
        assert_eq!(result.retrieved_emails[0].id, "m1");
    }
}
