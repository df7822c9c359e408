//! Question answering over retrieved lesson context
//!
//! The ask pipeline: log a pending interaction, embed the question,
//! scan-and-rank stored chunks, score confidence, assemble the grounded
//! prompt, generate the answer, then transition the interaction to its
//! terminal state. The pending row is written before the first provider
//! call so every attempt is durably logged even when everything downstream
//! fails.

use crate::config::RagConfig;
use crate::context::{attribute_chapters, build_context};
use crate::error::{LecternError, Result};
use crate::providers::{CompletionProvider, EmbeddingProvider};
use crate::retrieval::{confidence_score, rank};
use crate::storage::{EmbeddingStore, InteractionStore};
use crate::types::{Answer, ChapterAttribution, ChatInteraction, CompletionOutcome, Page, UserId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Page size used when the caller passes zero
const DEFAULT_PAGE_SIZE: usize = 20;

const SYSTEM_PROMPT: &str = "\
You are a helpful assistant for a DSA (Data Structures and Algorithms) learning platform.
Answer the user's question based on the provided context from course materials.
If the context doesn't contain enough information to answer the question fully,
acknowledge this and provide what information you can based on the available context.
Be clear, concise, and educational in your responses.";

/// Service implementing the retrieval-augmented ask/history operations
pub struct ChatService {
    embedder: Arc<dyn EmbeddingProvider>,
    completer: Arc<dyn CompletionProvider>,
    embeddings: Arc<dyn EmbeddingStore>,
    interactions: Arc<dyn InteractionStore>,
    config: RagConfig,
}

struct PipelineOutput {
    response: String,
    confidence: f32,
    retrieved: usize,
    attributions: Vec<ChapterAttribution>,
}

fn build_user_prompt(question: &str, context: &str) -> String {
    format!(
        "Context from course materials:\n{context}\n\nUser Question: {question}\n\n\
         Please provide a helpful answer based on the context above."
    )
}

fn round_confidence(confidence: f32) -> f32 {
    (confidence * 10_000.0).round() / 10_000.0
}

fn truncate_for_log(question: &str) -> String {
    if question.chars().count() > 100 {
        let prefix: String = question.chars().take(100).collect();
        format!("{prefix}...")
    } else {
        question.to_string()
    }
}

impl ChatService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        embeddings: Arc<dyn EmbeddingStore>,
        interactions: Arc<dyn InteractionStore>,
        config: RagConfig,
    ) -> Self {
        Self {
            embedder,
            completer,
            embeddings,
            interactions,
            config,
        }
    }

    /// Answer a user question with retrieved lesson context
    ///
    /// Every accepted question produces exactly one interaction record,
    /// completed or failed. Validation failures happen before the record is
    /// created; provider and internal failures after it are recorded on the
    /// interaction and then returned to the caller.
    pub async fn ask(&self, user_id: UserId, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(LecternError::InvalidArgument(
                "question cannot be empty".to_string(),
            ));
        }

        info!(
            "processing question for user {user_id}: {}",
            truncate_for_log(question)
        );

        let interaction = ChatInteraction::pending(user_id, question);
        let interaction_id = interaction.id;
        self.interactions.insert_pending(&interaction).await?;

        match self.run_pipeline(question).await {
            Ok(output) => {
                let response_timestamp = Utc::now();
                let confidence = round_confidence(output.confidence);
                let outcome = CompletionOutcome {
                    response: output.response.clone(),
                    confidence_score: confidence,
                    retrieved_chunk_count: output.retrieved as u32,
                    related_chapter_ids: output
                        .attributions
                        .iter()
                        .map(|a| a.chapter_id)
                        .collect(),
                    response_timestamp,
                };
                self.interactions
                    .mark_completed(interaction_id, &outcome)
                    .await?;

                Ok(Answer {
                    id: interaction_id,
                    content: output.response,
                    confidence_score: confidence,
                    related_chapters: output.attributions,
                    timestamp: response_timestamp,
                })
            }
            Err(e) => {
                error!("question pipeline failed for user {user_id}: {e}");
                if let Err(log_err) = self
                    .interactions
                    .mark_failed(interaction_id, &e.to_string(), Utc::now())
                    .await
                {
                    error!("failed to record interaction failure: {log_err}");
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, question: &str) -> Result<PipelineOutput> {
        let query_vectors = self.embedder.embed(&[question.to_string()]).await?;
        let query_vector = query_vectors.into_iter().next().ok_or_else(|| {
            LecternError::Provider("empty embedding response for question".to_string())
        })?;

        let records = self.embeddings.scan_all().await?;
        let scored = rank(
            &query_vector,
            records,
            self.config.top_k,
            self.config.similarity_threshold,
        );
        debug!("retrieved {} similar chunks for question", scored.len());

        let confidence = confidence_score(&scored, self.config.top_k);
        let context = build_context(&scored);
        let attributions = attribute_chapters(&scored);

        let user_prompt = build_user_prompt(question, &context);
        let response = self.completer.complete(SYSTEM_PROMPT, &user_prompt).await?;

        Ok(PipelineOutput {
            response,
            confidence,
            retrieved: scored.len(),
            attributions,
        })
    }

    /// One page of a user's interactions, newest question first
    pub async fn history(
        &self,
        user_id: UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<ChatInteraction>> {
        let size = if size == 0 { DEFAULT_PAGE_SIZE } else { size };
        debug!("retrieving chat history for user {user_id}, page {page} size {size}");
        self.interactions.history(user_id, page, size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NO_CONTEXT_PLACEHOLDER;
    use crate::types::{
        ChapterId, EmbeddingRecord, InteractionId, InteractionStatus, LessonDocument, LessonId,
        TextChunk,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use mockall::mock;

    mock! {
        Embedder {}

        #[async_trait]
        impl EmbeddingProvider for Embedder {
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
        }
    }

    mock! {
        Completer {}

        #[async_trait]
        impl CompletionProvider for Completer {
            async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
        }
    }

    mock! {
        Embeddings {}

        #[async_trait]
        impl EmbeddingStore for Embeddings {
            async fn replace_for_lesson(
                &self,
                document: &LessonDocument,
                chunks: &[TextChunk],
                vectors: &[Vec<f32>],
            ) -> Result<usize>;
            async fn scan_all(&self) -> Result<Vec<EmbeddingRecord>>;
            async fn count_for_lesson(&self, lesson_id: LessonId) -> Result<usize>;
            async fn delete_for_lesson(&self, lesson_id: LessonId) -> Result<usize>;
        }
    }

    mock! {
        Interactions {}

        #[async_trait]
        impl InteractionStore for Interactions {
            async fn insert_pending(&self, interaction: &ChatInteraction) -> Result<()>;
            async fn mark_completed(
                &self,
                id: InteractionId,
                outcome: &CompletionOutcome,
            ) -> Result<()>;
            async fn mark_failed(
                &self,
                id: InteractionId,
                error_detail: &str,
                at: DateTime<Utc>,
            ) -> Result<()>;
            async fn get(&self, id: InteractionId) -> Result<Option<ChatInteraction>>;
            async fn history(
                &self,
                user_id: UserId,
                page: usize,
                size: usize,
            ) -> Result<Page<ChatInteraction>>;
        }
    }

    fn record(id: i64, chapter: i64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id,
            lesson_id: LessonId(1),
            chunk_text: format!("chunk {id}"),
            chunk_index: id as usize,
            vector,
            chapter_id: ChapterId(chapter),
            lesson_title: "Heaps".to_string(),
            chapter_title: "Trees".to_string(),
            created_at: Utc::now(),
        }
    }

    fn service(
        embedder: MockEmbedder,
        completer: MockCompleter,
        embeddings: MockEmbeddings,
        interactions: MockInteractions,
    ) -> ChatService {
        ChatService::new(
            Arc::new(embedder),
            Arc::new(completer),
            Arc::new(embeddings),
            Arc::new(interactions),
            RagConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ask_success_completes_interaction() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .withf(|texts: &[String]| texts == ["what is a heap?"])
            .times(1)
            .returning(|_| Ok(vec![vec![1.0, 0.0]]));

        let mut embeddings = MockEmbeddings::new();
        embeddings.expect_scan_all().times(1).returning(|| {
            Ok(vec![
                record(0, 1, vec![1.0, 0.0]),
                record(1, 1, vec![1.0, 0.0]),
            ])
        });

        let mut completer = MockCompleter::new();
        completer
            .expect_complete()
            .withf(|system, user| {
                system.contains("learning platform")
                    && user.contains("[Source 1 - Trees > Heaps]")
                    && user.contains("User Question: what is a heap?")
            })
            .times(1)
            .returning(|_, _| Ok("A heap is a complete binary tree.".to_string()));

        let mut interactions = MockInteractions::new();
        interactions
            .expect_insert_pending()
            .withf(|interaction: &ChatInteraction| {
                interaction.status == InteractionStatus::Pending
                    && interaction.question == "what is a heap?"
            })
            .times(1)
            .returning(|_| Ok(()));
        interactions
            .expect_mark_completed()
            .withf(|_, outcome: &CompletionOutcome| {
                // Two perfect hits of top_k 5: 0.7*1.0 + 0.3*0.4 = 0.82
                outcome.retrieved_chunk_count == 2
                    && (outcome.confidence_score - 0.82).abs() < 1e-6
                    && outcome.related_chapter_ids == [ChapterId(1)]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service(embedder, completer, embeddings, interactions);
        let answer = service.ask(UserId(1), "what is a heap?").await.unwrap();

        assert_eq!(answer.content, "A heap is a complete binary tree.");
        assert!((answer.confidence_score - 0.82).abs() < 1e-6);
        assert_eq!(answer.related_chapters.len(), 1);
        assert!((answer.related_chapters[0].relevance_score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ask_provider_failure_marks_failed() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|_| Err(LecternError::Provider("quota exhausted".to_string())));

        let mut interactions = MockInteractions::new();
        interactions
            .expect_insert_pending()
            .times(1)
            .returning(|_| Ok(()));
        interactions
            .expect_mark_failed()
            .withf(|_, detail, _| detail.contains("quota exhausted"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = service(
            embedder,
            MockCompleter::new(),
            MockEmbeddings::new(),
            interactions,
        );

        let result = service.ask(UserId(1), "anything").await;
        assert!(matches!(result, Err(LecternError::Provider(_))));
    }

    #[tokio::test]
    async fn test_ask_completion_failure_marks_failed() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|_| Ok(vec![vec![1.0, 0.0]]));

        let mut embeddings = MockEmbeddings::new();
        embeddings
            .expect_scan_all()
            .times(1)
            .returning(|| Ok(vec![record(0, 1, vec![1.0, 0.0])]));

        let mut completer = MockCompleter::new();
        completer
            .expect_complete()
            .times(1)
            .returning(|_, _| Err(LecternError::Provider("generation timed out".to_string())));

        let mut interactions = MockInteractions::new();
        interactions
            .expect_insert_pending()
            .times(1)
            .returning(|_| Ok(()));
        interactions
            .expect_mark_failed()
            .withf(|_, detail, _| detail.contains("generation timed out"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = service(embedder, completer, embeddings, interactions);
        let result = service.ask(UserId(1), "anything").await;
        assert!(matches!(result, Err(LecternError::Provider(_))));
    }

    #[tokio::test]
    async fn test_ask_empty_retrieval_uses_fallback_context() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|_| Ok(vec![vec![1.0, 0.0]]));

        let mut embeddings = MockEmbeddings::new();
        embeddings.expect_scan_all().times(1).returning(|| Ok(vec![]));

        let mut completer = MockCompleter::new();
        completer
            .expect_complete()
            .withf(|_, user| user.contains(NO_CONTEXT_PLACEHOLDER))
            .times(1)
            .returning(|_, _| Ok("I could not find course material on that.".to_string()));

        let mut interactions = MockInteractions::new();
        interactions
            .expect_insert_pending()
            .times(1)
            .returning(|_| Ok(()));
        interactions
            .expect_mark_completed()
            .withf(|_, outcome: &CompletionOutcome| {
                outcome.retrieved_chunk_count == 0
                    && outcome.confidence_score == 0.0
                    && outcome.related_chapter_ids.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service(embedder, completer, embeddings, interactions);
        let answer = service.ask(UserId(1), "something obscure").await.unwrap();

        assert_eq!(answer.confidence_score, 0.0);
        assert!(answer.related_chapters.is_empty());
    }

    #[tokio::test]
    async fn test_ask_blank_question_rejected_without_logging() {
        // No expectations set: any store or provider call would panic
        let service = service(
            MockEmbedder::new(),
            MockCompleter::new(),
            MockEmbeddings::new(),
            MockInteractions::new(),
        );

        let result = service.ask(UserId(1), "   ").await;
        assert!(matches!(result, Err(LecternError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_history_defaults_page_size() {
        let mut interactions = MockInteractions::new();
        interactions
            .expect_history()
            .withf(|user, page, size| *user == UserId(9) && *page == 0 && *size == 20)
            .times(1)
            .returning(|_, page, size| {
                Ok(Page {
                    items: vec![],
                    page,
                    size,
                    total_items: 0,
                })
            });

        let service = service(
            MockEmbedder::new(),
            MockCompleter::new(),
            MockEmbeddings::new(),
            interactions,
        );

        let page = service.history(UserId(9), 0, 0).await.unwrap();
        assert_eq!(page.size, 20);
    }
}
