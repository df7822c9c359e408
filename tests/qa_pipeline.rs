//! End-to-end tests for the retrieval-augmented QA pipeline
//!
//! Exercises the real SQLite store with deterministic provider stubs:
//! index a lesson, ask questions, and verify the durable interaction log,
//! per-user isolation, and the no-context fallback path.

use async_trait::async_trait;
use lectern_core::{
    ChapterId, ChatInteraction, ChatService, CompletionProvider, EmbeddingProvider, IndexService,
    InteractionStatus, LecternError, LessonId, RagConfig, Result, SqliteStore, UserId,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Embedder that maps graph-themed text onto an axis orthogonal to
/// everything else, so retrieval hits are controlled by the test input
struct StubEmbedder;

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                if text.to_lowercase().contains("graph") {
                    vec![0.0, 1.0, 0.0]
                } else {
                    vec![1.0, 0.0, 0.0]
                }
            })
            .collect())
    }
}

/// Completer that records every prompt it sees and returns a canned answer
#[derive(Default)]
struct RecordingCompleter {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionProvider for RecordingCompleter {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        Ok("Binary search repeatedly halves the search interval.".to_string())
    }
}

struct FailingCompleter;

#[async_trait]
impl CompletionProvider for FailingCompleter {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        Err(LecternError::Provider(
            "completion provider unavailable".to_string(),
        ))
    }
}

fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .init();
    });
}

async fn create_store() -> (Arc<SqliteStore>, TempDir) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("lectern.db")).unwrap());
    store.init_schema().await.unwrap();
    (store, temp_dir)
}

async fn seed_lesson(store: &Arc<SqliteStore>) {
    store.put_chapter(ChapterId(10), "Searching").await.unwrap();
    store
        .put_lesson(
            LessonId(1),
            ChapterId(10),
            "Binary Search",
            "Binary search works on sorted arrays. It compares the target with \
             the middle element and discards the half that cannot contain it, \
             repeating until the target is found or the interval is empty.",
        )
        .await
        .unwrap();
}

async fn index_lesson(store: &Arc<SqliteStore>) {
    let indexer = IndexService::new(
        Arc::new(StubEmbedder),
        store.clone(),
        store.clone(),
        RagConfig::default(),
    );
    let created = indexer.embed_lesson(LessonId(1), Some(80), Some(10)).await.unwrap();
    assert!(created > 0);
}

fn chat_service(
    store: &Arc<SqliteStore>,
    completer: Arc<dyn CompletionProvider>,
) -> ChatService {
    ChatService::new(
        Arc::new(StubEmbedder),
        completer,
        store.clone(),
        store.clone(),
        RagConfig::default(),
    )
}

#[tokio::test]
async fn test_ask_end_to_end() {
    let (store, _temp) = create_store().await;
    seed_lesson(&store).await;
    index_lesson(&store).await;

    let completer = Arc::new(RecordingCompleter::default());
    let service = chat_service(&store, completer.clone());

    let answer = service
        .ask(UserId(42), "How does binary search work?")
        .await
        .unwrap();

    assert_eq!(
        answer.content,
        "Binary search repeatedly halves the search interval."
    );
    assert!(answer.confidence_score > 0.0);
    assert!(answer.confidence_score <= 1.0);
    assert_eq!(answer.related_chapters[0].chapter_id, ChapterId(10));
    assert!((answer.related_chapters[0].relevance_score - 1.0).abs() < 1e-6);

    // The prompt carried labeled context from the indexed lesson
    let prompts = completer.prompts.lock().unwrap();
    assert!(prompts[0].contains("[Source 1 - Searching > Binary Search]"));
    assert!(prompts[0].contains("User Question: How does binary search work?"));

    // Exactly one interaction, completed, with ordered timestamps
    let history = service.history(UserId(42), 0, 20).await.unwrap();
    assert_eq!(history.total_items, 1);
    let interaction = &history.items[0];
    assert_eq!(interaction.status, InteractionStatus::Completed);
    assert_eq!(interaction.id, answer.id);
    assert_eq!(
        interaction.response.as_deref(),
        Some("Binary search repeatedly halves the search interval.")
    );
    assert!(interaction.response_timestamp.unwrap() >= interaction.question_timestamp);
    assert_eq!(interaction.related_chapter_ids, vec![ChapterId(10)]);
    assert!(interaction.error_detail.is_none());
}

#[tokio::test]
async fn test_ask_without_matching_context_still_answers() {
    let (store, _temp) = create_store().await;
    seed_lesson(&store).await;
    index_lesson(&store).await;

    let completer = Arc::new(RecordingCompleter::default());
    let service = chat_service(&store, completer.clone());

    // Graph questions embed orthogonally to the indexed content, so nothing
    // clears the similarity threshold
    let answer = service
        .ask(UserId(42), "Explain graph traversal")
        .await
        .unwrap();

    assert_eq!(answer.confidence_score, 0.0);
    assert!(answer.related_chapters.is_empty());

    let prompts = completer.prompts.lock().unwrap();
    assert!(prompts[0].contains("No relevant context found in the course materials."));

    let history = service.history(UserId(42), 0, 20).await.unwrap();
    assert_eq!(history.items[0].retrieved_chunk_count, Some(0));
}

#[tokio::test]
async fn test_failed_ask_is_logged_then_surfaced() {
    let (store, _temp) = create_store().await;
    seed_lesson(&store).await;
    index_lesson(&store).await;

    let service = chat_service(&store, Arc::new(FailingCompleter));

    let result = service.ask(UserId(7), "How does binary search work?").await;
    assert!(matches!(result, Err(LecternError::Provider(_))));

    let history = service.history(UserId(7), 0, 20).await.unwrap();
    assert_eq!(history.total_items, 1);
    let interaction = &history.items[0];
    assert_eq!(interaction.status, InteractionStatus::Failed);
    assert!(interaction.response.is_none());
    assert!(interaction
        .error_detail
        .as_deref()
        .unwrap()
        .contains("completion provider unavailable"));
    assert_eq!(interaction.confidence_score, Some(0.0));
    assert_eq!(interaction.retrieved_chunk_count, Some(0));
    assert!(interaction.related_chapter_ids.is_empty());
    assert!(interaction.response_timestamp.unwrap() >= interaction.question_timestamp);
}

#[tokio::test]
async fn test_history_is_isolated_across_concurrent_users() {
    let (store, _temp) = create_store().await;
    seed_lesson(&store).await;
    index_lesson(&store).await;

    let service = Arc::new(chat_service(&store, Arc::new(RecordingCompleter::default())));

    let mut handles = Vec::new();
    for round in 0..3 {
        for user in [UserId(1), UserId(2)] {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .ask(user, &format!("user {user} question {round}"))
                    .await
                    .unwrap();
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for user in [UserId(1), UserId(2)] {
        let history = service.history(user, 0, 20).await.unwrap();
        assert_eq!(history.total_items, 3);
        for interaction in &history.items {
            assert!(
                interaction.question.starts_with(&format!("user {user} ")),
                "user {user} saw foreign interaction: {}",
                interaction.question
            );
        }
    }
}

#[tokio::test]
async fn test_reindexing_replaces_chunks() {
    let (store, _temp) = create_store().await;
    seed_lesson(&store).await;

    let indexer = IndexService::new(
        Arc::new(StubEmbedder),
        store.clone(),
        store.clone(),
        RagConfig::default(),
    );

    let first = indexer
        .embed_lesson(LessonId(1), Some(40), Some(5))
        .await
        .unwrap();
    let second = indexer
        .embed_lesson(LessonId(1), Some(120), Some(10))
        .await
        .unwrap();
    assert!(first > second);

    // Only the latest chunk family remains, contiguously indexed
    use lectern_core::EmbeddingStore;
    assert_eq!(store.count_for_lesson(LessonId(1)).await.unwrap(), second);
    let records = store.scan_all().await.unwrap();
    let mut indices: Vec<usize> = records.iter().map(|r| r.chunk_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..second).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_interactions_survive_store_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("lectern.db");

    let first_id;
    {
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        store.init_schema().await.unwrap();
        seed_lesson(&store).await;
        index_lesson(&store).await;

        let service = chat_service(&store, Arc::new(RecordingCompleter::default()));
        first_id = service
            .ask(UserId(5), "How does binary search work?")
            .await
            .unwrap()
            .id;
    }

    let reopened = Arc::new(SqliteStore::new(&db_path).unwrap());
    reopened.init_schema().await.unwrap();

    use lectern_core::InteractionStore;
    let interaction: ChatInteraction = reopened.get(first_id).await.unwrap().unwrap();
    assert_eq!(interaction.status, InteractionStatus::Completed);
    assert_eq!(interaction.user_id, UserId(5));
}
