//! Storage layer for the Lectern QA engine
//!
//! Provides the traits the pipeline depends on for persistent storage of
//! embeddings and chat interactions, plus read access to lesson content.
//! The SQLite implementation lives in [`sqlite`]; retrieval deliberately
//! has no vector index, so `scan_all` is the only read path search uses.

pub mod sqlite;

use crate::error::Result;
use crate::types::{
    ChatInteraction, CompletionOutcome, EmbeddingRecord, InteractionId, LessonDocument, LessonId,
    Page, TextChunk, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistent store of chunk embeddings
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Atomically delete every record for the lesson and insert the new
    /// chunk/vector set. `chunks` and `vectors` must have equal length.
    /// Returns the number of records inserted.
    async fn replace_for_lesson(
        &self,
        document: &LessonDocument,
        chunks: &[TextChunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize>;

    /// Every stored record with a vector, in insertion order
    async fn scan_all(&self) -> Result<Vec<EmbeddingRecord>>;

    /// Number of records stored for one lesson
    async fn count_for_lesson(&self, lesson_id: LessonId) -> Result<usize>;

    /// Delete all records for one lesson, returning how many were removed
    async fn delete_for_lesson(&self, lesson_id: LessonId) -> Result<usize>;
}

/// Durable log of question/answer transactions
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Insert a freshly-created pending interaction
    async fn insert_pending(&self, interaction: &ChatInteraction) -> Result<()>;

    /// Transition a pending interaction to completed. Fails with an
    /// inconsistency error if the interaction is already terminal.
    async fn mark_completed(&self, id: InteractionId, outcome: &CompletionOutcome) -> Result<()>;

    /// Transition a pending interaction to failed, recording the error
    /// detail. Fails if the interaction is already terminal.
    async fn mark_failed(
        &self,
        id: InteractionId,
        error_detail: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Fetch one interaction by id
    async fn get(&self, id: InteractionId) -> Result<Option<ChatInteraction>>;

    /// One user's interactions, newest question first
    async fn history(
        &self,
        user_id: UserId,
        page: usize,
        size: usize,
    ) -> Result<Page<ChatInteraction>>;
}

/// Read access to lesson content and its chapter lineage
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch a lesson's raw content and attribution labels
    async fn fetch(&self, lesson_id: LessonId) -> Result<Option<LessonDocument>>;

    /// Ids of every known lesson, for bulk reindexing
    async fn list_lesson_ids(&self) -> Result<Vec<LessonId>>;
}
