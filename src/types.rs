//! Core data types for the Lectern QA engine
//!
//! Defines the identifiers, persistent records, and transient values that
//! flow through the retrieval pipeline: lesson chunks and their embeddings,
//! scored retrieval results, chapter attributions, the durable chat
//! interaction record, and rate-limit decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a lesson (the unit of embedding/reindexing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonId(pub i64);

/// Identifier of a chapter (the unit of attribution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub i64);

/// Identifier of a platform user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

macro_rules! impl_id_display {
    ($($ty:ty),*) => {
        $(impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

impl_id_display!(LessonId, ChapterId, UserId);

/// Unique identifier for chat interactions
///
/// Wraps a UUID to provide type safety and prevent mixing interaction IDs
/// with the numeric lesson/chapter/user identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionId(pub Uuid);

impl InteractionId {
    /// Create a new random interaction ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an interaction ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InteractionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bounded window of lesson text, the atomic unit of embedding
///
/// Ephemeral until embedded; `index` is the 0-based position among the
/// chunks derived from one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub index: usize,
}

/// A lesson's raw content plus the lineage labels used for attribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonDocument {
    pub lesson_id: LessonId,
    pub lesson_title: String,
    pub chapter_id: ChapterId,
    pub chapter_title: String,
    pub content: String,
}

/// Persisted embedding of one lesson chunk
///
/// One lesson owns a contiguous, index-ordered family of records; chunk
/// indices for a lesson are exactly `0..n-1` with no gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub lesson_id: LessonId,
    pub chunk_text: String,
    pub chunk_index: usize,
    pub vector: Vec<f32>,
    pub chapter_id: ChapterId,
    pub lesson_title: String,
    pub chapter_title: String,
    pub created_at: DateTime<Utc>,
}

/// Transient pairing of a record with its similarity score for one query
#[derive(Debug, Clone)]
pub struct ScoredEmbedding {
    pub record: EmbeddingRecord,
    pub score: f32,
}

/// Per-query ranked mapping from retrieved content back to its chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterAttribution {
    pub chapter_id: ChapterId,
    pub chapter_title: String,
    pub relevance_score: f32,
}

/// Lifecycle state of a chat interaction
///
/// `Pending → Completed` or `Pending → Failed`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Pending,
    Completed,
    Failed,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionStatus::Pending => "pending",
            InteractionStatus::Completed => "completed",
            InteractionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InteractionStatus::Pending),
            "completed" => Some(InteractionStatus::Completed),
            "failed" => Some(InteractionStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one question/answer cycle
///
/// Created in `Pending` state before the first provider call so every
/// attempt is logged even if everything downstream fails. On failure the
/// error text goes into `error_detail`; `response` stays `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInteraction {
    pub id: InteractionId,
    pub user_id: UserId,
    pub question: String,
    pub status: InteractionStatus,
    pub response: Option<String>,
    pub error_detail: Option<String>,
    pub confidence_score: Option<f32>,
    pub retrieved_chunk_count: Option<u32>,
    pub related_chapter_ids: Vec<ChapterId>,
    pub question_timestamp: DateTime<Utc>,
    pub response_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChatInteraction {
    /// Create a new pending interaction for a just-accepted question
    pub fn pending(user_id: UserId, question: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: InteractionId::new(),
            user_id,
            question: question.into(),
            status: InteractionStatus::Pending,
            response: None,
            error_detail: None,
            confidence_score: None,
            retrieved_chunk_count: None,
            related_chapter_ids: Vec::new(),
            question_timestamp: now,
            response_timestamp: None,
            created_at: now,
        }
    }
}

/// Fields written when an interaction transitions `Pending → Completed`
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub response: String,
    pub confidence_score: f32,
    pub retrieved_chunk_count: u32,
    pub related_chapter_ids: Vec<ChapterId>,
    pub response_timestamp: DateTime<Utc>,
}

/// Result of the primary QA operation, returned to the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: InteractionId,
    pub content: String,
    pub confidence_score: f32,
    pub related_chapters: Vec<ChapterAttribution>,
    pub timestamp: DateTime<Utc>,
}

/// Admission decision from the rate limiter, rendered by the transport
/// layer as retry/limit headers and a 429-class response on denial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining_requests: u32,
    pub reset_seconds: u64,
    pub limit: u32,
}

/// One page of results from a paginated query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_items: u64,
}

impl<T> Page<T> {
    /// Number of pages needed to cover `total_items` at this page size
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_items.div_ceil(self.size as u64)
    }
}
