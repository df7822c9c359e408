//! Lectern - Retrieval-Augmented QA for a DSA Learning Platform
//!
//! The core engine behind the platform's tutoring chatbot:
//! - Lesson content split into overlapping chunks and embedded
//! - Exhaustive cosine-similarity retrieval over stored vectors
//! - Confidence scoring and per-chapter attribution of answers
//! - Durable logging of every question/answer transaction
//! - Sliding-window per-user rate limiting ahead of the pipeline
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (EmbeddingRecord, ChatInteraction, etc.)
//! - **Storage**: Pooled SQLite persistence and the lesson document source
//! - **Providers**: External embedding and completion model clients
//! - **Services**: Indexing, question answering, and admission control
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lectern_core::{
//!     ChatService, IndexService, LessonId, OpenAiClient, ProviderConfig,
//!     RagConfig, RateLimiter, RateLimitConfig, SqliteStore, UserId,
//! };
//!
//! #[tokio::main]
//! async fn main() -> lectern_core::Result<()> {
//!     let store = Arc::new(SqliteStore::new("lectern.db")?);
//!     store.init_schema().await?;
//!     let provider = Arc::new(OpenAiClient::new(ProviderConfig::default())?);
//!
//!     let indexer = IndexService::new(
//!         provider.clone(), store.clone(), store.clone(), RagConfig::default());
//!     indexer.embed_lesson(LessonId(1), None, None).await?;
//!
//!     let limiter = RateLimiter::new(RateLimitConfig::default());
//!     let chat = ChatService::new(
//!         provider.clone(), provider, store.clone(), store, RagConfig::default());
//!
//!     limiter.admit(UserId(42))?;
//!     let answer = chat.ask(UserId(42), "How does binary search work?").await?;
//!     println!("{} (confidence {})", answer.content, answer.confidence_score);
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod error;
pub mod providers;
pub mod retrieval;
pub mod services;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::{ProviderConfig, RagConfig, RateLimitConfig};
pub use error::{LecternError, Result};
pub use providers::{CompletionProvider, EmbeddingProvider, OpenAiClient};
pub use services::{ChatService, IndexService, RateLimiter};
pub use storage::{sqlite::SqliteStore, DocumentSource, EmbeddingStore, InteractionStore};
pub use types::{
    Answer, ChapterAttribution, ChapterId, ChatInteraction, CompletionOutcome, EmbeddingRecord,
    InteractionId, InteractionStatus, LessonDocument, LessonId, Page, RateLimitDecision,
    ScoredEmbedding, TextChunk, UserId,
};
