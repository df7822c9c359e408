//! Services layer for the Lectern QA engine
//!
//! Orchestrates the retrieval pipeline over the storage and provider
//! abstractions: indexing lesson content into embeddings, answering
//! questions with retrieved context, and admission control per user.

pub mod chat;
pub mod index;
pub mod rate_limit;

pub use chat::ChatService;
pub use index::IndexService;
pub use rate_limit::RateLimiter;
