//! External model providers consumed by the pipeline
//!
//! The pipeline only ever talks to providers through these traits, so tests
//! substitute deterministic fakes and the HTTP client below is swappable.

pub mod openai;

use crate::error::Result;
use async_trait::async_trait;

pub use openai::OpenAiClient;

/// Embedding generation provider
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input text, same length and order as the
    /// input
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Chat completion provider
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate an answer for the given system/user prompt pair
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
