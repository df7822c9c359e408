//! Configuration for the retrieval pipeline, providers, and rate limiting
//!
//! Plain structs with environment-driven defaults. The host application
//! constructs these explicitly (or takes the defaults) and injects them into
//! the services; nothing here is global state.

use std::env;
use std::time::Duration;

/// Retrieval-augmented generation tuning knobs
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Characters per chunk when splitting lesson content
    pub chunk_size: usize,

    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,

    /// Maximum number of ranked results returned by retrieval
    pub top_k: usize,

    /// Minimum cosine similarity for a chunk to be retained
    pub similarity_threshold: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            similarity_threshold: 0.7,
        }
    }
}

/// Sliding-window rate limiter settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// When false, every request is admitted with full remaining quota
    pub enabled: bool,

    /// Maximum requests per user within one window
    pub max_requests: u32,

    /// Trailing window size
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Configuration for the OpenAI-compatible provider endpoint
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key, read from OPENROUTER_API_KEY
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Model used for embedding generation
    pub embedding_model: String,

    /// Model used for chat completions
    pub chat_model: String,

    /// Max tokens for completion responses
    pub max_tokens: u32,

    /// Sampling temperature for completions
    pub temperature: f32,

    /// Upper bound on any single provider request
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            embedding_model: "openai/text-embedding-3-small".to_string(),
            chat_model: "openai/gpt-3.5-turbo".to_string(),
            max_tokens: 3500,
            temperature: 0.7,
            request_timeout: Duration::from_secs(30),
        }
    }
}
