//! OpenAI-compatible provider client (OpenRouter et al.)
//!
//! Implements both provider traits over the `/embeddings` and
//! `/chat/completions` endpoints. Every request is bounded by the
//! client-level timeout; a timeout or transport failure surfaces as a
//! retryable provider error, never hangs the pipeline.

use crate::config::ProviderConfig;
use crate::error::{LecternError, Result};
use crate::providers::{CompletionProvider, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Client for an OpenAI-compatible API endpoint
pub struct OpenAiClient {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl OpenAiClient {
    /// Create a new client from provider configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LecternError::InvalidArgument(
                "provider API key is not configured (set OPENROUTER_API_KEY)".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LecternError::Provider(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp> {
        let response = self
            .client
            .post(format!("{}{}", self.config.base_url, path))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LecternError::Provider(format!("request to {path} timed out"))
                } else {
                    LecternError::Provider(e.to_string())
                }
            })?;

        let status = response.status();
        match status {
            StatusCode::OK => response
                .json::<Resp>()
                .await
                .map_err(|e| LecternError::Provider(format!("malformed response: {e}"))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("provider rejected credentials for {path}");
                Err(LecternError::Provider(
                    "invalid or missing API key".to_string(),
                ))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("provider quota exhausted for {path}");
                Err(LecternError::Provider("provider rate limit hit".to_string()))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                error!("provider call to {path} failed with {status}: {body}");
                Err(LecternError::Provider(format!(
                    "API error (status {status}): {body}"
                )))
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            warn!("empty text list provided for embedding generation");
            return Ok(Vec::new());
        }

        debug!(
            "creating embeddings for {} texts with model {}",
            texts.len(),
            self.config.embedding_model
        );

        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: texts.to_vec(),
        };
        let response: EmbeddingResponse = self.post_json("/embeddings", &request).await?;

        if response.data.len() != texts.len() {
            return Err(LecternError::Provider(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        // The API does not guarantee response order; sort by index
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if user_prompt.trim().is_empty() {
            return Err(LecternError::InvalidArgument(
                "user prompt cannot be empty".to_string(),
            ));
        }

        debug!(
            "creating chat completion with model {}",
            self.config.chat_model
        );

        let request = ChatCompletionRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response: ChatCompletionResponse =
            self.post_json("/chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LecternError::Provider("empty response from chat API".to_string()))
    }
}
