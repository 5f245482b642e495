//! Model clients: text embeddings and chat completions.
//!
//! The pipeline only sees the [`Embedder`] and [`ChatModel`] traits; which
//! backend sits behind them is decided by [`ModelEndpoint::provider`].
//! Nothing here retries. A failed call is returned to the caller as-is.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ModelEndpoint, Provider};

mod azure;
mod ollama;

pub use azure::AzureOpenAi;
pub use ollama::OllamaClient;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embed a single string (e.g. a question).
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(ProviderError::Count {
                expected: 1,
                got: vectors.len(),
            });
        }
        Ok(vectors.into_iter().next().unwrap_or_default())
    }
}

/// Sampling overrides for one completion call. `None` keeps the model default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Single-turn chat completion: prompt in, text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str, options: &ChatOptions) -> Result<String, ProviderError>;
}

/// Build the embedding client described by `endpoint`.
pub fn build_embedder(endpoint: &ModelEndpoint) -> Result<Arc<dyn Embedder>, ProviderError> {
    endpoint
        .validate("embedding")
        .map_err(|e| ProviderError::Misconfigured(e.to_string()))?;
    Ok(match endpoint.provider {
        Provider::Azure => Arc::new(AzureOpenAi::from_endpoint(endpoint)?),
        Provider::Ollama => Arc::new(OllamaClient::from_endpoint(endpoint)?),
    })
}

/// Build the chat client described by `endpoint`.
pub fn build_chat(endpoint: &ModelEndpoint) -> Result<Arc<dyn ChatModel>, ProviderError> {
    endpoint
        .validate("chat")
        .map_err(|e| ProviderError::Misconfigured(e.to_string()))?;
    Ok(match endpoint.provider {
        Provider::Azure => Arc::new(AzureOpenAi::from_endpoint(endpoint)?),
        Provider::Ollama => Arc::new(OllamaClient::from_endpoint(endpoint)?),
    })
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("model client misconfigured: {0}")]
    Misconfigured(String),
    #[error("invalid model endpoint URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("expected {expected} embeddings, got {got}")]
    Count { expected: usize, got: usize },
    #[error("embedding response has index {got} where {expected} was expected")]
    Order { expected: usize, got: usize },
    #[error("model returned no completion")]
    Empty,
    #[error("model request timed out")]
    Timeout,
    #[error("Ollama request failed: {0}")]
    Ollama(#[from] ollama_rs::error::OllamaError),
}
