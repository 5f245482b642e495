//! Ollama client for embeddings and completion. Wraps ollama-rs; handy for local runs
//! without Azure credentials.

use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;

use super::{ChatModel, ChatOptions, Embedder, ProviderError};
use crate::config::ModelEndpoint;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Thin wrapper around Ollama. `model` is used for whichever role the client plays.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    model: String,
    timeout: std::time::Duration,
}

impl OllamaClient {
    /// Create from URL string. Default: http://localhost:11434.
    pub fn from_url(url: &str, model: impl Into<String>) -> Result<Self, ProviderError> {
        let inner = Ollama::try_new(url)?;
        Ok(Self {
            inner,
            model: model.into(),
            timeout: std::time::Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn from_endpoint(endpoint: &ModelEndpoint) -> Result<Self, ProviderError> {
        let model = endpoint
            .deployment
            .clone()
            .ok_or_else(|| ProviderError::Misconfigured("missing model name".into()))?;
        let url = endpoint.endpoint.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut client = Self::from_url(url, model)?;
        client.timeout = endpoint.timeout();
        Ok(client)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, ollama_rs::error::OllamaError>>,
    ) -> Result<T, ProviderError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ProviderError::Timeout)?
            .map_err(ProviderError::Ollama)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    /// Embed multiple strings in one call. Returns one embedding per input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = GenerateEmbeddingsRequest::new(
            self.model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let res = self.with_timeout(self.inner.generate_embeddings(req)).await?;
        if res.embeddings.len() != texts.len() {
            return Err(ProviderError::Count {
                expected: texts.len(),
                got: res.embeddings.len(),
            });
        }
        Ok(res.embeddings)
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(&self, prompt: &str, options: &ChatOptions) -> Result<String, ProviderError> {
        let mut model_options = ModelOptions::default();
        if let Some(t) = options.temperature {
            model_options = model_options.temperature(t);
        }
        if let Some(n) = options.max_tokens {
            model_options = model_options.num_predict(n as i32);
        }
        let req =
            GenerationRequest::new(self.model.clone(), prompt.to_string()).options(model_options);
        let res = self.with_timeout(self.inner.generate(req)).await?;
        Ok(res.response)
    }
}
