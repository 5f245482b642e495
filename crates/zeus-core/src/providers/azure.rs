//! Azure OpenAI client for embeddings and chat completions.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ChatModel, ChatOptions, Embedder, ProviderError};
use crate::config::ModelEndpoint;

/// One Azure OpenAI deployment. Embedding and chat deployments are separate
/// instances, each with its own endpoint, key and API version.
#[derive(Debug, Clone)]
pub struct AzureOpenAi {
    client: Client,
    embeddings_url: Url,
    chat_url: Url,
}

impl AzureOpenAi {
    pub fn new(
        endpoint: &str,
        deployment: &str,
        api_key: &str,
        api_version: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key.trim()).map_err(|_| {
                ProviderError::Misconfigured("API key is not a valid header value".into())
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        let base = format!(
            "{}/openai/deployments/{}",
            endpoint.trim().trim_end_matches('/'),
            deployment.trim()
        );
        let with_version = |suffix: &str| -> Result<Url, ProviderError> {
            let mut url = Url::parse(&format!("{base}/{suffix}"))?;
            url.query_pairs_mut().append_pair("api-version", api_version.trim());
            Ok(url)
        };
        Ok(Self {
            client,
            embeddings_url: with_version("embeddings")?,
            chat_url: with_version("chat/completions")?,
        })
    }

    /// Build from a validated endpoint config.
    pub fn from_endpoint(endpoint: &ModelEndpoint) -> Result<Self, ProviderError> {
        let field = |v: &Option<String>, name: &str| {
            v.clone()
                .ok_or_else(|| ProviderError::Misconfigured(format!("missing {name}")))
        };
        Self::new(
            &field(&endpoint.endpoint, "endpoint")?,
            &field(&endpoint.deployment, "deployment")?,
            &field(&endpoint.api_key, "api_key")?,
            &field(&endpoint.api_version, "api_version")?,
            endpoint.timeout(),
        )
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<R, ProviderError> {
        let resp = self.client.post(url.clone()).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Embedder for AzureOpenAi {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut parsed: EmbeddingResponse = self
            .post(&self.embeddings_url, &EmbeddingRequest { input: texts })
            .await?;
        if parsed.data.len() != texts.len() {
            return Err(ProviderError::Count {
                expected: texts.len(),
                got: parsed.data.len(),
            });
        }
        parsed.data.sort_by_key(|entry| entry.index);
        if let Some((expected, entry)) = parsed
            .data
            .iter()
            .enumerate()
            .find(|(position, entry)| entry.index != *position)
        {
            return Err(ProviderError::Order {
                expected,
                got: entry.index,
            });
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl ChatModel for AzureOpenAi {
    async fn complete(&self, prompt: &str, options: &ChatOptions) -> Result<String, ProviderError> {
        let body = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let parsed: ChatResponse = self.post(&self.chat_url, &body).await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(ProviderError::Empty)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
