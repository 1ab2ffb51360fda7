//! OpenAI embeddings client

use agent_core::{
    error::{AgentError, Result},
    provider::Embedder,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http::{RuntimeSettings, build_client, status_error, transport_error};
use crate::retry::with_retry;

const PROVIDER: &str = "openai-embeddings";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Embedding client using the OpenAI `/embeddings` endpoint
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, settings: &RuntimeSettings) -> Result<Self> {
        Ok(Self {
            http: build_client(settings)?,
            api_key: api_key.into(),
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            max_retries: settings.max_retries,
        })
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn send(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("{PROVIDER} response: {e}")))?;
        parsed.into_vectors(texts.len())
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(self.max_retries, move || self.send(texts)).await
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
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

impl EmbeddingResponse {
    /// Vectors in input order
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            return Err(AgentError::Parse(format!(
                "{PROVIDER}: expected {expected} vectors, got {}",
                self.data.len()
            )));
        }
        self.data.sort_by_key(|d| d.index);
        Ok(self.data.into_iter().map(|d| d.embedding).collect())
    }
}
