//! OpenAI-compatible HTTP embedding backend.
//!
//! Both the remote semantic provider and a local llama.cpp-style server speak
//! the `/v1/embeddings` protocol, so one backend covers both chain positions.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::EmbeddingBackend;
use crate::core::config::EmbeddingEndpoint;
use crate::core::errors::KnowledgeError;

pub struct HttpEmbeddingBackend {
    base_url: String,
    model: String,
    dim: usize,
    api_key: Option<String>,
    client: Client,
}

impl HttpEmbeddingBackend {
    pub fn new(endpoint: EmbeddingEndpoint) -> Self {
        Self {
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.model,
            dim: endpoint.dim,
            api_key: endpoint.api_key,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": [text],
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| KnowledgeError::Embedding(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Embedding(format!(
                "{} embed error ({status}): {text}",
                self.model
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| KnowledgeError::Embedding(err.to_string()))?;

        let vector: Vec<f32> = payload["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| {
                KnowledgeError::Embedding(format!("{} returned no embedding data", self.model))
            })?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.is_empty() {
            return Err(KnowledgeError::Embedding(format!(
                "{} returned an empty embedding",
                self.model
            )));
        }

        Ok(vector)
    }
}
