//! HTTP embedding backend for OpenAI-compatible `/embeddings` endpoints.
//!
//! Works against local inference servers (text-embeddings-inference, Ollama,
//! LM Studio) as well as hosted APIs; the endpoint and key come from the
//! environment so nothing secret lands in `config.yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use quarry_core::{QuarryError, Result};

use crate::models::{default_dimensions, resolve_model};
use crate::EmbeddingBackend;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/v1";
const BASE_URL_ENV: &str = "QUARRY_EMBEDDING_URL";
const API_KEY_ENV: &str = "QUARRY_EMBEDDING_API_KEY";

/// Texts per request; larger unit batches are split with a short pause
/// between sub-batches for rate limiting.
pub const BATCH_SIZE: usize = 64;
const BATCH_DELAY_MS: u64 = 200;

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
}

/// Embedding backend speaking the OpenAI `/embeddings` wire format.
///
/// # Examples
///
/// ```
/// use quarry_embed::HttpEmbedding;
///
/// let backend = HttpEmbedding::new("bge-small-en");
/// assert_eq!(backend.model(), "BAAI/bge-small-en-v1.5");
/// ```
pub struct HttpEmbedding {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
    loaded: bool,
}

impl std::fmt::Debug for HttpEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedding")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dim", &self.dim)
            .finish_non_exhaustive()
    }
}

impl HttpEmbedding {
    /// Create a backend for the given short model name or full model id.
    ///
    /// The endpoint comes from `QUARRY_EMBEDDING_URL` (default
    /// `http://127.0.0.1:8080/v1`) and the optional key from
    /// `QUARRY_EMBEDDING_API_KEY`.
    pub fn new(model_name: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var(API_KEY_ENV).ok(),
            model: resolve_model(model_name).to_string(),
            dim: default_dimensions(model_name),
            loaded: false,
        }
    }

    /// The resolved full model id.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: self.model.clone(),
            input,
        };
        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let response = builder
            .send()
            .map_err(|e| QuarryError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(QuarryError::Embedding(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| QuarryError::Embedding(format!("failed to parse response: {e}")))?;
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

impl EmbeddingBackend for HttpEmbedding {
    /// Probe the endpoint with a single text and record the actual
    /// dimensionality it returns.
    fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let probe = self.request(vec!["dimension probe".to_string()])?;
        let vector = probe
            .first()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| QuarryError::Embedding("empty probe response".into()))?;
        self.dim = vector.len();
        self.loaded = true;
        debug!(model = %self.model, dim = self.dim, "embedding backend loaded");
        Ok(())
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut all = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                std::thread::sleep(Duration::from_millis(BATCH_DELAY_MS));
            }
            let vectors = self.request(batch.to_vec())?;
            if vectors.len() != batch.len() {
                return Err(QuarryError::Embedding(format!(
                    "endpoint returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }
            all.extend(vectors);
        }
        Ok(all)
    }

    fn encode_query(&self, query: &str) -> Result<Vec<f32>> {
        let vectors = self.request(vec![query.to_string()])?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| QuarryError::Embedding("empty response for query".into()))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_is_openai_shaped() {
        let request = EmbedRequest {
            model: "BAAI/bge-small-en-v1.5".to_string(),
            input: vec!["fn main() {}".to_string(), "struct Foo {}".to_string()],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "BAAI/bge-small-en-v1.5");
        assert_eq!(json["input"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn response_parsing_extracts_vectors() {
        let json = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3]},
                {"embedding": [0.4, 0.5, 0.6]}
            ]
        }"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[1].embedding, vec![0.4, 0.5, 0.6]);
    }

    #[test]
    fn unloaded_backend_advertises_default_dim() {
        let backend = HttpEmbedding::new("bge-large-en");
        assert_eq!(backend.dim(), 1024);
        assert_eq!(backend.model(), "BAAI/bge-large-en-v1.5");
    }

    #[test]
    fn batch_splitting_counts() {
        let texts: Vec<String> = (0..150).map(|i| format!("text {i}")).collect();
        let batches: Vec<&[String]> = texts.chunks(BATCH_SIZE).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 64);
        assert_eq!(batches[2].len(), 22);
    }
}
