//! Remote embedder for OpenAI-compatible `/embeddings` endpoints.
//!
//! Works against OpenAI itself and against self-hosted servers exposing the
//! same API (text-embeddings-inference, Ollama, vLLM, ...).  A batch of
//! texts is sent in a single request.  Returned vectors are re-normalized,
//! since not every server guarantees unit length.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use chatsroute_kernel::{EmbeddingProvider, Result as RouterResult};

use crate::error::{ProviderError, Result};
use crate::hashing::normalize;

/// Default OpenAI API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Request timeout for one embedding call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`OpenAiEmbedder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API root, without the trailing `/embeddings`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Embedding model name, e.g. `text-embedding-3-small`.
    pub model: String,
    /// Expected vector length.
    pub dimension: usize,
    /// Bearer token.  Optional for self-hosted servers.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Embedding provider backed by an OpenAI-compatible HTTP API.
pub struct OpenAiEmbedder {
    config: OpenAiConfig,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(ProviderError::Config("embedding model must be set".into()));
        }
        if config.dimension == 0 {
            return Err(ProviderError::Config("embedding dimension must be positive".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build http client: {e}")))?;

        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.config.model,
            "input": texts,
        }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        debug!(model = %self.config.model, count = texts.len(), "requesting embeddings");

        let response = request.send().await.map_err(|e| ProviderError::Request {
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request {
                reason: format!("status {status}: {}", truncate(&body, 200)),
            });
        }

        let body: Value = response.json().await.map_err(|e| ProviderError::Response {
            reason: format!("body is not json: {e}"),
        })?;

        parse_embeddings(&body, texts.len(), self.config.dimension)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> RouterResult<Vec<f32>> {
        let mut vectors = self.request(&[text]).await?;
        vectors.pop().ok_or_else(|| {
            ProviderError::Response {
                reason: "no embedding returned".into(),
            }
            .into()
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> RouterResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.request(texts).await?)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

/// Pull `expected` unit vectors out of an `/embeddings` response, ordered
/// by their `index` field.
fn parse_embeddings(body: &Value, expected: usize, dimension: usize) -> Result<Vec<Vec<f32>>> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Response {
            reason: "missing `data` array".into(),
        })?;

    if data.len() != expected {
        return Err(ProviderError::Response {
            reason: format!("expected {expected} embeddings, got {}", data.len()),
        });
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map_or(position, |i| i as usize);
        let raw = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Response {
                reason: format!("item {position} has no `embedding` array"),
            })?;

        let mut vector = raw
            .iter()
            .map(|x| x.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| ProviderError::Response {
                reason: format!("item {position} contains a non-numeric value"),
            })?;

        if vector.len() != dimension {
            return Err(ProviderError::Response {
                reason: format!(
                    "item {position} has dimension {}, expected {dimension}",
                    vector.len()
                ),
            });
        }
        normalize(&mut vector);

        let slot = slots.get_mut(index).ok_or_else(|| ProviderError::Response {
            reason: format!("item index {index} out of range"),
        })?;
        *slot = Some(vector);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| ProviderError::Response {
                reason: format!("no embedding for input {i}"),
            })
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OpenAiConfig {
        OpenAiConfig {
            base_url: "http://localhost:8080/v1/".into(),
            model: "text-embedding-3-small".into(),
            dimension: 2,
            api_key: None,
        }
    }

    #[test]
    fn endpoint_joins_base_url() {
        let embedder = OpenAiEmbedder::new(config()).unwrap();
        assert_eq!(embedder.endpoint(), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn rejects_missing_model() {
        let cfg = OpenAiConfig {
            model: " ".into(),
            ..config()
        };
        assert!(matches!(OpenAiEmbedder::new(cfg), Err(ProviderError::Config(_))));
    }

    #[test]
    fn parses_out_of_order_response() {
        let body = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 2.0] },
                { "index": 0, "embedding": [3.0, 4.0] },
            ]
        });
        let vectors = parse_embeddings(&body, 2, 2).unwrap();
        assert_eq!(vectors[0], vec![0.6, 0.8]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn rejects_wrong_dimension_and_count() {
        let body = json!({ "data": [{ "index": 0, "embedding": [1.0, 0.0, 0.0] }] });
        assert!(parse_embeddings(&body, 1, 2).is_err());
        assert!(parse_embeddings(&body, 2, 3).is_err());
        assert!(parse_embeddings(&json!({}), 1, 2).is_err());
    }
}
