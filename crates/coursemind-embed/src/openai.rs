//! OpenAI-compatible embeddings client.
//!
//! Model and dimensionality always come from [`EMBEDDING`], so indexing and
//! querying cannot drift apart.

use std::time::Duration;

use async_trait::async_trait;
use coursemind_core::{EMBEDDING, EmbedError, Embedder, EmbeddingOutput};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    pub api_key: String,
    /// e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: usize,
    /// Inputs per request
    pub batch_size: usize,
}

/// Embeddings client for OpenAI-compatible endpoints.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a new client. A blank key is a configuration error.
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self, EmbedError> {
        if config.api_key.trim().is_empty() {
            return Err(EmbedError::NotConfigured(
                "missing embedding API key".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::NotConfigured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.trim().to_string(),
            max_retries: config.max_retries.max(1),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Sends one batch and returns vectors in input order.
    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let request = EmbeddingRequest {
            model: EMBEDDING.model,
            input: inputs,
            dimensions: EMBEDDING.dimension,
        };

        let mut attempt = 0usize;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                            EmbedError::InvalidResponse(format!("failed to parse response: {e}"))
                        })?;
                        return into_vectors(parsed, inputs.len());
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!("Embedding request returned {}, retry {}", status, attempt);
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbedError::Request(format!(
                        "embeddings endpoint returned {status}: {body}"
                    )));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!("Embedding request failed ({}), retry {}", err, attempt);
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbedError::Request(err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        EMBEDDING.model
    }

    fn dimension(&self) -> usize {
        EMBEDDING.dimension
    }

    async fn embed_text(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let mut outputs = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!("Embedding batch of {} inputs", batch.len());
            let vectors = self.embed_batch(batch).await?;
            outputs.extend(batch.iter().zip(vectors).map(|(text, embedding)| {
                EmbeddingOutput {
                    embedding,
                    token_count: text.split_whitespace().count(),
                }
            }));
        }
        Ok(outputs)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

fn into_vectors(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    response.data.sort_by_key(|entry| entry.index);
    if response.data.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "got {} embeddings for {} inputs",
            response.data.len(),
            expected
        )));
    }
    response
        .data
        .into_iter()
        .map(|entry| {
            if entry.embedding.len() == EMBEDDING.dimension {
                Ok(entry.embedding)
            } else {
                Err(EmbedError::DimensionMismatch {
                    expected: EMBEDDING.dimension,
                    actual: entry.embedding.len(),
                })
            }
        })
        .collect()
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: &str) -> OpenAiEmbedderConfig {
        OpenAiEmbedderConfig {
            api_key: api_key.to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            batch_size: 64,
        }
    }

    fn data(index: usize, fill: f32) -> EmbeddingData {
        EmbeddingData {
            embedding: vec![fill; EMBEDDING.dimension],
            index,
        }
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let result = OpenAiEmbedder::new(config("   "));
        assert!(matches!(result, Err(EmbedError::NotConfigured(_))));
    }

    #[test]
    fn test_endpoint() {
        let embedder = OpenAiEmbedder::new(config("sk-test")).unwrap();
        assert_eq!(embedder.endpoint, "https://api.openai.com/v1/embeddings");
        assert_eq!(embedder.dimension(), EMBEDDING.dimension);
    }

    #[test]
    fn test_request_carries_shared_dimension() {
        let inputs = ["a", "b"];
        let request = EmbeddingRequest {
            model: EMBEDDING.model,
            input: &inputs,
            dimensions: EMBEDDING.dimension,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["dimensions"], EMBEDDING.dimension);
        assert_eq!(json["model"], EMBEDDING.model);
    }

    #[test]
    fn test_into_vectors_orders_by_index() {
        let response = EmbeddingResponse {
            data: vec![data(1, 0.2), data(0, 0.1)],
        };
        let vectors = into_vectors(response, 2).unwrap();
        assert_eq!(vectors[0][0], 0.1);
        assert_eq!(vectors[1][0], 0.2);
    }

    #[test]
    fn test_into_vectors_count_mismatch() {
        let response = EmbeddingResponse {
            data: vec![data(0, 0.1)],
        };
        assert!(matches!(
            into_vectors(response, 2),
            Err(EmbedError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_into_vectors_dimension_mismatch() {
        let response = EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: vec![0.0; 3],
                index: 0,
            }],
        };
        assert!(matches!(
            into_vectors(response, 1),
            Err(EmbedError::DimensionMismatch { actual: 3, .. })
        ));
    }

    #[test]
    fn test_retry_policy() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
        assert!(retry_backoff(10) == retry_backoff(5));
    }
}
