//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use coursemind_core::{GenerateError, GenerationRequest, LanguageModel};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatConfig {
    pub api_key: String,
    /// e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// e.g. `gpt-4o-mini`
    pub model: String,
    pub timeout: Duration,
    pub max_retries: usize,
}

/// Chat completions client.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: usize,
}

impl OpenAiChatModel {
    /// Builds a new client. A blank key is a configuration error.
    pub fn new(config: OpenAiChatConfig) -> Result<Self, GenerateError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerateError::NotConfigured(
                "missing language model API key".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(GenerateError::NotConfigured(
                "missing language model name".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerateError::NotConfigured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.trim().to_string(),
            model: config.model,
            max_retries: config.max_retries.max(1),
        })
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.response_schema.as_ref().map(|schema| {
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "schema": schema.schema,
                        "strict": true,
                    }
                })
            }),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerateError> {
        let body = self.body(request);

        let mut attempt = 0usize;
        loop {
            debug!("Calling {} (attempt {})", self.model, attempt + 1);
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: ChatResponse = resp.json().await.map_err(|e| {
                            GenerateError::InvalidOutput(format!("failed to parse response: {e}"))
                        })?;
                        return first_message(parsed);
                    }

                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!("Chat request returned {}, retry {}", status, attempt);
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(GenerateError::Request(format!(
                        "chat endpoint returned {status}: {text}"
                    )));
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!("Chat request failed ({}), retry {}", err, attempt);
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(GenerateError::Request(err.to_string()));
                }
            }
        }
    }
}

/// Stands in for a model whose credentials are missing.
///
/// Reports not ready, so callers fail before doing any retrieval.
pub struct UnconfiguredModel {
    reason: String,
}

impl UnconfiguredModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    fn model_name(&self) -> &str {
        "unconfigured"
    }

    fn is_ready(&self) -> bool {
        false
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerateError> {
        Err(GenerateError::NotConfigured(self.reason.clone()))
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

fn first_message(response: ChatResponse) -> Result<String, GenerateError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| GenerateError::InvalidOutput("empty completion".to_string()))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursemind_core::ResponseSchema;

    fn config(api_key: &str) -> OpenAiChatConfig {
        OpenAiChatConfig {
            api_key: api_key.to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }

    fn request(schema: Option<ResponseSchema>) -> GenerationRequest {
        GenerationRequest {
            system: "Answer only from context.".to_string(),
            prompt: "What is a loop?".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            response_schema: schema,
        }
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        assert!(matches!(
            OpenAiChatModel::new(config("")),
            Err(GenerateError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_request_body() {
        let model = OpenAiChatModel::new(config("sk-test")).unwrap();
        assert_eq!(model.endpoint, "https://api.openai.com/v1/chat/completions");

        let json = serde_json::to_value(model.body(&request(None))).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "What is a loop?");
        assert_eq!(json["max_tokens"], 1000);
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_request_body_with_schema() {
        let model = OpenAiChatModel::new(config("sk-test")).unwrap();
        let schema = ResponseSchema {
            name: "short_content".to_string(),
            schema: json!({"type": "object"}),
        };
        let json = serde_json::to_value(model.body(&request(Some(schema)))).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["name"], "short_content");
    }

    #[test]
    fn test_first_message() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "Loops repeat."}}]}"#,
        )
        .unwrap();
        assert_eq!(first_message(response).unwrap(), "Loops repeat.");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            first_message(empty),
            Err(GenerateError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_model() {
        let model = UnconfiguredModel::new("OPENAI_API_KEY is not set");
        assert!(!model.is_ready());
        assert!(matches!(
            model.generate(&request(None)).await,
            Err(GenerateError::NotConfigured(_))
        ));
    }
}
