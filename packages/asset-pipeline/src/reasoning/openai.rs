//! OpenAI chat-completions backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use asset_pipeline::reasoning::{ApiKey, OpenAiService};
//!
//! let service = OpenAiService::new(ApiKey::from_env()?).with_model("gpt-4o");
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::reasoning::credentials::ApiKey;
use crate::traits::reasoning::{ReasoningRequest, ReasoningService};
use crate::types::config::{ReasoningConfig, DEFAULT_BASE_URL};

/// [`ReasoningService`] over the OpenAI chat-completions API (or any
/// compatible endpoint).
#[derive(Clone)]
pub struct OpenAiService {
    client: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
}

impl OpenAiService {
    /// Create a client with the default model and endpoint.
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: "gpt-4o".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from `OPENAI_API_KEY` plus the model and endpoint settings.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self> {
        Ok(Self::new(ApiKey::from_env()?)
            .with_model(config.model.as_str())
            .with_base_url(config.base_url.as_str()))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl ReasoningService for OpenAiService {
    async fn complete(&self, request: ReasoningRequest) -> std::result::Result<String, ServiceError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt,
                },
            ],
            temperature: 0.0,
            response_format: request.json.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        debug!(step = %request.step, model = %self.model, "Reasoning request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout
                } else {
                    ServiceError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("OpenAI API error {}: {}", status.as_u16(), error_text);
            return Err(if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
                ServiceError::Transient(message)
            } else {
                ServiceError::Fatal(message)
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Transient(format!("malformed response body: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ServiceError::Fatal("empty response from OpenAI".to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// Request/Response types

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::reasoning::ReasoningStep;

    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn service(base: &str) -> OpenAiService {
        OpenAiService::new(ApiKey::new("sk-test")).with_base_url(base)
    }

    #[test]
    fn test_builder() {
        let s = OpenAiService::new(ApiKey::new("sk-test"))
            .with_model("gpt-4")
            .with_base_url("http://localhost:1234/v1/");
        assert_eq!(s.model(), "gpt-4");
        assert_eq!(s.base_url, "http://localhost:1234/v1");
    }

    #[tokio::test]
    async fn test_json_step_requests_json_object() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["response_format"]["type"], "json_object");
                assert_eq!(body["temperature"], 0.0);
                Json(json!({
                    "choices": [{"message": {"content": "{\"document_type\":\"article\"}"}}]
                }))
            }),
        );
        let base = serve(router).await;

        let out = service(&base)
            .complete(ReasoningRequest::new(ReasoningStep::Classify, "sys", "doc"))
            .await
            .unwrap();
        assert_eq!(out, "{\"document_type\":\"article\"}");
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let mut headers = HeaderMap::new();
                headers.insert("retry-after", "2".parse().unwrap());
                (AxumStatus::TOO_MANY_REQUESTS, headers, "slow down")
            }),
        );
        let base = serve(router).await;

        let err = service(&base)
            .complete(ReasoningRequest::new(ReasoningStep::Summarize, "sys", "doc"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[tokio::test]
    async fn test_status_classification() {
        let router = Router::new()
            .route(
                "/bad/v1/chat/completions",
                post(|| async { (AxumStatus::BAD_REQUEST, "invalid model") }),
            )
            .route(
                "/down/v1/chat/completions",
                post(|| async { (AxumStatus::BAD_GATEWAY, "upstream") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let request = || ReasoningRequest::new(ReasoningStep::Summarize, "sys", "doc");

        let bad = service(&format!("http://{}/bad/v1", addr))
            .complete(request())
            .await
            .unwrap_err();
        assert!(matches!(bad, ServiceError::Fatal(msg) if msg.contains("invalid model")));

        let down = service(&format!("http://{}/down/v1", addr))
            .complete(request())
            .await
            .unwrap_err();
        assert!(down.is_transient());
    }
}
