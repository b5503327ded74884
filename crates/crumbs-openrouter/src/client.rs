//! HTTP client for the OpenRouter chat-completions endpoint
//!
//! Each [`CompletionRequest`] becomes a single user message. The engine
//! owns timeouts at the batch level; the HTTP timeout here only bounds a
//! stuck connection.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crumbs_core::{ClientError, CompletionClient, CompletionRequest};

use crate::config::OpenRouterConfig;
use crate::error::{OpenRouterError, Result};

/// Longest error body kept in a [`ClientError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// Extract `choices[0].message.content` from a response body.
///
/// OpenRouter sometimes reports upstream failures as a `200` carrying an
/// `error` object; those map to [`ClientError::Status`].
pub fn completion_text(body: &str) -> std::result::Result<String, ClientError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(ClientError::Status {
            code: error.code.unwrap_or(502),
            body: truncate(&error.message),
        });
    }

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ClientError::EmptyResponse)
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY).collect()
}

/// OpenRouter-backed [`CompletionClient`].
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    app_name: Option<String>,
}

impl OpenRouterClient {
    /// Build a client; fails without an API key.
    pub fn new(config: &OpenRouterConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(OpenRouterError::MissingApiKey)?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("crumbs-openrouter/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            endpoint: config.endpoint(),
            app_name: config.app_name.clone(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&OpenRouterConfig::from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<String, ClientError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [ChatMessage {
                role: "user",
                content: request.prompt.as_str(),
            }],
        };
        debug!(
            model = %request.model,
            prompt_chars = request.prompt.as_str().len(),
            "sending chat completion"
        );

        let mut builder = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(app_name) = &self.app_name {
            builder = builder.header("X-Title", app_name);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), model = %request.model, "chat completion rejected");
            return Err(ClientError::Status {
                code: status.as_u16(),
                body: truncate(&text),
            });
        }
        completion_text(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_text_reads_first_choice() {
        let body = r#"{"id":"gen-1","choices":[{"message":{"role":"assistant","content":"[{\"sha\":\"abc\"}]"}},{"message":{"content":"ignored"}}]}"#;
        assert_eq!(completion_text(body).unwrap(), r#"[{"sha":"abc"}]"#);
    }

    #[test]
    fn test_completion_text_empty_choices() {
        assert_eq!(
            completion_text(r#"{"choices":[]}"#),
            Err(ClientError::EmptyResponse)
        );
        assert_eq!(
            completion_text(r#"{"choices":[{"message":{"content":"  "}}]}"#),
            Err(ClientError::EmptyResponse)
        );
    }

    #[test]
    fn test_completion_text_embedded_error() {
        let body = r#"{"error":{"code":429,"message":"Rate limit exceeded"}}"#;
        assert_eq!(
            completion_text(body),
            Err(ClientError::Status {
                code: 429,
                body: "Rate limit exceeded".to_string()
            })
        );
    }

    #[test]
    fn test_completion_text_rejects_non_json() {
        assert!(matches!(
            completion_text("<html>bad gateway</html>"),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "openai/gpt-4o-mini",
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "openai/gpt-4o-mini",
                "messages": [{"role": "user", "content": "hello"}]
            })
        );
    }

    #[test]
    fn test_new_requires_api_key() {
        let mut config = OpenRouterConfig::new("k");
        config.api_key = None;
        assert!(matches!(
            OpenRouterClient::new(&config),
            Err(OpenRouterError::MissingApiKey)
        ));
    }
}
