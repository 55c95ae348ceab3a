use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::error::CompletionError;
use crate::models::TokenUsage;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// A text-completion backend.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &CompletionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        if config.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; requests will be sent without credentials");
        }

        Ok(Self {
            client,
            api_url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionReq<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResp {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsageResp>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct UsageResp {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl CompletionApi for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let mut request_builder = self.client.post(&self.api_url).json(&ChatCompletionReq {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: 0.9,
        });

        if let Some(api_key) = &self.api_key {
            request_builder = request_builder.bearer_auth(api_key);
        }

        let response = request_builder
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, &request.model, retry_after));
        }

        let body = response
            .json::<ChatCompletionResp>()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| {
                CompletionError::MalformedResponse("response carried no message content".into())
            })?;

        let usage = body.usage.unwrap_or_default();
        Ok(Completion {
            text,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }
}

/// Maps an error status and body to the failure taxonomy.
fn classify_failure(
    status: StatusCode,
    body: &str,
    model: &str,
    retry_after: Option<Duration>,
) -> CompletionError {
    let (code, message) = error_code_and_message(body);
    let message = message.unwrap_or_else(|| format!("HTTP {status}"));

    match code.as_deref() {
        Some("invalid_api_key") => return CompletionError::Authentication(message),
        Some("insufficient_quota") => return CompletionError::QuotaExceeded(message),
        Some("model_not_found") => {
            return CompletionError::ModelNotFound {
                model: model.to_string(),
                message,
            };
        }
        _ => {}
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CompletionError::Authentication(message)
        }
        StatusCode::NOT_FOUND => CompletionError::ModelNotFound {
            model: model.to_string(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited { retry_after },
        _ => CompletionError::Transport(format!("HTTP {status}: {message}")),
    }
}

fn error_code_and_message(body: &str) -> (Option<String>, Option<String>) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, None);
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(json) => {
            let error = json.get("error");
            let code = error
                .and_then(|e| e.get("code"))
                .and_then(|c| c.as_str())
                .map(str::to_string);
            let message = error
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .map(str::to_string);
            (code, message)
        }
        Err(_) => (None, Some(trimmed.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_take_precedence_over_status() {
        let body = r#"{"error":{"message":"You exceeded your current quota","code":"insufficient_quota"}}"#;
        assert_eq!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, body, "m", None),
            CompletionError::QuotaExceeded("You exceeded your current quota".into())
        );

        let body = r#"{"error":{"message":"Incorrect API key","code":"invalid_api_key"}}"#;
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, body, "m", None),
            CompletionError::Authentication(_)
        ));

        let body = r#"{"error":{"message":"The model does not exist","code":"model_not_found"}}"#;
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, body, "gpt-x", None),
            CompletionError::ModelNotFound { model, .. } if model == "gpt-x"
        ));
    }

    #[test]
    fn statuses_classify_without_codes() {
        let retry = Some(Duration::from_secs(3));
        assert_eq!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, "", "m", retry),
            CompletionError::RateLimited { retry_after: retry }
        );
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, "denied", "m", None),
            CompletionError::Authentication(message) if message == "denied"
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "", "m", None),
            CompletionError::Transport(_)
        ));
    }

    #[test]
    fn request_serializes_openai_shape() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let body = serde_json::to_value(ChatCompletionReq {
            model: "gpt-3.5-turbo",
            messages: &messages,
            max_tokens: 10,
            temperature: 0.5,
            top_p: 0.9,
        })
        .unwrap();

        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 10);
    }
}
