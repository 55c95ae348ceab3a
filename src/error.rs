use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Failures surfaced by a completion API call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompletionError {
    #[error("completion API rejected the credentials: {0}")]
    Authentication(String),

    #[error("completion API quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("completion API rate limit reached")]
    RateLimited { retry_after: Option<Duration> },

    #[error("model `{model}` is not available: {message}")]
    ModelNotFound { model: String, message: String },

    #[error("completion API returned an unusable response: {0}")]
    MalformedResponse(String),

    #[error("completion API request failed: {0}")]
    Transport(String),
}

impl CompletionError {
    /// Worth another attempt after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport(_))
    }

    /// Every further call with the same model and key would fail the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::ModelNotFound { .. } | Self::QuotaExceeded(_)
        )
    }
}

/// Failures allowed to reach the caller of the generation pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid generation request: {}", issues.join("; "))]
    Validation { issues: Vec<String> },

    #[error("authentication with the completion API failed: {0}")]
    Authentication(String),

    #[error("completion API quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("completion API rate limit exceeded")]
    RateLimited,

    #[error("model `{model}` unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl GenerationError {
    pub fn validation(issue: impl Into<String>) -> Self {
        Self::Validation {
            issues: vec![issue.into()],
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::QuotaExceeded(_) | Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ModelUnavailable { .. } => StatusCode::BAD_REQUEST,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, user-facing error label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Invalid request",
            Self::Authentication(_) => "Invalid API key",
            Self::QuotaExceeded(_) => "Insufficient quota",
            Self::RateLimited => "Rate limit exceeded",
            Self::ModelUnavailable { .. } => "Model not available",
            Self::Unknown(_) => "Internal error while generating the book",
        }
    }

    /// One-line remediation hint shown next to the label.
    pub fn solution(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Fix the listed issues and submit again",
            Self::Authentication(_) => "Check the OPENAI_API_KEY configured for the service",
            Self::QuotaExceeded(_) => "Check the account balance and usage limits of the API key",
            Self::RateLimited => "Wait a few minutes and try again",
            Self::ModelUnavailable { .. } => {
                "Check that the API key has access to the requested model"
            }
            Self::Unknown(_) => "Try again shortly; contact support if the problem persists",
        }
    }
}

impl From<CompletionError> for GenerationError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Authentication(message) => Self::Authentication(message),
            CompletionError::QuotaExceeded(message) => Self::QuotaExceeded(message),
            CompletionError::RateLimited { .. } => Self::RateLimited,
            CompletionError::ModelNotFound { model, message } => {
                Self::ModelUnavailable { model, message }
            }
            other => Self::Unknown(anyhow::Error::new(other)),
        }
    }
}
