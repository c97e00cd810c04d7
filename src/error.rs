//! Error types for upstream calls and job execution
//!
//! Errors are classified by recoverability:
//! - Retryable: Network issues, timeouts, rate limits
//! - NonRetryable: Configuration errors, malformed responses
//! - RequiresUserAction: Missing or rejected API credentials

use thiserror::Error;

/// Error types for work-item service calls and scheduled jobs
#[derive(Debug, Error)]
pub enum AppError {
    // Retryable errors
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API rate limit exceeded")]
    ApiRateLimit,

    // Non-retryable errors
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Upstream API error {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("Failed to parse upstream response: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(String),

    // Requires user action
    #[error("monday.com API key missing or rejected")]
    Unauthorized,
}

impl AppError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::ApiRateLimit
        )
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(self, AppError::Unauthorized)
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AppError::NetworkError(_) => "Check your internet connection and try again.",
            AppError::Timeout(_) => "monday.com took too long to answer. Try again.",
            AppError::ApiRateLimit => "Wait a minute and try again.",
            AppError::ConfigurationError(_) => "Check your configuration in ~/.taskpulse/config.json",
            AppError::UpstreamStatus { .. } | AppError::GraphQl(_) => {
                "monday.com rejected the request. Check the logs for details."
            }
            AppError::ParseError(_) => "monday.com returned an unexpected response.",
            AppError::IoError(_) => "Check file permissions and disk space.",
            AppError::Unauthorized => "Set a valid MONDAY_API_KEY or monday.apiKey in config.",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else if err.is_decode() {
            AppError::ParseError(err.to_string())
        } else {
            AppError::NetworkError(err.to_string())
        }
    }
}

/// Serializable error representation for the presentation layer
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFacingError {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&AppError> for UserFacingError {
    fn from(err: &AppError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        UserFacingError {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
