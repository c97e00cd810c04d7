//! Messaging-directory integration (Slack) and identity reconciliation.
//!
//! monday.com only knows people as free text in assignee columns; Slack
//! knows them by opaque user id. `resolver` maps between the two, `slack`
//! talks to the Web API for profile lookups, enumeration and DMs.

pub mod resolver;
pub mod slack;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use resolver::IdentityResolver;
pub use slack::SlackClient;

const DEFAULT_API_URL: &str = "https://slack.com/api";

/// Slack configuration stored in ~/.taskpulse/config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// A member of the messaging directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl DirectoryUser {
    /// Bots and deactivated accounts never own tasks.
    pub fn is_matchable(&self) -> bool {
        !self.is_bot && !self.deleted
    }
}

/// Errors from directory and messaging operations.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("No Slack bot token configured")]
    NoToken,
    #[error("Slack request failed: {0}")]
    RequestFailed(String),
    #[error("Slack API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
}

/// Read access to the messaging platform's user directory.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<DirectoryUser, DirectoryError>;

    /// The whole directory, in enumeration order. Pagination is internal.
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError>;
}

/// Direct-message delivery.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), DirectoryError>;
}
