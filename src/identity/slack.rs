//! Slack Web API client: `users.info`, `users.list`, `chat.postMessage`.
//!
//! Every Slack response carries an `ok` flag; `ok: false` is mapped to
//! `DirectoryError::Api` with Slack's error code.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{DirectoryError, DirectoryService, DirectoryUser, MessageSink, SlackConfig};

/// Members requested per `users.list` page.
const USERS_PAGE_LIMIT: u32 = 200;

/// Slackbot is not flagged `is_bot` but is never a task owner.
const SLACKBOT_ID: &str = "USLACKBOT";

pub struct SlackClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct SlackMember {
    id: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Deserialize, Default)]
struct SlackProfile {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<SlackMember> for DirectoryUser {
    fn from(m: SlackMember) -> Self {
        DirectoryUser {
            is_bot: m.is_bot || m.id == SLACKBOT_ID,
            id: m.id,
            email: non_empty(m.profile.email),
            real_name: non_empty(m.real_name).or_else(|| non_empty(m.profile.real_name)),
            display_name: non_empty(m.profile.display_name),
            deleted: m.deleted,
        }
    }
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> Result<Self, DirectoryError> {
        let token = config
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(DirectoryError::NoToken)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DirectoryError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_url, method)
    }

    /// Check Slack's `ok` flag and decode the rest of the body.
    fn decode<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, DirectoryError> {
        let envelope: Envelope = serde_json::from_value(body.clone())
            .map_err(|e| DirectoryError::ParseError(e.to_string()))?;
        if !envelope.ok {
            return Err(DirectoryError::Api(
                envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        serde_json::from_value(body).map_err(|e| DirectoryError::ParseError(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, DirectoryError> {
        let body: serde_json::Value = self
            .client
            .get(self.url(method))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| DirectoryError::RequestFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| DirectoryError::RequestFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| DirectoryError::ParseError(e.to_string()))?;
        Self::decode(body)
    }
}

#[async_trait]
impl DirectoryService for SlackClient {
    async fn get_user(&self, user_id: &str) -> Result<DirectoryUser, DirectoryError> {
        #[derive(Deserialize)]
        struct UserInfo {
            user: Option<SlackMember>,
        }

        let info: UserInfo = self
            .get_json("users.info", &[("user", user_id.to_string())])
            .await?;
        info.user
            .map(DirectoryUser::from)
            .ok_or_else(|| DirectoryError::UserNotFound(user_id.to_string()))
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
        #[derive(Deserialize)]
        struct UsersPage {
            #[serde(default)]
            members: Vec<SlackMember>,
            #[serde(default)]
            response_metadata: Option<ResponseMetadata>,
        }
        #[derive(Deserialize)]
        struct ResponseMetadata {
            #[serde(default)]
            next_cursor: Option<String>,
        }

        let mut users = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![("limit", USERS_PAGE_LIMIT.to_string())];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.clone()));
            }

            let page: UsersPage = self.get_json("users.list", &query).await?;
            users.extend(page.members.into_iter().map(DirectoryUser::from));

            cursor = page
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        log::info!("Slack: enumerated {} directory members", users.len());
        Ok(users)
    }
}

#[async_trait]
impl MessageSink for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), DirectoryError> {
        let body: serde_json::Value = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await
            .map_err(|e| DirectoryError::RequestFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| DirectoryError::RequestFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| DirectoryError::ParseError(e.to_string()))?;

        let _: Envelope = Self::decode(body)?;
        Ok(())
    }
}
