//! traQ REST API client (`/api/v3`).
//!
//! Covers the two calls the bot needs: message search for the history tool
//! and message posting for answer delivery.

use chrono::{DateTime, Utc};
use ichika_config::TraqConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Requests made through the dispatch client time out after this long.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors from the traQ REST API.
#[derive(Debug, thiserror::Error)]
pub enum TraqApiError {
    #[error("traQ API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("traQ API request timed out")]
    Timeout,

    #[error("traQ API network error: {0}")]
    Network(String),

    #[error("Failed to decode traQ API response: {0}")]
    Decode(String),

    #[error("traQ client not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for TraqApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TraqApiError::Timeout
        } else if e.is_decode() {
            TraqApiError::Decode(e.to_string())
        } else {
            TraqApiError::Network(e.to_string())
        }
    }
}

/// Sort orders accepted by `GET /messages`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchSort {
    /// Newest first
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
}

impl SearchSort {
    pub fn as_param(self) -> &'static str {
        match self {
            SearchSort::CreatedAtDesc => "-createdAt",
            SearchSort::CreatedAtAsc => "createdAt",
        }
    }
}

/// Query for `GET /messages`. Unset filters are not sent.
#[derive(Debug, Clone, Default)]
pub struct MessageSearchQuery {
    pub word: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    /// Channel UUID (`in`)
    pub channel_id: Option<String>,
    /// Mentioned user UUID (`to`)
    pub to_user_id: Option<String>,
    /// Author UUID (`from`)
    pub from_user_id: Option<String>,
    pub citation: Option<String>,
    pub bot: Option<bool>,
    pub has_url: Option<bool>,
    pub has_attachments: Option<bool>,
    pub has_image: Option<bool>,
    pub has_video: Option<bool>,
    pub has_audio: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: Option<SearchSort>,
}

impl MessageSearchQuery {
    /// A keyword search.
    pub fn word(word: impl Into<String>) -> Self {
        Self {
            word: Some(word.into()),
            ..Self::default()
        }
    }

    /// Query string pairs, with `limit` clamped to 1–100 and `offset` to 0–9900.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        let mut push = |name: &'static str, value: Option<String>| {
            if let Some(value) = value {
                params.push((name, value));
            }
        };
        let rfc3339 = |t: &DateTime<Utc>| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        push("word", self.word.clone());
        push("after", self.after.as_ref().map(rfc3339));
        push("before", self.before.as_ref().map(rfc3339));
        push("in", self.channel_id.clone());
        push("to", self.to_user_id.clone());
        push("from", self.from_user_id.clone());
        push("citation", self.citation.clone());
        push("bot", self.bot.map(|b| b.to_string()));
        push("hasURL", self.has_url.map(|b| b.to_string()));
        push("hasAttachments", self.has_attachments.map(|b| b.to_string()));
        push("hasImage", self.has_image.map(|b| b.to_string()));
        push("hasVideo", self.has_video.map(|b| b.to_string()));
        push("hasAudio", self.has_audio.map(|b| b.to_string()));
        push("limit", self.limit.map(|l| l.clamp(1, 100).to_string()));
        push("offset", self.offset.map(|o| o.min(9900).to_string()));
        push("sort", self.sort.map(|s| s.as_param().to_string()));
        params
    }
}

/// A message as returned by the search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraqMessage {
    pub id: String,
    pub user_id: String,
    pub channel_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSearchResult {
    pub total_hits: u64,
    pub hits: Vec<TraqMessage>,
}

/// Authenticated traQ REST client.
pub struct TraqClient {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TraqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraqClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl TraqClient {
    /// `base_url` is the API root, e.g. `https://q.trap.jp/api/v3`.
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, TraqApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TraqApiError::NotConfigured(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            client,
        })
    }

    /// Build from `[traq]` configuration; requires `BOT_ACCESS_TOKEN`.
    pub fn from_config(config: &TraqConfig) -> Result<Self, TraqApiError> {
        let token = config
            .bot_access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TraqApiError::NotConfigured("BOT_ACCESS_TOKEN is not set".into()))?;
        Self::new(&config.api_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// `GET /messages`
    pub async fn search_messages(
        &self,
        query: &MessageSearchQuery,
    ) -> Result<MessageSearchResult, TraqApiError> {
        let url = format!("{}/messages", self.base_url);
        debug!(word = ?query.word, "Searching traQ messages");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&query.to_params())
            .send()
            .await?;

        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// `POST /channels/{channelId}/messages` with embedding enabled.
    pub async fn post_message(&self, channel_id: &str, content: &str) -> Result<(), TraqApiError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let body = serde_json::json!({ "content": content, "embed": true });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TraqApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "traQ API request failed");
        Err(TraqApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
