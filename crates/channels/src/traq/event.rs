//! traQ bot webhook events and ingress normalization.

use ichika_config::{SessionScope, TraqConfig};
use ichika_core::channel::InboundMessage;
use ichika_core::error::ChannelError;
use ichika_core::session::SessionKey;
use serde::Deserialize;
use subtle::ConstantTimeEq;

/// The bot events the server distinguishes (`X-TRAQ-BOT-EVENT`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Ping,
    MessageCreated,
    Other(String),
}

impl WebhookEvent {
    pub fn parse(name: &str) -> Self {
        match name {
            "PING" => WebhookEvent::Ping,
            "MESSAGE_CREATED" => WebhookEvent::MessageCreated,
            other => WebhookEvent::Other(other.to_string()),
        }
    }
}

/// Body of a `MESSAGE_CREATED` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreatedPayload {
    pub message: CreatedMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMessage {
    pub id: String,
    pub user: MessageAuthor,
    pub channel_id: String,
    pub plain_text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAuthor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub bot: bool,
}

impl MessageCreatedPayload {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ChannelError> {
        serde_json::from_value(value).map_err(|e| ChannelError::InvalidPayload(e.to_string()))
    }
}

/// Turns webhook payloads into orchestrator input.
#[derive(Debug, Clone)]
pub struct TraqIngress {
    bot_name: String,
    scope: SessionScope,
}

impl TraqIngress {
    pub fn new(bot_name: impl Into<String>, scope: SessionScope) -> Self {
        Self {
            bot_name: bot_name.into(),
            scope,
        }
    }

    pub fn from_config(config: &TraqConfig) -> Self {
        Self::new(&config.bot_name, config.session_scope)
    }

    /// Normalize a created message: strip the leading bot mention and derive
    /// the session key.
    pub fn normalize(&self, payload: &MessageCreatedPayload) -> InboundMessage {
        let message = &payload.message;
        InboundMessage {
            text: strip_mention(&message.plain_text, &self.bot_name).to_string(),
            channel_id: message.channel_id.clone(),
            author_id: message.user.id.clone(),
            author_is_bot: message.user.bot,
            session_key: session_key(self.scope, &message.user.id, &message.channel_id),
            message_id: Some(message.id.clone()),
        }
    }
}

/// Remove one leading `@<bot_name>` (ASCII case-insensitive) and the
/// whitespace after it.
pub fn strip_mention<'a>(text: &'a str, bot_name: &str) -> &'a str {
    let Some(rest) = text.strip_prefix('@') else {
        return text;
    };
    match rest.get(..bot_name.len()) {
        Some(head) if head.eq_ignore_ascii_case(bot_name) => rest[bot_name.len()..].trim_start(),
        _ => text,
    }
}

pub fn session_key(scope: SessionScope, user_id: &str, channel_id: &str) -> SessionKey {
    match scope {
        SessionScope::User => SessionKey::new(format!("traq:user:{user_id}")),
        SessionScope::Channel => SessionKey::new(format!("traq:channel:{channel_id}")),
        SessionScope::UserChannel => SessionKey::new(format!("traq:{channel_id}:{user_id}")),
    }
}

/// Compare the webhook token in constant time. Only the length leaks.
pub fn verify_token(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
