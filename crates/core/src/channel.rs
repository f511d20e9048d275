//! Channel trait: delivery of answers back to the chat platform,
//! and the normalized inbound message handed to the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::session::SessionKey;

/// A chat message after ingress filtering and normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The question text, with any leading bot mention removed
    pub text: String,

    /// Where the answer must be delivered
    pub channel_id: String,

    /// Platform user id of the author
    pub author_id: String,

    /// Whether the author is a bot (including this bot itself)
    pub author_is_bot: bool,

    /// Which conversation this message belongs to
    pub session_key: SessionKey,

    /// Platform message id, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl InboundMessage {
    /// A message typed on the local console.
    pub fn local(text: impl Into<String>, session_key: SessionKey) -> Self {
        Self {
            text: text.into(),
            channel_id: "cli".into(),
            author_id: "local_user".into(),
            author_is_bot: false,
            session_key,
            message_id: None,
        }
    }
}

/// Outbound delivery to the chat platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "traq", "cli").
    fn name(&self) -> &str;

    /// Post `content` to the channel identified by `channel_id`.
    async fn send(&self, channel_id: &str, content: &str) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_message_is_never_from_a_bot() {
        let msg = InboundMessage::local("こんにちは", "cli:cli_user".into());
        assert!(!msg.author_is_bot);
        assert_eq!(msg.channel_id, "cli");
        assert_eq!(msg.session_key.as_str(), "cli:cli_user");
    }
}
