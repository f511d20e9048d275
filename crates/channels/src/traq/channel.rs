//! traQ delivery channel: posts answers back to the origin channel.

use async_trait::async_trait;
use ichika_core::channel::Channel;
use ichika_core::error::ChannelError;
use std::sync::Arc;
use tracing::info;

use super::api::TraqClient;

pub struct TraqChannel {
    client: Arc<TraqClient>,
}

impl TraqChannel {
    pub fn new(client: Arc<TraqClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Channel for TraqChannel {
    fn name(&self) -> &str {
        "traq"
    }

    async fn send(&self, channel_id: &str, content: &str) -> Result<(), ChannelError> {
        self.client
            .post_message(channel_id, content)
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: channel_id.to_string(),
                reason: e.to_string(),
            })?;
        info!(channel_id, chars = content.chars().count(), "Answer delivered to traQ");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn delivery_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/messages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = Arc::new(TraqClient::new(server.uri(), "t", 5).unwrap());
        let channel = TraqChannel::new(client);
        let err = channel.send("c1", "hi").await.unwrap_err();
        assert!(matches!(err, ChannelError::DeliveryFailed { channel, .. } if channel == "c1"));
    }

    #[tokio::test]
    async fn delivers_to_origin_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c9/messages"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = Arc::new(TraqClient::new(server.uri(), "t", 5).unwrap());
        let channel = TraqChannel::new(client);
        assert_eq!(channel.name(), "traq");
        channel.send("c9", "answer").await.unwrap();
    }
}
