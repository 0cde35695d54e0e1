//! Destinations for events decoded from the gate.
//!
//! The inbound reader hands every [`GateEvent`] to a [`CommandSink`]. What the
//! sink does with it is outside the protocol: the binary either logs events or
//! forwards chat lines to a webhook.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::WebhookConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::dispatcher::GateEvent;

#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn deliver(&self, event: GateEvent) -> Result<()>;
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl CommandSink for LogSink {
    async fn deliver(&self, event: GateEvent) -> Result<()> {
        match event {
            GateEvent::Chat(chat) => info!(
                character = %chat.character,
                channel = %chat.channel,
                content = %chat.content,
                "Chat relayed from gate"
            ),
        }
        Ok(())
    }
}

/// Forwards events into a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<GateEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<GateEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl CommandSink for ChannelSink {
    async fn deliver(&self, event: GateEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
    username: String,
}

/// Posts chat lines to a Discord-style webhook.
///
/// The line body goes in `content` and `[channel] character` is used as the
/// display name.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client, base_url: &str, id: &str, token: &str) -> Self {
        let url = format!("{}/{}/{}", base_url.trim_end_matches('/'), id, token);
        Self { client, url }
    }

    /// Build a sink from config. Returns `None` when id or token is missing.
    pub fn from_config(config: &WebhookConfig) -> Result<Option<Self>> {
        let (Some(id), Some(token)) = (config.id.as_deref(), config.token.as_deref()) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BridgeError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Some(Self::new(client, &config.base_url, id, token)))
    }
}

#[async_trait]
impl CommandSink for WebhookSink {
    async fn deliver(&self, event: GateEvent) -> Result<()> {
        let GateEvent::Chat(chat) = event;
        let message = WebhookMessage {
            content: &chat.content,
            username: chat.display_name(),
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| BridgeError::SinkError(e.to_string()))?;

        let status = resp.status();
        resp.error_for_status()
            .map_err(|e| BridgeError::SinkError(e.to_string()))?;
        debug!(status = status.as_u16(), "Chat line posted to webhook");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::dispatcher::ChatMessage;

    fn chat() -> GateEvent {
        GateEvent::Chat(ChatMessage {
            character: "Alice".into(),
            channel: "World".into(),
            content: "hello".into(),
        })
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::channel(1);
        ChannelSink::new(tx).deliver(chat()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), chat());
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = ChannelSink::new(tx).deliver(chat()).await;
        assert!(matches!(result, Err(BridgeError::ChannelClosed)));
    }

    #[test]
    fn test_webhook_disabled_without_token() {
        let config = WebhookConfig {
            id: Some("123".into()),
            ..WebhookConfig::default()
        };
        assert!(WebhookSink::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_webhook_url() {
        let sink = WebhookSink::new(reqwest::Client::new(), "https://example.test/hooks/", "1", "t");
        assert_eq!(sink.url, "https://example.test/hooks/1/t");
    }

    #[test]
    fn test_webhook_body_shape() {
        let body = serde_json::to_value(WebhookMessage {
            content: "hi",
            username: "[World] Alice".into(),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"content": "hi", "username": "[World] Alice"})
        );
    }
}
