//! Channel trait and message types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// A chat message received from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub room_id: String,
    pub user_id: String,
    pub body: String,
}

impl IncomingMessage {
    pub fn new(room_id: &str, user_id: &str, body: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            body: body.to_string(),
        }
    }
}

/// Stream of incoming messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A message sent into a room.
///
/// Serializes as `m.room.message` event content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msgtype")]
pub enum OutgoingMessage {
    #[serde(rename = "m.text")]
    Text { body: String },
    #[serde(rename = "m.notice")]
    Notice { body: String },
    #[serde(rename = "m.image")]
    Image { body: String, url: String },
}

impl OutgoingMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn notice(body: impl Into<String>) -> Self {
        Self::Notice { body: body.into() }
    }

    pub fn image(body: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Image {
            body: body.into(),
            url: url.into(),
        }
    }

    /// The `msgtype` of this message.
    pub fn msgtype(&self) -> &'static str {
        match self {
            Self::Text { .. } => "m.text",
            Self::Notice { .. } => "m.notice",
            Self::Image { .. } => "m.image",
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Text { body } | Self::Notice { body } | Self::Image { body, .. } => body,
        }
    }
}

/// Acknowledgement returned by a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendAck {
    /// Identifier the transport assigned to the delivered event, if any.
    pub event_id: Option<String>,
}

/// Outbound side of a chat transport.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Short transport name used in logs and errors.
    fn name(&self) -> &str;

    /// Deliver `message` to `room_id`.
    async fn send_message(
        &self,
        room_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendAck, ChannelError>;
}
