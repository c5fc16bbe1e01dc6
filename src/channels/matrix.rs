//! Matrix channel — sends room messages through the client-server API.
//!
//! Send-only: inbound sync and command routing belong to the host bot.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::channels::{ChatClient, OutgoingMessage, SendAck};
use crate::config::MatrixConfig;
use crate::error::ChannelError;

/// Upper bound on one send, so a stuck homeserver cannot hold a session.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Matrix client bound to one homeserver and access token.
pub struct MatrixClient {
    homeserver_url: String,
    access_token: SecretString,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: Option<String>,
}

impl MatrixClient {
    pub fn new(config: MatrixConfig) -> Self {
        Self {
            homeserver_url: config.homeserver_url,
            access_token: config.access_token,
            client: reqwest::Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to build Matrix HTTP client with timeout: {}", e);
                    reqwest::Client::new()
                }),
        }
    }

    /// `PUT /_matrix/client/r0/rooms/{room_id}/send/m.room.message/{txn_id}`.
    fn send_url(&self, room_id: &str, txn_id: &str) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&self.homeserver_url)
            .map_err(|e| ChannelError::Http(format!("invalid homeserver URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ChannelError::Http("homeserver URL cannot be a base".into()))?
            .pop_if_empty()
            .extend([
                "_matrix",
                "client",
                "r0",
                "rooms",
                room_id,
                "send",
                "m.room.message",
                txn_id,
            ]);
        Ok(url)
    }
}

#[async_trait]
impl ChatClient for MatrixClient {
    fn name(&self) -> &str {
        "matrix"
    }

    async fn send_message(
        &self,
        room_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendAck, ChannelError> {
        let txn_id = uuid::Uuid::new_v4().to_string();
        let url = self.send_url(room_id, &txn_id)?;

        let resp = self
            .client
            .put(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "matrix".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "matrix".into(),
                reason: format!("{status}: {body}"),
            });
        }

        let parsed: SendResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;

        tracing::debug!(room_id, event_id = ?parsed.event_id, "Matrix message sent");
        Ok(SendAck {
            event_id: parsed.event_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> MatrixClient {
        MatrixClient::new(MatrixConfig {
            homeserver_url: url.to_string(),
            access_token: SecretString::from("token".to_string()),
        })
    }

    #[test]
    fn send_url_escapes_room_id() {
        let url = client("https://matrix.example.org")
            .send_url("!room/id:example.org", "txn1")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://matrix.example.org/_matrix/client/r0/rooms/!room%2Fid:example.org/send/m.room.message/txn1"
        );
    }

    #[test]
    fn send_url_keeps_base_path() {
        let url = client("https://example.org/matrix/").send_url("!r:x", "t").unwrap();
        assert!(url.as_str().starts_with("https://example.org/matrix/_matrix/client/r0/rooms/"));
    }

    #[test]
    fn invalid_homeserver_is_an_error() {
        assert!(client("not a url").send_url("!r:x", "t").is_err());
    }
}
