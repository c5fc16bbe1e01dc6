//! CLI channel — stdin/stdout REPL for local testing.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{ChatClient, IncomingMessage, MessageStream, OutgoingMessage, SendAck};
use crate::error::ChannelError;

/// Room every CLI line is attributed to.
pub const CLI_ROOM: &str = "cli";
/// User every CLI line is attributed to.
pub const CLI_USER: &str = "local-user";

/// A simple CLI channel that reads commands from stdin.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }

    /// Start reading stdin. Each non-empty line becomes one message.
    pub fn start(&self) -> MessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new(CLI_ROOM, CLI_USER, &line);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Box::pin(stream)
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints outgoing messages to stdout.
pub struct CliClient;

#[async_trait]
impl ChatClient for CliClient {
    fn name(&self) -> &str {
        "cli"
    }

    async fn send_message(
        &self,
        room_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendAck, ChannelError> {
        println!("\n{}\n", format_message(room_id, message));
        eprint!("> ");
        Ok(SendAck::default())
    }
}

fn format_message(room_id: &str, message: &OutgoingMessage) -> String {
    match message {
        OutgoingMessage::Text { body } => format!("[{room_id}] {body}"),
        OutgoingMessage::Notice { body } => format!("[{room_id}] ℹ️  {body}"),
        OutgoingMessage::Image { body, url } => format!("[{room_id}] 🖼  {body} <{url}>"),
    }
}
