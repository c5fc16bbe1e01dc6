//! TutorialService — the `!start` entry point.
//!
//! Owns the loaded flow and the session registry. The host bot routes
//! `!start` from a room to [`TutorialService::start`] and posts the returned
//! text back as a notice.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::flow::FlowDefinition;
use super::registry::{self, SessionRegistry};
use crate::channels::{ChatClient, OutgoingMessage};

/// Identifier the service registers under with the host bot.
pub const SERVICE_TYPE: &str = "riotbot";

/// Reply when a new session is created.
pub const STARTING_REPLY: &str = "Starting tutorial";
/// Reply when an existing session is restarted.
pub const RESTARTING_REPLY: &str = "Restarting tutorial";

/// A command the service answers to, as a path of words after `!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub path: Vec<&'static str>,
    pub description: &'static str,
}

pub struct TutorialService {
    flow: Arc<FlowDefinition>,
    registry: Arc<SessionRegistry>,
}

impl TutorialService {
    pub fn new(flow: FlowDefinition) -> Arc<Self> {
        Arc::new(Self {
            flow: Arc::new(flow),
            registry: SessionRegistry::new(),
        })
    }

    pub fn service_type(&self) -> &'static str {
        SERVICE_TYPE
    }

    pub fn flow(&self) -> &Arc<FlowDefinition> {
        &self.flow
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Commands supported by this service.
    pub fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec {
            path: vec!["start"],
            description: "Starts the tutorial, or restarts it if already running.",
        }]
    }

    /// Start the tutorial for `user_id` in `room_id`, or restart it if the
    /// user already has one. Returns the confirmation text.
    ///
    /// Returns as soon as the first step is queued.
    pub async fn start(&self, room_id: &str, user_id: &str, client: Arc<dyn ChatClient>) -> String {
        let (session, created) = self
            .registry
            .find_or_create(room_id, user_id, &self.flow, client)
            .await;

        if created {
            tracing::info!(user_id, room_id, "Starting tutorial");
            STARTING_REPLY.to_string()
        } else {
            self.registry.restart(&session).await;
            tracing::info!(user_id, room_id = %session.room_id(), "Restarting tutorial");
            RESTARTING_REPLY.to_string()
        }
    }

    /// Route a chat line. `!start` (any trailing args are ignored) starts
    /// the tutorial and yields the notice to post; anything else is `None`.
    pub async fn handle_command(
        &self,
        room_id: &str,
        user_id: &str,
        text: &str,
        client: Arc<dyn ChatClient>,
    ) -> Option<OutgoingMessage> {
        let mut words = text.trim().strip_prefix('!')?.split_whitespace();
        match words.next()? {
            "start" => {
                let reply = self.start(room_id, user_id, client).await;
                Some(OutgoingMessage::notice(reply))
            }
            _ => None,
        }
    }

    /// Periodically drop sessions that completed more than `retention` ago.
    pub fn spawn_reaper(&self, interval: Duration, retention: Duration) -> JoinHandle<()> {
        registry::spawn_reaper(Arc::clone(&self.registry), interval, retention)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::SendAck;
    use crate::error::ChannelError;
    use crate::tutorial::flow::Step;
    use crate::tutorial::session::Progress;

    struct Silent;

    #[async_trait]
    impl ChatClient for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn send_message(
            &self,
            _room_id: &str,
            _message: &OutgoingMessage,
        ) -> Result<SendAck, ChannelError> {
            Ok(SendAck::default())
        }
    }

    fn service() -> Arc<TutorialService> {
        let step = Step {
            body: "hello".into(),
            delay: Duration::from_secs(5),
            ..Step::default()
        };
        TutorialService::new(FlowDefinition::new(
            "",
            HashMap::new(),
            Duration::from_secs(1),
            vec![step.clone(), step],
        ))
    }

    #[test]
    fn registration_identity() {
        let svc = service();
        assert_eq!(svc.service_type(), "riotbot");
        assert_eq!(svc.commands()[0].path, vec!["start"]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_then_restart_replies() {
        let svc = service();
        assert_eq!(svc.start("!a", "@ann", Arc::new(Silent)).await, STARTING_REPLY);
        assert_eq!(svc.start("!a", "@ann", Arc::new(Silent)).await, RESTARTING_REPLY);
        assert_eq!(svc.registry().len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_does_not_wait_for_steps() {
        let svc = service();
        svc.start("!a", "@ann", Arc::new(Silent)).await;

        let session = svc.registry().find("@ann").await.unwrap();
        assert_eq!(session.progress().await, Progress::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_command_routes_start() {
        let svc = service();
        let reply = svc
            .handle_command("!a", "@ann", "  !start now please ", Arc::new(Silent))
            .await;
        assert_eq!(reply, Some(OutgoingMessage::notice(STARTING_REPLY)));

        let reply = svc.handle_command("!a", "@ann", "!start", Arc::new(Silent)).await;
        assert_eq!(reply, Some(OutgoingMessage::notice(RESTARTING_REPLY)));
    }

    #[tokio::test]
    async fn handle_command_ignores_other_text() {
        let svc = service();
        for text in ["start", "!stop", "!", "hello !start", ""] {
            assert!(
                svc.handle_command("!a", "@ann", text, Arc::new(Silent)).await.is_none(),
                "{text:?} should not be handled"
            );
        }
        assert!(svc.registry().is_empty().await);
    }
}
