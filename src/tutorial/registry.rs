//! Session registry — the live tutorials, looked up by user.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::flow::FlowDefinition;
use super::session::Session;
use crate::channels::ChatClient;

/// All sessions created by a service, in creation order.
///
/// Lookup is by user only: a user running the tutorial in two rooms shares
/// one session, the first one created.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Return the session of `user_id`, creating and starting one in
    /// `room_id` if there is none. The flag is `true` when it was created.
    ///
    /// An existing session is claimed for a restart before the registry lock
    /// is released, so the reaper keeps it until [`SessionRegistry::restart`]
    /// has run.
    pub async fn find_or_create(
        &self,
        room_id: &str,
        user_id: &str,
        flow: &Arc<FlowDefinition>,
        client: Arc<dyn ChatClient>,
    ) -> (Arc<Session>, bool) {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.iter().find(|s| s.user_id() == user_id) {
            existing.claim_restart();
            return (Arc::clone(existing), false);
        }

        debug!(user_id, "No existing tutorial session for user");
        let session = Session::new(room_id, user_id, Arc::clone(flow), client);
        sessions.push(Arc::clone(&session));
        // Scheduling only spawns the first wake-up; it never waits on it.
        session.start().await;
        (session, true)
    }

    /// Restart an existing session from the first step.
    pub async fn restart(&self, session: &Arc<Session>) {
        session.restart().await;
    }

    pub async fn find(&self, user_id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.lock().await;
        sessions.iter().find(|s| s.user_id() == user_id).cloned()
    }

    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Drop sessions that completed more than `retention` ago.
    /// Returns the number of sessions dropped.
    ///
    /// Only reads each session's completion stamp, so a session stuck in a
    /// slow send never holds up the registry.
    pub async fn prune_completed(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();

        sessions.retain(|session| {
            let expired = session.is_reapable(now, retention);
            if expired {
                debug!(user_id = %session.user_id(), "Dropping completed tutorial session");
            }
            !expired
        });

        let dropped = before - sessions.len();
        if dropped > 0 {
            info!(count = dropped, remaining = sessions.len(), "Pruned completed tutorial sessions");
        }
        dropped
    }
}

/// Spawn a background task that periodically prunes completed sessions.
pub fn spawn_reaper(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            registry.prune_completed(retention).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::{OutgoingMessage, SendAck};
    use crate::tutorial::session::Progress;
    use crate::error::ChannelError;
    use crate::tutorial::flow::{Step, StepKind};

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

    fn flow(initial_delay_ms: u64) -> Arc<FlowDefinition> {
        let step = Step {
            kind: StepKind::Text,
            body: "hello".into(),
            ..Step::default()
        };
        Arc::new(FlowDefinition::new(
            "",
            HashMap::new(),
            Duration::from_millis(initial_delay_ms),
            vec![step],
        ))
    }

    async fn wait_completed(session: &Arc<Session>) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while !session.progress().await.is_terminal() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("session should complete");
    }

    #[tokio::test(start_paused = true)]
    async fn creates_once_per_user() {
        let registry = SessionRegistry::new();
        let flow = flow(1_000);

        let (first, created) = registry
            .find_or_create("!a", "@ann", &flow, Arc::new(Silent))
            .await;
        assert!(created);
        assert!(first.snapshot().await.pending_timer);

        let (again, created) = registry
            .find_or_create("!a", "@ann", &flow, Arc::new(Silent))
            .await;
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));

        let (other, created) = registry
            .find_or_create("!a", "@bob", &flow, Arc::new(Silent))
            .await;
        assert!(created);
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_match_wins_across_rooms() {
        let registry = SessionRegistry::new();
        let flow = flow(1_000);

        let (first, _) = registry
            .find_or_create("!one", "@ann", &flow, Arc::new(Silent))
            .await;
        let (second, created) = registry
            .find_or_create("!two", "@ann", &flow, Arc::new(Silent))
            .await;

        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.room_id(), "!one");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_progress() {
        let registry = SessionRegistry::new();
        let flow = flow(0);

        let (session, _) = registry
            .find_or_create("!a", "@ann", &flow, Arc::new(Silent))
            .await;
        wait_completed(&session).await;

        registry.restart(&session).await;
        assert_eq!(session.progress().await, Progress::NotStarted);
        wait_completed(&session).await;
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_only_completed() {
        let registry = SessionRegistry::new();

        let (done, _) = registry
            .find_or_create("!a", "@ann", &flow(0), Arc::new(Silent))
            .await;
        let (_running, _) = registry
            .find_or_create("!a", "@bob", &flow(60_000), Arc::new(Silent))
            .await;
        wait_completed(&done).await;

        assert_eq!(registry.prune_completed(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.len().await, 2);

        assert_eq!(registry.prune_completed(Duration::ZERO).await, 1);
        assert_eq!(registry.len().await, 1);
        assert!(registry.find("@ann").await.is_none());
        assert!(registry.find("@bob").await.is_some());
    }

    #[tokio::test]
    async fn concurrent_creates_for_one_user_yield_one_session() {
        let registry = SessionRegistry::new();
        let flow = flow(60_000);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let flow = Arc::clone(&flow);
            handles.push(tokio::spawn(async move {
                registry
                    .find_or_create("!a", "@ann", &flow, Arc::new(Silent))
                    .await
                    .1
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn claimed_session_survives_prune_until_restarted() {
        let registry = SessionRegistry::new();
        let flow = flow(0);

        let (session, _) = registry
            .find_or_create("!a", "@ann", &flow, Arc::new(Silent))
            .await;
        wait_completed(&session).await;

        // A second start finds the completed session; the reaper runs before
        // the restart does.
        let (again, created) = registry
            .find_or_create("!a", "@ann", &flow, Arc::new(Silent))
            .await;
        assert!(!created);
        assert_eq!(registry.prune_completed(Duration::ZERO).await, 0);

        registry.restart(&again).await;
        let found = registry.find("@ann").await.expect("session still registered");
        assert!(Arc::ptr_eq(&found, &session));

        // Once the restarted run completes the session is reapable again.
        wait_completed(&session).await;
        assert_eq!(registry.prune_completed(Duration::ZERO).await, 1);
        assert!(registry.is_empty().await);
    }
}
