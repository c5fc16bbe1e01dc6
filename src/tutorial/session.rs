//! Tutorial session — one user's progress through the flow.
//!
//! Progresses linearly: NotStarted → AtStep(0) → … → AtStep(N-1) → Completed.
//!
//! Every wake-up is its own spawned task stamped with the session epoch at
//! scheduling time. `restart` aborts the pending task and bumps the epoch, so
//! a task that already got past its sleep finds a stale epoch and does
//! nothing. The advance holds the session lock while it renders, sends and
//! schedules the next step, which serializes it against `restart`.
//!
//! The completion stamp and pending restart claims live outside that lock so
//! the registry can decide whether a session is reapable without waiting on
//! an in-flight send.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::flow::{FlowDefinition, Step, StepKind};
use super::template;
use crate::channels::{ChatClient, OutgoingMessage};

/// Where a session is in the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum Progress {
    NotStarted,
    AtStep(usize),
    Completed,
}

impl Progress {
    /// Index view of the progress: `-1` before the first step, `len` once
    /// completed.
    pub fn index(&self, flow_len: usize) -> i64 {
        match self {
            Self::NotStarted => -1,
            Self::AtStep(i) => *i as i64,
            Self::Completed => flow_len as i64,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Step index the next advance will send, if any.
    fn next_index(&self) -> Option<usize> {
        match self {
            Self::NotStarted => Some(0),
            Self::AtStep(i) => Some(i + 1),
            Self::Completed => None,
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::AtStep(i) => write!(f, "step_{i}"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

struct SessionState {
    progress: Progress,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub room_id: String,
    pub user_id: String,
    pub progress: Progress,
    pub epoch: u64,
    pub pending_timer: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A live tutorial for one user in one room.
pub struct Session {
    room_id: String,
    user_id: String,
    flow: Arc<FlowDefinition>,
    client: Arc<dyn ChatClient>,
    variables: HashMap<String, String>,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    /// Set when the last run completed, cleared on restart.
    completed_at: parking_lot::Mutex<Option<DateTime<Utc>>>,
    /// Restarts announced by the registry that have not run yet.
    restart_claims: AtomicUsize,
}

impl Session {
    /// Create a session that has not started yet. Call [`Session::start`] to
    /// queue the first step.
    pub fn new(
        room_id: &str,
        user_id: &str,
        flow: Arc<FlowDefinition>,
        client: Arc<dyn ChatClient>,
    ) -> Arc<Self> {
        let variables = flow.templates.clone();
        Arc::new(Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            flow,
            client,
            variables,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                progress: Progress::NotStarted,
                epoch: 0,
                timer: None,
            }),
            completed_at: parking_lot::Mutex::new(None),
            restart_claims: AtomicUsize::new(0),
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue the first step after the flow's initial delay.
    pub async fn start(self: &Arc<Self>) {
        self.reset_and_queue().await;
        tracing::info!(user_id = %self.user_id, room_id = %self.room_id, "Tutorial started");
    }

    /// Cancel any pending step and run the flow again from the top.
    pub async fn restart(self: &Arc<Self>) {
        let epoch = self.reset_and_queue().await;
        self.release_restart_claim();
        tracing::info!(user_id = %self.user_id, room_id = %self.room_id, epoch, "Tutorial restarted");
    }

    pub async fn progress(&self) -> Progress {
        self.state.lock().await.progress
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            room_id: self.room_id.clone(),
            user_id: self.user_id.clone(),
            progress: state.progress,
            epoch: state.epoch,
            pending_timer: state.timer.as_ref().is_some_and(|t| !t.is_finished()),
            created_at: self.created_at,
            completed_at: *self.completed_at.lock(),
        }
    }

    /// Announce that a restart is about to run. Until it has, the session is
    /// not reapable even if its previous run completed.
    pub(crate) fn claim_restart(&self) {
        self.restart_claims.fetch_add(1, Ordering::SeqCst);
    }

    fn release_restart_claim(&self) {
        let _ = self
            .restart_claims
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Whether the session completed at least `retention` before `now` and
    /// has no restart pending. Never waits on the session lock.
    pub fn is_reapable(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        if self.restart_claims.load(Ordering::SeqCst) > 0 {
            return false;
        }
        self.completed_at.lock().is_some_and(|done| {
            now.signed_duration_since(done)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= retention)
        })
    }

    async fn reset_and_queue(self: &Arc<Self>) -> u64 {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.epoch += 1;
        state.progress = Progress::NotStarted;
        *self.completed_at.lock() = None;
        self.queue_next(&mut state, self.flow.initial_delay);
        state.epoch
    }

    /// Spawn the wake-up for the next advance. Caller holds the state lock
    /// and has already cleared `state.timer`.
    fn queue_next(self: &Arc<Self>, state: &mut SessionState, delay: Duration) {
        let epoch = state.epoch;
        tracing::debug!(
            user_id = %self.user_id,
            current = %state.progress,
            delay_ms = delay.as_millis() as u64,
            epoch,
            "Queueing next tutorial step"
        );

        let session = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            session.advance(epoch).await;
        }));
    }

    async fn advance(self: Arc<Self>, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            tracing::debug!(
                user_id = %self.user_id,
                stale = epoch,
                current = state.epoch,
                "Ignoring stale tutorial timer"
            );
            return;
        }

        // This task is the pending timer; it is no longer pending.
        state.timer = None;

        let Some(index) = state.progress.next_index() else {
            return;
        };

        let Some(step) = self.flow.step(index) else {
            state.progress = Progress::Completed;
            *self.completed_at.lock() = Some(Utc::now());
            tracing::info!(user_id = %self.user_id, room_id = %self.room_id, "Tutorial ended");
            return;
        };

        state.progress = Progress::AtStep(index);
        tracing::debug!(user_id = %self.user_id, step = index, "Performing tutorial step");

        self.send_step(index, step).await;
        self.queue_next(&mut state, step.delay);
    }

    /// Send one step. Delivery failures are logged and otherwise ignored.
    async fn send_step(&self, index: usize, step: &Step) {
        let body = template::render(step, &self.variables);
        let message = match step.kind {
            StepKind::Image => OutgoingMessage::image(body, self.flow.image_url(step)),
            StepKind::Notice => OutgoingMessage::notice(body),
            StepKind::Text => OutgoingMessage::text(body),
        };

        match self.client.send_message(&self.room_id, &message).await {
            Ok(ack) => tracing::info!(
                user_id = %self.user_id,
                room_id = %self.room_id,
                step = index,
                kind = %step.kind,
                event_id = ?ack.event_id,
                "Sent tutorial message"
            ),
            Err(e) => tracing::warn!(
                user_id = %self.user_id,
                room_id = %self.room_id,
                step = index,
                kind = %step.kind,
                error = %e,
                "Failed to send tutorial message"
            ),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("room_id", &self.room_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
