//! Shared state for the Comms subsystem — capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below. The chat agent itself is private; channels only submit
//! command lines and finish the turns they start.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! manager (e.g. "I shut down", "new session started") without touching
//! the agent.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::AppError;
use crate::subsystems::chat::{Accepted, ChatAgent, Outbox, PendingTurn};

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    /// A new session was established on the channel.
    SessionStarted { channel_id: String, session_id: String },
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    agent: Arc<ChatAgent>,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(agent: Arc<ChatAgent>, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { agent, event_tx }
    }

    /// Apply one command line on behalf of `session_id`.
    ///
    /// Synchronous: a channel calls this for its lines in arrival order,
    /// then awaits any returned turn with [`CommsState::finish`].
    pub fn accept(&self, session_id: &str, line: &str) -> Accepted {
        self.agent.accept(session_id, line)
    }

    /// Wait for the upstream reply of an accepted turn and push it to
    /// `outbox`, staged or whole.
    pub async fn finish(&self, turn: PendingTurn, outbox: &Outbox) -> Result<(), AppError> {
        self.agent.finish(turn, outbox).await.map_err(AppError::from)
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use crate::llm::LlmProvider;
    use crate::llm::providers::dummy::DummyProvider;

    fn state() -> (CommsState, mpsc::Receiver<CommsEvent>) {
        let agent = Arc::new(ChatAgent::new(LlmProvider::Dummy(DummyProvider), ChatConfig::with_defaults()));
        let (event_tx, event_rx) = mpsc::channel(1);
        (CommsState::new(agent, event_tx), event_rx)
    }

    #[tokio::test]
    async fn accepted_turn_is_finished_through_agent() {
        let (state, _events) = state();
        let (tx, mut rx) = mpsc::channel(4);

        let Accepted::Turn(turn) = state.accept("pty0", "chat ping") else {
            panic!("expected a pending turn");
        };
        state.finish(turn, &tx).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("[echo] ping"));
    }

    #[test]
    fn non_chat_commands_reply_at_once() {
        let (state, _events) = state();
        match state.accept("pty0", "persona.current") {
            Accepted::Reply(reply) => assert_eq!(reply, "No personality selected (none)."),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_outbox_is_comms_error() {
        let (state, _events) = state();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let Accepted::Turn(turn) = state.accept("pty0", "chat hi") else {
            panic!("expected a pending turn");
        };
        let err = state.finish(turn, &tx).await.unwrap_err();
        assert!(matches!(err, AppError::Comms(_)));
    }

    #[tokio::test]
    async fn report_event_drops_when_full() {
        let (state, mut events) = state();
        state.report_event(CommsEvent::ChannelShutdown { channel_id: "a".into() });
        // Capacity 1: the second event is dropped, not blocked on.
        state.report_event(CommsEvent::ChannelShutdown { channel_id: "b".into() });
        match events.recv().await {
            Some(CommsEvent::ChannelShutdown { channel_id }) => assert_eq!(channel_id, "a"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }
}
