//! Comms subsystem — manages the external I/O channels.
//!
//! Each channel implements [`runtime::Component`] and is spawned as an
//! independent task by [`run`]. Channels capture their shared
//! [`Arc<CommsState>`] at construction time.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events, session tracking). It is drained in a
//! background task that ends when all channel senders are dropped.
//!
//! [`runtime::Component`]: crate::subsystems::runtime::Component

mod state;
#[cfg(feature = "channel-pty")]
pub mod pty;

pub use state::{CommsEvent, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::subsystems::chat::ChatAgent;
use crate::subsystems::runtime::{Component, run_components};

/// Run all configured comms channels until every one has exited.
pub async fn run(config: &Config, agent: Arc<ChatAgent>, shutdown: CancellationToken) -> Result<(), AppError> {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(agent, event_tx));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
        }
    }

    if components.is_empty() {
        warn!(pty = config.comms_pty_should_load(), "no comms channels loaded — nothing to serve");
    }

    // Monitoring only; errors here never affect channel lifecycle.
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::SessionStarted { ref channel_id, ref session_id } => {
                    debug!(channel_id, session_id, "channel session started");
                }
            }
        }
    });

    // Channels hold their own clones; the drain task ends with them.
    drop(state);
    run_components(components, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use crate::llm::providers::dummy::DummyProvider;

    #[tokio::test]
    async fn no_enabled_channels_returns_at_once() {
        let mut config = Config::test_default();
        config.comms.pty.enabled = false;
        let agent = Arc::new(ChatAgent::new(LlmProvider::Dummy(DummyProvider), config.chat.clone()));

        run(&config, agent, CancellationToken::new()).await.unwrap();
    }
}
