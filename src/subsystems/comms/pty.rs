//! PTY (console) comms channel — reads command lines from stdin and prints
//! every outbound message to stdout.
//!
//! Lines are accepted in arrival order on the read loop; only the upstream
//! call and the staged output of a `chat` turn run in their own task, so a
//! new `chat` can arrive (and supersede staged output) while an earlier
//! turn is still typing. The channel id doubles as the session id: one
//! console, one conversation.
//!
//! Runs until the `shutdown` token is cancelled (Ctrl-C) or stdin is closed;
//! on EOF, in-flight turns are allowed to finish first.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::chat::{Accepted, Outbox};
use crate::subsystems::runtime::{Component, ComponentFuture};
use super::state::{CommsEvent, CommsState};

const OUTBOX_CAPACITY: usize = 64;

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, shutdown))
    }
}

// ── run_pty ──────────────────────────────────────────────────────────────────

async fn run_pty(
    channel_id: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started");
    println!("─────────────────────────────────");
    println!(" persona-chat console  (Ctrl-C to quit)");
    println!(" type `help` for commands");
    println!("─────────────────────────────────");

    let (outbox, mut outbound) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    let printer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            println!("{message}");
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    serve_lines(&channel_id, &state, &shutdown, input, outbox).await;

    // All outbox senders are gone once serve_lines returns.
    printer.await.ok();

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

/// Read lines from `input`, apply each in order and spawn the turns.
pub(crate) async fn serve_lines<R>(
    channel_id: &str,
    state: &Arc<CommsState>,
    shutdown: &CancellationToken,
    input: R,
    outbox: Outbox,
) where
    R: AsyncBufRead + Unpin,
{
    state.report_event(CommsEvent::SessionStarted {
        channel_id: channel_id.to_string(),
        session_id: channel_id.to_string(),
    });

    let mut lines = input.lines();
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(%channel_id, "pty channel shutting down");
                in_flight.abort_all();
                return;
            }

            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!(%channel_id, "pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        let input = input.trim().to_string();
                        if input.is_empty() { continue; }

                        debug!(%channel_id, input = %input, "pty received line");

                        match state.accept(channel_id, &input) {
                            Accepted::Ignored => {}
                            Accepted::Reply(reply) => {
                                if outbox.send(reply).await.is_err() {
                                    warn!(%channel_id, "pty outbox closed");
                                    break;
                                }
                            }
                            Accepted::Turn(turn) => {
                                let state = state.clone();
                                let outbox = outbox.clone();
                                let session_id = channel_id.to_string();
                                in_flight.spawn(async move {
                                    if let Err(e) = state.finish(turn, &outbox).await {
                                        warn!(%session_id, "pty delivery failed: {e}");
                                    }
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    // Input is exhausted; let running turns finish unless shutdown arrives.
    tokio::select! {
        _ = shutdown.cancelled() => in_flight.abort_all(),
        _ = async { while in_flight.join_next().await.is_some() {} } => {}
    }
}
