//! Chat agent — turn controller, per-session history and personalities.
//!
//! ```text
//! ChatAgent::accept(line)                 synchronous, in arrival order
//!     ├─ Command::parse
//!     ├─ persona.*  → registry + session state → Accepted::Reply
//!     └─ chat       → clear? | guard → init → append → Accepted::Turn
//! ChatAgent::finish(turn)                 async, may overlap other turns
//!     complete → record → strip reasoning → dispatch (staged or single)
//! ```
//!
//! Each session id owns its own history, active personality and turn token.
//! The session map lock is only held for short synchronous sections, never
//! across the upstream call or the staged-output delays.

pub mod command;
pub mod dispatch;
pub mod history;
pub mod persona;
pub mod reasoning;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::AppError;
use crate::llm::{ChatMessage, LlmProvider};

use command::{Command, CommandError, HELP};
use history::ConversationHistory;
use persona::PersonalityRegistry;
use reasoning::{strip_reasoning, with_empty_reasoning};

/// Literal `chat` argument that resets the conversation.
pub const CLEAR_KEYWORD: &str = "clear";

/// Where a turn's outbound messages go, in delivery order.
pub type Outbox = mpsc::Sender<String>;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("personality `{0}` not found")]
    UnknownPersona(String),
    #[error("failed to deliver reply: outbox closed")]
    Outbound,
    #[error("session state error: {0}")]
    State(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::State(msg) => AppError::Memory(msg),
            other => AppError::Comms(other.to_string()),
        }
    }
}

// ── Session state ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ChatSession {
    /// Created lazily on the first turn.
    history: Option<ConversationHistory>,
    /// Bumped whenever `history` is replaced wholesale.
    generation: u64,
    active_persona: Option<String>,
    /// Token of the most recent turn; cancelled when a newer turn starts.
    turn: Option<CancellationToken>,
}

impl ChatSession {
    fn replace_history(&mut self, system_prompt: &str, cap: Option<usize>) {
        match self.history.as_mut() {
            Some(history) => history.reset(system_prompt),
            None => self.history = Some(ConversationHistory::new(system_prompt, cap)),
        }
        self.generation += 1;
    }
}

// ── Accepted commands ─────────────────────────────────────────────────────────

/// Outcome of the synchronous part of a command line.
#[derive(Debug)]
pub enum Accepted {
    /// Blank line; nothing to send.
    Ignored,
    /// The command is complete and this is its reply.
    Reply(String),
    /// A chat turn whose user message is already recorded; see
    /// [`ChatAgent::finish`].
    Turn(PendingTurn),
}

/// A chat turn waiting on the upstream call.
#[derive(Debug)]
pub struct PendingTurn {
    session_id: String,
    token: CancellationToken,
    generation: u64,
    snapshot: Vec<ChatMessage>,
    span: Span,
}

// ── ChatAgent ─────────────────────────────────────────────────────────────────

pub struct ChatAgent {
    provider: LlmProvider,
    config: ChatConfig,
    personas: PersonalityRegistry,
    sessions: Mutex<HashMap<String, ChatSession>>,
}

impl ChatAgent {
    pub fn new(provider: LlmProvider, config: ChatConfig) -> Self {
        let personas = PersonalityRegistry::new(config.personalities.clone());
        Self { provider, config, personas, sessions: Mutex::new(HashMap::new()) }
    }

    pub fn model(&self) -> &str {
        self.provider.default_model()
    }

    pub fn personas(&self) -> &PersonalityRegistry {
        &self.personas
    }

    /// Parse and execute one command line for `session_id`.
    ///
    /// Turn output and the command's direct reply both go to `outbox`,
    /// the direct reply last.
    pub async fn handle(&self, session_id: &str, line: &str, outbox: &Outbox) -> Result<(), ChatError> {
        match self.accept(session_id, line) {
            Accepted::Ignored => Ok(()),
            Accepted::Reply(reply) => deliver(outbox, reply).await,
            Accepted::Turn(turn) => self.finish(turn, outbox).await,
        }
    }

    /// Run the synchronous part of a command line.
    ///
    /// Every session state change a command makes happens here, so callers
    /// that accept lines in arrival order see them applied in that order.
    pub fn accept(&self, session_id: &str, line: &str) -> Accepted {
        let reply = match Command::parse(line) {
            Ok(Command::Chat(prompt)) => return self.start_turn(session_id, &prompt),
            Ok(Command::PersonaList) => self.persona_list_text(),
            Ok(Command::PersonaSet(name)) => match self.set_persona(session_id, &name) {
                Ok(()) => format!("Switched to personality: {name}"),
                Err(e) => capitalize(&e.to_string()),
            },
            Ok(Command::PersonaCurrent) => match self.current_persona(session_id) {
                Ok(Some(name)) => format!("Current personality: {name}"),
                Ok(None) => "No personality selected (none).".to_string(),
                Err(e) => e.to_string(),
            },
            Ok(Command::PersonaClear) => match self.clear_persona(session_id) {
                Ok(()) => "Personality cleared. The default system prompt applies from the next `chat clear`.".to_string(),
                Err(e) => e.to_string(),
            },
            Ok(Command::Help) => self.help_text(),
            Err(CommandError::Empty) => return Accepted::Ignored,
            Err(e @ CommandError::Usage(_)) => e.to_string(),
            Err(e) => format!("{e}\n\n{}", self.help_text()),
        };
        Accepted::Reply(reply)
    }

    /// Await the upstream reply of an accepted turn and deliver it.
    pub async fn finish(&self, turn: PendingTurn, outbox: &Outbox) -> Result<(), ChatError> {
        match self.finish_turn(turn, outbox).await {
            Some(reply) => deliver(outbox, reply).await,
            None => Ok(()),
        }
    }

    /// Run one chat turn. Returns a direct reply for the caller, if any:
    /// the clear confirmation, or the error text when delivery failed.
    pub async fn run_turn(&self, session_id: &str, prompt: &str, outbox: &Outbox) -> Option<String> {
        match self.start_turn(session_id, prompt) {
            Accepted::Turn(turn) => self.finish_turn(turn, outbox).await,
            Accepted::Reply(reply) => Some(reply),
            Accepted::Ignored => None,
        }
    }

    /// Clear check, then guard, init and append. A clear leaves the
    /// previous turn's staged output running.
    fn start_turn(&self, session_id: &str, prompt: &str) -> Accepted {
        let prompt = prompt.trim();
        let span = info_span!("turn", session_id, turn_id = %Uuid::now_v7());

        let started = self.with_session(session_id, |s| {
            let system = self.effective_prompt(s.active_persona.as_deref());

            if prompt == CLEAR_KEYWORD {
                s.replace_history(&system, self.config.history_cap);
                return None;
            }

            let token = CancellationToken::new();
            if let Some(previous) = s.turn.replace(token.clone()) {
                previous.cancel();
            }

            let history = s
                .history
                .get_or_insert_with(|| ConversationHistory::new(&system, self.config.history_cap));
            history.append(ChatMessage::user(prompt));
            let snapshot = history.snapshot();
            Some((token, s.generation, snapshot))
        });

        match started {
            Ok(None) => {
                info!(parent: &span, "conversation history cleared");
                Accepted::Reply("Conversation history cleared.".to_string())
            }
            Ok(Some((token, generation, snapshot))) => Accepted::Turn(PendingTurn {
                session_id: session_id.to_string(),
                token,
                generation,
                snapshot,
                span,
            }),
            Err(e) => {
                warn!(parent: &span, error = %e, "chat turn failed");
                Accepted::Reply(e.to_string())
            }
        }
    }

    async fn finish_turn(&self, turn: PendingTurn, outbox: &Outbox) -> Option<String> {
        let span = turn.span.clone();
        async move {
            match self.complete_turn(turn, outbox).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(error = %e, "chat turn failed");
                    Some(e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn complete_turn(&self, turn: PendingTurn, outbox: &Outbox) -> Result<(), ChatError> {
        debug!(messages = turn.snapshot.len(), "requesting completion");
        let raw = match self.provider.complete(&turn.snapshot, None).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "completion failed, replying with error text");
                with_empty_reasoning(&e.reply_text())
            }
        };

        let recorded = self.with_session(&turn.session_id, |s| {
            if s.generation != turn.generation {
                return false;
            }
            if let Some(history) = s.history.as_mut() {
                history.append(ChatMessage::assistant(raw.as_str()));
            }
            true
        })?;
        if !recorded {
            debug!("history was replaced during the turn, reply not recorded");
        }

        let text = strip_reasoning(&raw);
        let sent = if self.config.split_output {
            let per_char = Duration::from_millis(self.config.char_interval_ms);
            dispatch::dispatch(outbox, &text, &self.config.delimiter, per_char, &turn.token).await?
        } else if text.is_empty() {
            0
        } else {
            outbox.send(text).await.map_err(|_| ChatError::Outbound)?;
            1
        };

        debug!(sent, "turn delivered");
        Ok(())
    }

    /// Activate `name` for `session_id` and reset its history.
    /// Unknown names change nothing.
    pub fn set_persona(&self, session_id: &str, name: &str) -> Result<(), ChatError> {
        let prompt = self
            .personas
            .get(name)
            .ok_or_else(|| ChatError::UnknownPersona(name.to_string()))?;

        self.with_session(session_id, |s| {
            s.active_persona = Some(name.to_string());
            s.replace_history(prompt, self.config.history_cap);
        })?;
        info!(session_id, persona = name, "personality activated");
        Ok(())
    }

    /// Unset the active personality. The live history keeps its current
    /// system message until the next reset.
    pub fn clear_persona(&self, session_id: &str) -> Result<(), ChatError> {
        self.with_session(session_id, |s| s.active_persona = None)?;
        info!(session_id, "personality cleared");
        Ok(())
    }

    pub fn current_persona(&self, session_id: &str) -> Result<Option<String>, ChatError> {
        Ok(self.lock_sessions()?.get(session_id).and_then(|s| s.active_persona.clone()))
    }

    /// Copy of the session's history; empty if no turn has run yet.
    pub fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self
            .lock_sessions()?
            .get(session_id)
            .and_then(|s| s.history.as_ref())
            .map(ConversationHistory::snapshot)
            .unwrap_or_default())
    }

    pub fn help_text(&self) -> String {
        format!("{HELP}\n\nModel: {}", self.model())
    }

    fn persona_list_text(&self) -> String {
        if self.personas.is_empty() {
            return "No personalities configured.".to_string();
        }
        let lines: Vec<String> = self.personas.list().iter().map(|n| format!("- {n}")).collect();
        format!("Available personalities:\n{}", lines.join("\n"))
    }

    fn effective_prompt(&self, active: Option<&str>) -> String {
        active
            .and_then(|name| self.personas.get(name))
            .unwrap_or(&self.config.system_prompt)
            .to_string()
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, HashMap<String, ChatSession>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|_| ChatError::State("session map lock poisoned".into()))
    }

    fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut ChatSession) -> R) -> Result<R, ChatError> {
        let mut sessions = self.lock_sessions()?;
        Ok(f(sessions.entry(session_id.to_string()).or_default()))
    }
}

async fn deliver(outbox: &Outbox, reply: String) -> Result<(), ChatError> {
    outbox.send(reply).await.map_err(|_| ChatError::Outbound)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
