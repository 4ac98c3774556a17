//! persona-chat — relays chat turns to an OpenAI-compatible endpoint.
//!
//! The binary entry point is `src/main.rs`; this library root exposes the
//! internals to it and to the integration tests under `tests/`.

pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod subsystems;
