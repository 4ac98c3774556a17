//! Subsystem modules for persona-chat.

pub mod chat;
pub mod comms;
pub mod runtime;
