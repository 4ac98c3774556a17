//! Command-line grammar for the chat agent.
//!
//! ```text
//! chat <text>          one turn; `chat clear` resets history
//! persona.list         list personality names
//! persona.set <name>   activate a personality (resets history)
//! persona.current      show the active personality
//! persona.clear        back to the default system prompt
//! help | persona       command overview
//! ```

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    PersonaClear,
    PersonaList,
    PersonaSet(String),
    PersonaCurrent,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name {
            "chat" if rest.is_empty() => Err(CommandError::Usage("chat <text>")),
            "chat" => Ok(Command::Chat(rest.to_string())),
            "persona.set" if rest.is_empty() => Err(CommandError::Usage("persona.set <name>")),
            "persona.set" => Ok(Command::PersonaSet(rest.to_string())),
            "persona.list" => Ok(Command::PersonaList),
            "persona.current" => Ok(Command::PersonaCurrent),
            "persona.clear" => Ok(Command::PersonaClear),
            "help" | "persona" => Ok(Command::Help),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub const HELP: &str = "\
Commands:
  chat <text>          talk to the assistant (`chat clear` resets the conversation)
  persona.list         list available personalities
  persona.set <name>   switch personality and start a new conversation
  persona.current      show the active personality
  persona.clear        go back to the default system prompt
  help                 show this message";
