//! Conversation history for one session.
//!
//! Always starts with exactly one system message. Grown by append only;
//! replaced wholesale by [`ConversationHistory::reset`].

use crate::llm::{ChatMessage, Role};

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    /// Max non-system messages retained; `None` = unbounded.
    cap: Option<usize>,
}

impl ConversationHistory {
    pub fn new(system_prompt: &str, cap: Option<usize>) -> Self {
        Self { messages: vec![ChatMessage::system(system_prompt)], cap }
    }

    /// Replace the whole history with a single system message.
    pub fn reset(&mut self, system_prompt: &str) {
        self.messages.clear();
        self.messages.push(ChatMessage::system(system_prompt));
    }

    /// Append a message, then drop the oldest non-system entries beyond the cap.
    ///
    /// An assistant reply is never kept without the prompt before it, so
    /// trimming may remove one message more than the cap requires.
    pub fn append(&mut self, message: ChatMessage) {
        debug_assert!(message.role != Role::System, "system message only via reset");
        self.messages.push(message);

        let Some(cap) = self.cap else { return };
        let mut excess = (self.messages.len() - 1).saturating_sub(cap);
        if excess == 0 {
            return;
        }
        while self.messages.get(1 + excess).is_some_and(|m| m.role == Role::Assistant) {
            excess += 1;
        }
        self.messages.drain(1..=excess);
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(h: &ConversationHistory) -> Vec<String> {
        h.snapshot().into_iter().map(|m| m.content).collect()
    }

    #[test]
    fn new_holds_only_system() {
        let h = ConversationHistory::new("sys", None);
        assert_eq!(h.snapshot(), vec![ChatMessage::system("sys")]);
    }

    #[test]
    fn append_keeps_order() {
        let mut h = ConversationHistory::new("sys", None);
        h.append(ChatMessage::user("hello"));
        h.append(ChatMessage::assistant("hi there"));
        assert_eq!(
            h.snapshot(),
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user("hello"),
                ChatMessage::assistant("hi there"),
            ]
        );
    }

    #[test]
    fn reset_replaces_everything() {
        let mut h = ConversationHistory::new("old", None);
        h.append(ChatMessage::user("a"));
        h.append(ChatMessage::assistant("b"));
        h.reset("new");
        assert_eq!(h.snapshot(), vec![ChatMessage::system("new")]);
    }

    #[test]
    fn cap_drops_oldest_but_keeps_system() {
        let mut h = ConversationHistory::new("sys", Some(3));
        for i in 0..5 {
            h.append(ChatMessage::user(format!("m{i}")));
        }
        assert_eq!(contents(&h), ["sys", "m2", "m3", "m4"]);
    }

    #[test]
    fn odd_cap_never_orphans_a_reply() {
        let mut h = ConversationHistory::new("sys", Some(3));
        for i in 0..3 {
            h.append(ChatMessage::user(format!("q{i}")));
            h.append(ChatMessage::assistant(format!("a{i}")));
        }
        assert_eq!(contents(&h), ["sys", "q2", "a2"]);

        h.append(ChatMessage::user("q3"));
        assert_eq!(contents(&h), ["sys", "q2", "a2", "q3"]);
        assert_eq!(h.snapshot()[1].role, Role::User);
    }

    #[test]
    fn zero_cap_keeps_system_only() {
        let mut h = ConversationHistory::new("sys", Some(0));
        h.append(ChatMessage::user("gone"));
        h.append(ChatMessage::assistant("gone too"));
        assert_eq!(contents(&h), ["sys"]);
    }

    #[test]
    fn unbounded_by_default() {
        let mut h = ConversationHistory::new("sys", None);
        for i in 0..1000 {
            h.append(ChatMessage::user(i.to_string()));
        }
        assert_eq!(h.snapshot().len(), 1001);
    }
}
