//! Personality registry — named alternate system prompts from `[chat.personalities]`.

/// Read-only, ordered name → prompt mapping.
#[derive(Debug, Clone, Default)]
pub struct PersonalityRegistry {
    entries: Vec<(String, String)>,
}

impl PersonalityRegistry {
    /// Later duplicates of a name are ignored.
    pub fn new(entries: Vec<(String, String)>) -> Self {
        let mut deduped: Vec<(String, String)> = Vec::with_capacity(entries.len());
        for (name, prompt) in entries {
            if !deduped.iter().any(|(n, _)| *n == name) {
                deduped.push((name, prompt));
            }
        }
        Self { entries: deduped }
    }

    /// Names in configuration order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
