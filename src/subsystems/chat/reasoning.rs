//! Removal of `<think>…</think>` reasoning spans from model output.

use std::sync::LazyLock;

use regex::Regex;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

static THINK_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("static reasoning pattern is valid")
});

/// Strip every reasoning span (non-greedy, across line breaks).
///
/// Repeats until nothing matches, so removing one span cannot expose a new
/// one on a second call.
pub fn strip_reasoning(text: &str) -> String {
    let mut current = THINK_SPAN.replace_all(text, "").into_owned();
    while THINK_SPAN.is_match(&current) {
        current = THINK_SPAN.replace_all(&current, "").into_owned();
    }
    current
}

/// Wrap `text` so that [`strip_reasoning`] leaves it untouched but it still
/// reads as a model reply with an empty reasoning block.
pub fn with_empty_reasoning(text: &str) -> String {
    format!("{THINK_OPEN}{THINK_CLOSE}{text}")
}
