//! Response post-processing for plain-text channels.
//!
//! Messaging channels have little markdown support, so fenced code blocks
//! get a readable label and long replies are cut to the channel's length
//! budget before delivery.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

/// The suffix appended to truncated messages.
const TRUNCATION_MARKER: &str = "...";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(\w*)\n([\s\S]*?)\n```").expect("code fence regex is valid")
});

/// Rewrite fenced code blocks with a human-readable label.
///
/// ` ```python ` becomes `*PYTHON CODE:*` followed by an unlabeled fence;
/// fences with no language get a generic `*CODE:*` label. Code content is
/// preserved verbatim. Text without fences passes through unchanged.
pub fn format_code_blocks(text: &str) -> String {
    CODE_FENCE
        .replace_all(text, |caps: &Captures| {
            let code = &caps[2];
            match &caps[1] {
                "" => format!("*CODE:*\n```\n{code}\n```"),
                lang => format!("*{} CODE:*\n```\n{code}\n```", lang.to_uppercase()),
            }
        })
        .into_owned()
}

/// Cut `text` down to `max_length` characters, marker included.
///
/// Prefers a paragraph boundary when one falls in the trailing 20% of the
/// cut point, so truncation lands between thoughts rather than mid-word.
pub fn truncate_message(text: &str, max_length: usize) -> String {
    let total_chars = text.chars().count();
    if total_chars <= max_length {
        return text.to_string();
    }

    let budget = max_length.saturating_sub(TRUNCATION_MARKER.len());
    let cut_byte = text
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let mut truncated = &text[..cut_byte];

    if let Some(break_byte) = truncated.rfind("\n\n") {
        let break_chars = truncated[..break_byte].chars().count();
        if break_chars * 5 > max_length * 4 {
            truncated = &truncated[..break_byte];
        }
    }

    debug!(
        from = total_chars,
        to = truncated.chars().count() + TRUNCATION_MARKER.len(),
        "Message truncated"
    );
    format!("{truncated}{TRUNCATION_MARKER}")
}

/// Full post-processing pass: label code fences, then enforce the budget.
pub fn postprocess(text: &str, max_length: usize) -> String {
    truncate_message(&format_code_blocks(text), max_length)
}
