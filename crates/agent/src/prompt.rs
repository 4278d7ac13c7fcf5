//! System prompt assembly.
//!
//! The completion API has no system role, so the prompt travels as a
//! leading user turn answered by a fixed model acknowledgement. The marker
//! protocol section is always appended, even over a user-supplied prompt
//! override, because the loop controller depends on it.

/// Default instructions for the assistant persona.
const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an AI coding assistant reachable over a messaging channel.

Your role is to help users build, manage, and improve apps or websites by:
1. Writing clean, functional, production-ready code
2. Explaining programming and web development concepts clearly
3. Providing step-by-step development guidance
4. Debugging issues and suggesting solutions
5. Using the connected tools to act on repositories and services directly

Always:
- Format code using fenced markdown blocks with a language tag.
- Use the conversation history to give consistent follow-ups.
- Prefer clarity and completeness over brevity.

If a request involves multiple steps, plan and chain multiple function
calls, confirming each step before moving on.";

/// Instructions for the satisfaction/clarification protocol. The loop
/// controller parses these markers out of every sampled reply.
const MARKER_PROTOCOL: &str = "\
Reply protocol:
- When the user's request is fully addressed, end your reply with the marker [SATISFIED].
- If you need to reason through intermediate steps before answering, end that reply with [CLARIFY]; such text stays internal and is never shown to the user.
- Never put a marker in a reply that also requests a function call.";

/// Fixed model acknowledgement following the system prompt turn.
pub const SYSTEM_ACK: &str =
    "I understand. I'm your AI coding assistant, ready to help you build apps \
     and websites. How can I assist you today?";

/// Build the full system prompt, honoring a configured override.
pub fn build_system_prompt(prompt_override: Option<&str>) -> String {
    let base = prompt_override.unwrap_or(DEFAULT_SYSTEM_PROMPT);
    format!("{base}\n\n{MARKER_PROTOCOL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_carries_marker_protocol() {
        let prompt = build_system_prompt(None);
        assert!(prompt.contains("[SATISFIED]"));
        assert!(prompt.contains("[CLARIFY]"));
    }

    #[test]
    fn override_replaces_persona_but_keeps_protocol() {
        let prompt = build_system_prompt(Some("You are a terse deploy bot."));
        assert!(prompt.starts_with("You are a terse deploy bot."));
        assert!(!prompt.contains("coding assistant"));
        assert!(prompt.contains("[SATISFIED]"));
    }
}
