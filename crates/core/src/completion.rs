//! CompletionClient trait — the abstraction over the LLM completion API.
//!
//! The loop controller calls `generate()` without knowing which backend is
//! configured. A reply carries zero-or-more function calls and/or an
//! optional text segment; the caller must tolerate a reply with neither
//! (the empty-turn policy belongs to the loop, not the client).

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::{FunctionCall, ToolDeclaration};

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Ordered conversation turns
    pub contents: Vec<Message>,

    /// Tools the model may call this turn
    pub tools: Vec<ToolDeclaration>,

    /// Sampling temperature (fixed low for deterministic tool use)
    pub temperature: f32,

    /// Output-size budget
    pub max_output_tokens: u32,
}

/// What came back from one sampling call.
#[derive(Debug, Clone, Default)]
pub struct CompletionReply {
    /// Text segment, if the model produced one
    pub text: Option<String>,

    /// Function calls, in the order the model emitted them
    pub function_calls: Vec<FunctionCall>,
}

impl CompletionReply {
    /// True when the reply carries neither text nor calls — a failed sample.
    pub fn is_empty(&self) -> bool {
        self.function_calls.is_empty()
            && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

/// The completion API seam.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// A human-readable name for this client (e.g., "gemini").
    fn name(&self) -> &str;

    /// Send one sampling request and get the parsed reply.
    async fn generate(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionReply, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reply_detection() {
        assert!(CompletionReply::default().is_empty());

        let whitespace_only = CompletionReply {
            text: Some("   \n".into()),
            function_calls: vec![],
        };
        assert!(whitespace_only.is_empty());

        let with_text = CompletionReply {
            text: Some("hello".into()),
            function_calls: vec![],
        };
        assert!(!with_text.is_empty());
    }

    #[test]
    fn calls_make_reply_non_empty() {
        let reply = CompletionReply {
            text: None,
            function_calls: vec![FunctionCall {
                name: "getRepo".into(),
                arguments: serde_json::Map::new(),
            }],
        };
        assert!(!reply.is_empty());
    }
}
