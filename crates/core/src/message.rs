//! Message and Conversation domain types.
//!
//! These are the core value objects that flow through the system:
//! a user message arrives from the channel, the loop controller builds a
//! conversation around it, the completion API answers, and the final text
//! goes back out. The completion API speaks two roles — `user` and `model`
//! — so there is no separate system role; the system prompt travels as a
//! leading user turn followed by a fixed model acknowledgement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (also carries the system prompt and tool results)
    User,
    /// The model
    Model,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new model message.
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Model,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// An ordered sequence of messages with shared context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    /// Ordered messages
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The last `n` messages, oldest first.
    pub fn window(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Drop everything but the last `n` messages.
    pub fn retain_last(&mut self, n: usize) {
        let excess = self.messages.len().saturating_sub(n);
        if excess > 0 {
            self.messages.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
