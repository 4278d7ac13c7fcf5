//! SessionStore trait — per-user conversation state.
//!
//! The loop controller treats the store as opaque keyed storage with
//! last-write-wins semantics; it takes no lock on it. Implementations own
//! history windowing. There is no process-wide mutable singleton — the
//! store is injected wherever it is needed.

use async_trait::async_trait;

use crate::error::SessionError;
use crate::message::{Conversation, Message};

/// One user's state: a tool-provider credential plus conversation history.
#[derive(Debug, Clone, Default)]
pub struct UserSession {
    /// Credential handed to tool providers on the user's behalf
    pub credential: Option<String>,

    /// Full retained conversation history
    pub history: Conversation,
}

/// Keyed per-user session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session for `user_id`, creating it if absent.
    async fn get_or_create(&self, user_id: &str) -> Result<UserSession, SessionError>;

    /// Append a message to the user's history.
    async fn append(&self, user_id: &str, message: Message) -> Result<(), SessionError>;

    /// The last `n` messages of the user's history, oldest first.
    async fn window(&self, user_id: &str, n: usize) -> Result<Vec<Message>, SessionError>;

    /// Drop the user's history. With `keep_credential`, the stored
    /// credential survives the wipe.
    async fn clear(&self, user_id: &str, keep_credential: bool) -> Result<(), SessionError>;
}
