//! In-memory session storage.
//!
//! One `UserSession` per channel user id, behind an async RwLock. History
//! windowing happens on append so a long-running process never accumulates
//! unbounded conversation state. Suitable for a single-process deployment;
//! the `SessionStore` trait is the seam for anything durable.

use std::collections::HashMap;

use async_trait::async_trait;
use relayclaw_core::error::SessionError;
use relayclaw_core::message::Message;
use relayclaw_core::session::{SessionStore, UserSession};
use tokio::sync::RwLock;
use tracing::debug;

/// Session store backed by a process-local map.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, UserSession>>,
    default_credential: Option<String>,
    history_window: usize,
}

impl InMemorySessionStore {
    /// `default_credential` seeds new sessions (typically a provider token
    /// from the environment); `history_window` caps retained messages per
    /// user.
    pub fn new(default_credential: Option<String>, history_window: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_credential,
            history_window,
        }
    }

    /// Replace the credential stored for one user.
    pub async fn set_credential(&self, user_id: &str, credential: Option<String>) {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(|| {
            UserSession {
                credential: self.default_credential.clone(),
                ..UserSession::default()
            }
        });
        session.credential = credential;
    }

    /// Fetch a session without creating one.
    pub async fn get(&self, user_id: &str) -> Option<UserSession> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Number of tracked users.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, user_id: &str) -> Result<UserSession, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(|| {
            debug!(user_id, "Creating new session");
            UserSession {
                credential: self.default_credential.clone(),
                ..UserSession::default()
            }
        });
        Ok(session.clone())
    }

    async fn append(&self, user_id: &str, message: Message) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(|| {
            UserSession {
                credential: self.default_credential.clone(),
                ..UserSession::default()
            }
        });
        session.history.push(message);
        session.history.retain_last(self.history_window);
        Ok(())
    }

    async fn window(&self, user_id: &str, n: usize) -> Result<Vec<Message>, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(user_id)
            .map(|s| s.history.window(n).to_vec())
            .unwrap_or_default())
    }

    async fn clear(&self, user_id: &str, keep_credential: bool) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(user_id) {
            Some(session) if keep_credential => {
                session.history = Default::default();
                debug!(user_id, "Cleared history, credential retained");
            }
            Some(_) => {
                sessions.remove(user_id);
                debug!(user_id, "Cleared session");
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_session_seeded_with_default_credential() {
        let store = InMemorySessionStore::new(Some("tok".into()), 20);
        let session = store.get_or_create("alice").await.unwrap();
        assert_eq!(session.credential.as_deref(), Some("tok"));
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn append_and_window() {
        let store = InMemorySessionStore::new(None, 20);
        store.append("bob", Message::user("hi")).await.unwrap();
        store.append("bob", Message::model("hello")).await.unwrap();
        let window = store.window("bob", 10).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "hi");
    }

    #[tokio::test]
    async fn window_for_unknown_user_is_empty() {
        let store = InMemorySessionStore::new(None, 20);
        assert!(store.window("nobody", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_capped_at_window() {
        let store = InMemorySessionStore::new(None, 4);
        for i in 0..10 {
            store
                .append("carol", Message::user(format!("m{i}")))
                .await
                .unwrap();
        }
        let window = store.window("carol", 100).await.unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].content, "m6");
    }

    #[tokio::test]
    async fn clear_keeping_credential() {
        let store = InMemorySessionStore::new(None, 20);
        store
            .set_credential("dave", Some("personal-token".into()))
            .await;
        store.append("dave", Message::user("hi")).await.unwrap();

        store.clear("dave", true).await.unwrap();

        let session = store.get_or_create("dave").await.unwrap();
        assert_eq!(session.credential.as_deref(), Some("personal-token"));
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn full_clear_drops_everything() {
        let store = InMemorySessionStore::new(Some("default".into()), 20);
        store
            .set_credential("erin", Some("personal-token".into()))
            .await;
        store.clear("erin", false).await.unwrap();

        // Recreated fresh, back on the default credential.
        let session = store.get_or_create("erin").await.unwrap();
        assert_eq!(session.credential.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn clear_unknown_user_is_noop() {
        let store = InMemorySessionStore::new(None, 20);
        store.clear("ghost", true).await.unwrap();
        assert!(store.is_empty().await);
    }
}
