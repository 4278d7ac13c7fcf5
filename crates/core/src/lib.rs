//! # RelayClaw Core
//!
//! Domain types, traits, and error definitions for the RelayClaw agent
//! orchestrator. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod completion;
pub mod error;
pub mod message;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use completion::{CompletionClient, CompletionReply, CompletionRequest};
pub use error::{Error, McpError, ProviderError, Result, SessionError};
pub use message::{Conversation, Message, Role};
pub use session::{SessionStore, UserSession};
pub use tool::{FunctionCall, FunctionResult, ToolDeclaration};
