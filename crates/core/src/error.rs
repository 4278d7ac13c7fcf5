//! Error types for the RelayClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum; nothing here is fatal to the host process —
//! every failure degrades to a textual result that is either fed back to
//! the model or returned to the user.

use thiserror::Error;

/// The top-level error type for all RelayClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion API errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool provider (MCP) errors ---
    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    // --- Session store errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the completion API.
///
/// `Timeout` and `EmptyReply` are retried by the loop controller within its
/// iteration budget; the rest surface as a failed sample the same way.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider returned neither text nor function calls")]
    EmptyReply,
}

/// Failures in the tool-provider (MCP) subsystem.
///
/// `Unavailable` degrades to "zero tools from that provider";
/// `InvocationFailed` and `UnknownTool` become error-text function results
/// fed back into the conversation — they are never raised across the loop
/// controller boundary.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Provider unavailable: {provider_id} — {reason}")]
    Unavailable { provider_id: String, reason: String },

    #[error("Tool invocation failed: {tool} — {reason}")]
    InvocationFailed { tool: String, reason: String },

    #[error("No provider owns tool: {0}")]
    UnknownTool(String),

    #[error("Tool call timed out: {tool} after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("Protocol error from {provider_id}: {reason}")]
    Protocol { provider_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
