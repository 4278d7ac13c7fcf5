//! The RelayClaw agent loop.
//!
//! Drives completion requests against the configured model, dispatches the
//! function calls it emits to subprocess tool providers, and decides when
//! the user's request is actually answered.

pub mod loop_runner;
pub mod prompt;

pub use loop_runner::{AgentLoop, TurnOutcome, CLARIFY_MARKER, SATISFIED_MARKER};
