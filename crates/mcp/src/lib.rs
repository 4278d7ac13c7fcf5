//! Tool-provider plumbing: the MCP stdio connector, schema sanitizer,
//! argument filter, and tool router.
//!
//! A tool provider is an external service reachable only through a
//! subprocess request/response protocol. Sessions are scoped resources:
//! acquired immediately before one unit of work (a discovery call, or one
//! batch of same-provider invocations) and released immediately after —
//! never held open across loop iterations.

pub mod filter;
pub mod router;
pub mod sanitize;
pub mod stdio;

pub use filter::filter_arguments;
pub use router::{RouteTarget, ToolRouter};
pub use sanitize::sanitize_schema;
pub use stdio::{McpSession, SessionOptions};
