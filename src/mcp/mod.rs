//! Model Context Protocol (MCP) integration for Rusty Scribe.
//!
//! Exposes the extraction pipeline to editors and agent hosts over stdio, acting for one user
//! session:
//!
//! - Tools: `extract-file`, `summarize`, `translate`, `keywords`, `usage`, and `metrics`.
//! - Resources: `mcp://plans` (pricing catalog) and `mcp://session` (plan and usage).

mod format;
pub mod handlers;
mod registry;
mod schemas;
mod server;

pub use server::RustyScribeMcpServer;
