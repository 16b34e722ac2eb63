#![deny(missing_docs)]

//! Core library for Rusty Scribe: plan-gated text extraction from uploaded files.

/// HTTP routing and REST handlers.
pub mod api;
/// Summarize, translate and keyword operations.
pub mod assist;
/// Identity and account storage.
pub mod backend;
/// Mocked checkout and contact-sales flow.
pub mod billing;
/// File type classification.
pub mod classify;
/// Environment-driven configuration management.
pub mod config;
/// `data:` URI encoding.
pub mod datauri;
/// Downloads in text and document formats.
pub mod export;
/// Generative model client.
pub mod genai;
/// Structured logging and tracing setup.
pub mod logging;
/// Model Context Protocol server implementation.
pub mod mcp;
/// Processing counters.
pub mod metrics;
/// PDF inspection and rendering.
pub mod pdf;
/// Plan catalog and limits.
pub mod plans;
/// Upload validation, extraction and workspaces.
pub mod processing;
/// Service facade shared by the HTTP and MCP surfaces.
pub mod service;
/// Identity, plan and usage snapshots.
pub mod session;
/// Monthly usage ledger.
pub mod usage;
