//! MCP server entrypoint (stdio transport).
//!
//! Serves Rusty Scribe's tools and resources over stdio for editor and agent integrations. The
//! session belongs to the user whose ID token is passed with `--token` or
//! `RUSTY_SCRIBE_ID_TOKEN`; without one the server runs anonymously and extraction asks the
//! user to sign in.
use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{service::ServiceExt, transport::stdio};
use rustyscribe::{
    config, logging, mcp::RustyScribeMcpServer, service::ScribeService, session::SessionProvider,
};
use std::sync::Arc;

/// Rusty Scribe MCP server.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// ID token of the signed-in user; overrides `RUSTY_SCRIBE_ID_TOKEN`.
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    config::init_config();
    logging::init_tracing_with(false);

    let config = config::get_config();
    let service = Arc::new(ScribeService::from_config(config));
    let token = args.token.or_else(|| config.mcp_id_token.clone());
    let session = Arc::new(SessionProvider::new(service.session_resolver(), token));
    if let Err(error) = session.refresh().await {
        tracing::warn!(%error, "Initial session lookup failed; tools will retry on use");
    }
    let server = RustyScribeMcpServer::new(service, session);

    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server over stdio")?;

    service
        .waiting()
        .await
        .context("MCP server terminated unexpectedly")?;

    Ok(())
}
