use anyhow::{Context, Result};
use clap::Parser;
use rustyscribe::{api, config, logging, service::ScribeService};
use std::sync::Arc;
use tokio::net::TcpListener;

const PORT_RANGE: std::ops::RangeInclusive<u16> = 4200..=4299;

/// Rusty Scribe HTTP server.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Port to bind; overrides `SERVER_PORT`. Without either, the first free port in 4200-4299.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    config::init_config();
    logging::init_tracing();

    let config = config::get_config();
    let service = Arc::new(ScribeService::from_config(config));
    let app = api::create_router(service, config.max_upload_bytes);

    let (listener, port) = bind_listener(args.port.or(config.server_port))
        .await
        .context("failed to bind listener")?;
    tracing::info!(
        port,
        backend = ?config.backend_provider,
        model = %config.genai_model,
        "Listening on http://0.0.0.0:{port}"
    );
    axum::serve(listener, app)
        .await
        .context("HTTP server terminated unexpectedly")?;
    Ok(())
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4200-4299",
    ))
}
