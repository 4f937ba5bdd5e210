//! Visitor Gate CLI.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use visitor_gate::{Config, VisitorRedirector};

#[derive(Parser, Debug)]
#[command(name = "visitor-gate")]
#[command(about = "Visitor gate - resolve the client IP, check reputation providers and redirect bots elsewhere")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "visitor-gate.yaml")]
    config: PathBuf,

    /// Listen address, overrides server.listen
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(config = %args.config.display(), "Loading configuration");
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let listen = args.listen.unwrap_or(config.server.listen);
    let redirector = Arc::new(VisitorRedirector::new(config)?);
    let app = redirector.router();

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;

    info!(listen = %listen, "Starting visitor gate");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
