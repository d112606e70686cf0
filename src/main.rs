//! HTTP/2 live stream proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http server ──▶ stream middleware ──▶ gatekeeper
//!                    │                                     │
//!                    ▼ (not /stream/)                      ▼
//!                fallback                              forwarder
//!                                                          │
//!                                                          ▼
//!     Client ◀── relay body ◀── h2 stream ◀── session pool (per host)
//!                                                 │   ▲
//!                                    liveness ping┘   └ pre-warm / drain
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use stream_proxy::config::{apply_env, load_config, validate_config, ConfigError, StreamProxyConfig};
use stream_proxy::lifecycle::{spawn_signal_handler, Shutdown};
use stream_proxy::observability::{init_logging, init_metrics};
use stream_proxy::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "stream-proxy", version, about = "HTTP/2 live stream proxy")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

fn resolve_config(args: &Args) -> Result<StreamProxyConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => StreamProxyConfig::default(),
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;
    if let Some(port) = args.port {
        config.listener.port = port;
    }
    if let Some(level) = &args.log_level {
        config.observability.log_level = level.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    init_logging(&config.observability);
    tracing::info!("stream-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        hosts = ?config.stream.allowed_hosts,
        base_path = %config.stream.base_path,
        port = config.listener.port,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let address = config.listener.socket_address();
    let server = HttpServer::new(config)?;
    server.prewarm();

    let listener = TcpListener::bind(&address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    spawn_signal_handler(&shutdown);
    server.run(listener, stop).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
