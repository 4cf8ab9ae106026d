//! # cobridge Binary
//!
//! Serves the register polling verbs over newline-delimited JSON on
//! stdin/stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default configuration and the simulation backend
//! cobridge
//!
//! # Run with a configuration file
//! cobridge --config /etc/cobridge/cobridge.toml
//!
//! # Override the backend, verbose JSON logs
//! cobridge --backend simulation -v --json
//! ```

use clap::Parser;
use cobridge::console;
use cobridge::{BackendRegistry, Service};
use cobridge_common::config::{ConfigError, ConfigLoader, ServiceConfig};
use cobridge_common::consts::DEFAULT_CONFIG_PATH;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// cobridge - CANopen register polling bridge
#[derive(Parser, Debug)]
#[command(name = "cobridge")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "CANopen register polling bridge with pluggable backends")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file (cobridge.toml).
    /// Defaults apply when absent.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend to load, overriding the configuration
    #[arg(short, long)]
    backend: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("cobridge failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = load_config(&args);
    let level = match &loaded {
        Ok(config) if !args.verbose => config.shared.log_level.into(),
        _ if args.verbose => Level::DEBUG,
        _ => Level::INFO,
    };
    setup_tracing(&args, level);

    let mut config = loaded?;
    if let Some(backend) = &args.backend {
        info!("Backend from CLI: {}", backend);
        config.backend.driver = backend.clone();
    }

    info!("cobridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let backends = BackendRegistry::with_builtin()?;
    let service = Arc::new(Service::from_config(&config, &backends)?);

    // Setup signal handler.
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                on_signal.cancel();
            }
            Err(e) => warn!("Cannot listen for shutdown signal: {}", e),
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    let served = console::run(Arc::clone(&service), input, tokio::io::stdout(), shutdown).await;

    service.shutdown()?;
    served?;
    info!("cobridge shutdown complete");
    Ok(())
}

/// Load the configuration named on the command line, or the default file
/// if it exists, or built-in defaults.
fn load_config(args: &Args) -> Result<ServiceConfig, ConfigError> {
    let config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => match ServiceConfig::load(Path::new(DEFAULT_CONFIG_PATH)) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound) => ServiceConfig::default(),
            Err(e) => return Err(e),
        },
    };
    config.validate()?;
    Ok(config)
}

/// Setup tracing subscriber on stderr; stdout carries the protocol.
fn setup_tracing(args: &Args, level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
