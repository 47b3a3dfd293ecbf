//! Filaman Daemon - Main entry point
//!
//! Talks to the filament manager over i2c and serves its status and NFC tag
//! contents over HTTP.

mod api;
mod config;
mod server;
mod state;
mod watcher;
mod ws;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "filaman")]
#[command(about = "Filament manager daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "filaman.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Use a simulated device instead of the i2c bus
    #[arg(long)]
    simulate: bool,

    /// Print the current status (and record, if any) and exit
    #[arg(long)]
    status_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Filaman v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }
    if args.simulate {
        config.device.simulate = true;
    }
    config.validate()?;

    info!(
        smbus_id = config.device.smbus_id,
        dev_address = config.device_address()?,
        simulate = config.device.simulate,
        "Configuration loaded"
    );

    let state = state::AppState::new(config.clone())?;

    if args.status_once {
        let event = state.on_presence_interrupt().await?;
        println!("{}", serde_json::to_string_pretty(&event)?);
    } else {
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}
