use clap::Parser;
use std::path::PathBuf;

use route_gate::config::{check_config, read_config, DatasetMode, EngineConfig};
use route_gate::lifecycle::{self, Shutdown};
use route_gate::observability::logging;

/// Routing query server.
#[derive(Parser)]
#[command(name = "route-gate", version)]
#[command(about = "Routing query server with hot-swappable datasets", long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve generations published by route-datastore under this directory.
    #[arg(long, value_name = "DIR", conflicts_with = "dataset")]
    shared: Option<PathBuf>,

    /// Serve the dataset in this directory for the process lifetime.
    #[arg(long, value_name = "DIR")]
    dataset: Option<PathBuf>,

    /// Listener address, overrides the configuration.
    #[arg(long)]
    bind: Option<String>,
}

fn apply_overrides(config: &mut EngineConfig, args: Args) {
    if let Some(root) = args.shared {
        config.engine.mode = DatasetMode::Shared;
        config.engine.shared_root = Some(root);
    }
    if let Some(path) = args.dataset {
        config.engine.mode = DatasetMode::Standalone;
        config.engine.dataset_path = Some(path);
    }
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => EngineConfig::default(),
    };
    apply_overrides(&mut config, args);
    check_config(&config)?;

    logging::init(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %config.engine.mode,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        "route-gate starting"
    );

    let shutdown = Shutdown::new();
    lifecycle::run(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
