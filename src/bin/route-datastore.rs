use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use route_gate::config::ObservabilityConfig;
use route_gate::datastore::Datastore;
use route_gate::observability::logging;

#[derive(Parser)]
#[command(name = "route-datastore", version)]
#[command(about = "Publish and retire dataset generations for shared-mode servers", long_about = None)]
struct Cli {
    /// Shared root directory served by route-gate --shared.
    #[arg(short, long, value_name = "DIR")]
    root: PathBuf,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a dataset directory as the new current generation
    Publish {
        /// Directory containing network.json
        source: PathBuf,

        /// How long to wait for in-flight queries, in milliseconds
        #[arg(long, default_value_t = 30_000)]
        drain_timeout_ms: u64,

        /// Also remove unused generations afterwards
        #[arg(long)]
        retire: bool,
    },
    /// Remove generations that are neither current nor held by a server
    Retire,
    /// Print the state of the shared root as JSON
    Status,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&ObservabilityConfig {
        log_level: cli.log_level.clone(),
        ..ObservabilityConfig::default()
    });

    let store = Datastore::open_or_create(&cli.root)?;

    match cli.command {
        Commands::Publish {
            source,
            drain_timeout_ms,
            retire,
        } => {
            let id = store.publish(&source, Duration::from_millis(drain_timeout_ms))?;
            println!("published generation {}", id);
            if retire {
                for retired in store.retire_unused()? {
                    println!("retired generation {}", retired);
                }
            }
        }
        Commands::Retire => {
            let retired = store.retire_unused()?;
            if retired.is_empty() {
                println!("nothing to retire");
            }
            for id in retired {
                println!("retired generation {}", id);
            }
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&store.status()?)?);
        }
    }

    Ok(())
}
