//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the engine from a validated configuration
//! - Start the metrics exporter when enabled
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when the dataset is loaded)

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::EngineConfig;
use crate::engine::{Engine, StartupError};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Construct the engine for `config`, logging the reason on failure.
pub fn start_engine(config: &EngineConfig) -> Result<Arc<Engine>, StartupError> {
    match Engine::new(config) {
        Ok(engine) => Ok(Arc::new(engine)),
        Err(e) => {
            tracing::error!(mode = %config.engine.mode, error = %e, "Engine startup failed");
            Err(e)
        }
    }
}

/// Start every subsystem and serve until shutdown.
pub async fn run(config: EngineConfig, shutdown: &Shutdown) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let engine = start_engine(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(config, engine)
        .run(listener, shutdown.subscribe())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetMode;

    #[test]
    fn test_shared_mode_without_region_fails() {
        let root = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.engine.mode = DatasetMode::Shared;
        config.engine.shared_root = Some(root.path().to_path_buf());

        let err = start_engine(&config).unwrap_err();
        assert!(matches!(err, StartupError::NoGeneration(_)));
    }

    #[test]
    fn test_standalone_with_bad_path_fails() {
        let root = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.engine.dataset_path = Some(root.path().join("nothing-here"));

        let err = start_engine(&config).unwrap_err();
        assert!(matches!(err, StartupError::InvalidDatasetLocation(_)));
    }
}
