//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the routing engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Dataset mode and location.
    pub engine: EngineSection,

    /// Per-query-kind limits, handed straight to the handlers.
    pub limits: LimitsConfig,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl EngineConfig {
    /// Whether the dataset is shared with other processes.
    pub fn use_shared_memory(&self) -> bool {
        self.engine.mode == DatasetMode::Shared
    }
}

/// How the process obtains its dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetMode {
    /// Dataset loaded once from `dataset_path`, owned by this process.
    #[default]
    Standalone,
    /// Dataset published by a loader process under `shared_root`.
    Shared,
}

impl std::fmt::Display for DatasetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetMode::Standalone => write!(f, "standalone"),
            DatasetMode::Shared => write!(f, "shared"),
        }
    }
}

/// Dataset mode and location.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineSection {
    /// Standalone or shared.
    pub mode: DatasetMode,

    /// Dataset directory (standalone mode).
    pub dataset_path: Option<PathBuf>,

    /// Shared region directory (shared mode).
    pub shared_root: Option<PathBuf>,
}

/// Per-kind query limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum waypoints in a route query.
    pub max_locations_viaroute: usize,

    /// Maximum coordinates in a table query.
    pub max_locations_distance_table: usize,

    /// Maximum coordinates in a trip query.
    pub max_locations_trip: usize,

    /// Maximum trace points in a match query.
    pub max_locations_map_matching: usize,

    /// Maximum results of a nearest query.
    pub max_results_nearest: usize,

    /// Snapping radius for trace points in metres.
    pub max_matching_radius_m: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_locations_viaroute: 500,
            max_locations_distance_table: 100,
            max_locations_trip: 100,
            max_locations_map_matching: 100,
            max_results_nearest: 10,
            max_matching_radius_m: 100.0,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
