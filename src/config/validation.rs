//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that the selected mode has a dataset location
//! - Validate value ranges (limits > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{DatasetMode, EngineConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("standalone mode requires engine.dataset_path")]
    MissingDatasetPath,

    #[error("shared mode requires engine.shared_root")]
    MissingSharedRoot,

    #[error("limits.{0} must be greater than zero")]
    NonPositiveLimit(&'static str),

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroTimeout,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.engine.mode {
        DatasetMode::Standalone if config.engine.dataset_path.is_none() => {
            errors.push(ValidationError::MissingDatasetPath);
        }
        DatasetMode::Shared if config.engine.shared_root.is_none() => {
            errors.push(ValidationError::MissingSharedRoot);
        }
        _ => {}
    }

    let limits = &config.limits;
    let counts = [
        ("max_locations_viaroute", limits.max_locations_viaroute),
        ("max_locations_distance_table", limits.max_locations_distance_table),
        ("max_locations_trip", limits.max_locations_trip),
        ("max_locations_map_matching", limits.max_locations_map_matching),
        ("max_results_nearest", limits.max_results_nearest),
    ];
    for (name, value) in counts {
        if value == 0 {
            errors.push(ValidationError::NonPositiveLimit(name));
        }
    }
    if limits.max_matching_radius_m.is_nan() || limits.max_matching_radius_m <= 0.0 {
        errors.push(ValidationError::NonPositiveLimit("max_matching_radius_m"));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
