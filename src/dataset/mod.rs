//! Dataset subsystem.
//!
//! # Data Flow
//! ```text
//! dataset directory (network.json)
//!     → storage.rs (location checks, file layout)
//!     → network.rs (deserialize, integrity checks, graph build)
//!     → generation.rs (immutable Generation behind an Arc handle)
//!     → handed to the engine as the current DatasetHandle
//! ```
//!
//! # Design Decisions
//! - A generation never changes after construction; reloads build a new one
//! - Handles are plain `Arc`s: a generation is destroyed only when its
//!   last holder (engine slot or in-flight request) lets go
//! - Shared-mode generations also carry a lease in the cross-process
//!   holder table so the loader knows when files may be removed

pub mod generation;
pub mod network;
pub mod storage;

use std::path::PathBuf;
use thiserror::Error;

pub use generation::{DatasetHandle, Generation, GenerationId};
pub use network::{Coordinate, Edge, Graph, RoadNetwork};
pub use storage::StorageConfig;

/// Errors raised while locating or loading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Invalid dataset location: {}", .0.display())]
    InvalidLocation(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed dataset file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Dataset integrity check failed: {0}")]
    Integrity(String),
}
