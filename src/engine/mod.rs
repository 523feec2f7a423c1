//! Query dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! caller (HTTP worker thread, embedder)
//!     → Engine::route / table / ... or Engine::dispatch(Query)
//!     → dispatcher.rs: Engine::execute(handler, request)
//!         standalone: handler runs on the one fixed generation
//!         shared:     gate.admit() → gate.checkout() → handler → release
//!     → (Status, result) returned unchanged
//! ```
//!
//! # Design Decisions
//! - Mode and limits are fixed at construction from an explicit config
//! - Handlers are a closed set of tagged variants, not trait objects
//! - The engine never interprets a handler's status; it only records it

pub mod dispatcher;
pub mod query;
pub mod status;

use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::DatasetError;
use crate::gate::RegionError;
use crate::watchdog::shared::LoadError;

pub use dispatcher::Engine;
pub use query::{Query, Reply};
pub use status::Status;

/// Fatal conditions at engine construction. Never retried.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(
        "No published dataset generation found under {}, has route-datastore publish been run?",
        .0.display()
    )]
    NoGeneration(PathBuf),

    #[error("Generation loader has no dataset generation to start from")]
    LoaderEmpty,

    #[error("Invalid dataset location: {}", .0.display())]
    InvalidDatasetLocation(PathBuf),

    #[error("Missing configuration setting: {0}")]
    MissingSetting(&'static str),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Load(#[from] LoadError),
}
