//! Dataset watchdog subsystem.
//!
//! # Data Flow
//! ```text
//! QueryGate (under the transition lock)
//!     → has_newer_generation()   cheap, lock-free
//!     → load_if_newer()          only when the cheap check says yes
//!         → shared.rs: map gen-<id> published by the loader process
//!         → staged.rs: hand over a generation built in this process
//! ```
//!
//! # Design Decisions
//! - The cheap check keeps the common path free of I/O inside the lock
//! - A failed load is logged and reported as "nothing newer"; the query
//!   proceeds on the generation it already has

pub mod shared;
pub mod staged;

use std::sync::Arc;

use crate::dataset::DatasetHandle;

pub use shared::SharedWatchdog;
pub use staged::StagedLoader;

/// Source of newer dataset generations.
pub trait GenerationLoader: Send + Sync {
    /// Whether a generation newer than the last one loaded is available.
    fn has_newer_generation(&self) -> bool;

    /// Load the newer generation, if there still is one.
    fn load_if_newer(&self) -> Option<DatasetHandle>;
}

impl<T: GenerationLoader + ?Sized> GenerationLoader for Arc<T> {
    fn has_newer_generation(&self) -> bool {
        (**self).has_newer_generation()
    }

    fn load_if_newer(&self) -> Option<DatasetHandle> {
        (**self).load_if_newer()
    }
}
