//! Query gate subsystem.
//!
//! # Data Flow
//! ```text
//! request
//!     → QueryGate::admit()            barrier.rs: count += 1 (cross-process)
//!     → QueryGate::checkout()         query_gate.rs: transition lock,
//!                                     swap if a newer generation exists,
//!                                     clone the current handle
//!     → handler runs on its own handle
//!     → Admission dropped             barrier.rs: count -= 1, wake waiters
//!
//! loader process
//!     → barrier.begin_update()        hold back new admissions
//!     → wait_for_quiescence()         count == 0 across all processes
//!     → region: current generation = new id
//!     → guard dropped                 admissions resume
//! ```
//!
//! # Design Decisions
//! - region.rs holds all cross-process state as atomics in one mapped file;
//!   a heap copy of the same layout serves processes that share nothing
//! - The transition lock is process-local; the current handle is swapped
//!   atomically under it, so readers see the old or the new generation
//! - A swapped-out generation dies with its last in-flight reader, never
//!   at swap time

pub mod barrier;
pub mod query_gate;
pub mod region;

pub use barrier::{QueryBarrier, UpdateGuard};
pub use query_gate::{Admission, GateStats, QueryGate};
pub use region::{HolderLease, RegionError, SharedRegion};
