//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Engine (dataset loaded) → metrics → listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C or trigger → stop accepting → drain in-flight requests → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: dataset first, then listeners
//! - In-flight queries finish against the generation they started on

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, start_engine};
