//! Routing query server with hot-swappable dataset generations.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ http ──▶ engine ──▶ gate ──▶ handlers ──▶ dataset generation
//!                          │         │
//!                          │         └── watchdog: newer generation published?
//!                          │
//!   route-datastore ──▶ datastore ──▶ shared region (mmap) + gen-<id>/ dirs
//! ```
//!
//! A server runs either standalone, owning one dataset for its lifetime, or
//! in shared mode, where a loader process publishes generations that every
//! server process picks up without dropping a query.

// Core subsystems
pub mod dataset;
pub mod engine;
pub mod gate;
pub mod handlers;
pub mod watchdog;

// Loader side
pub mod datastore;

// Surfaces and cross-cutting concerns
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::EngineConfig;
pub use engine::{Engine, Query, Reply, StartupError, Status};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
