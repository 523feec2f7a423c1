//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request ID set on the way in, echoed on the way out)
//!     → server.rs (Axum router, timeout, trace)
//!     → spawn_blocking: Engine::<kind>(request)
//!     → Status::Ok → 200 JSON, Status::Error → 400 {"code", "message"}
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, EngineStatus, HttpServer};
