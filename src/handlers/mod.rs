//! Query handlers, one per query kind.
//!
//! # Data Flow
//! ```text
//! Engine::execute(handler, request)
//!     → gate admits, hands out the current generation
//!     → Handler::handle_request(generation, request)
//!         → input checks against the configured limits
//!         → search.rs (snapping, shortest paths, duration tables)
//!     → (Status, Result<Output, HandlerError>)
//! ```
//!
//! # Design Decisions
//! - Handlers hold nothing but their limits; every query reads only the
//!   generation it was handed, so a swap never affects a running query
//! - Errors carry a stable code for the JSON body `{"code", "message"}`

pub mod matching;
pub mod nearest;
pub mod route;
pub mod search;
pub mod table;
pub mod tile;
pub mod trip;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::dataset::{Coordinate, Generation};
use crate::engine::Status;

pub use matching::{MatchHandler, MatchRequest, MatchResponse};
pub use nearest::{NearestHandler, NearestRequest, NearestResponse};
pub use route::{RouteHandler, RouteRequest, RouteResponse};
pub use table::{TableHandler, TableRequest, TableResponse};
pub use tile::{TileHandler, TileRequest};
pub use trip::{TripHandler, TripRequest, TripResponse};

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Uniform entry point of every query kind.
pub trait Handler: Send + Sync {
    /// Label used in logs and metrics.
    const KIND: &'static str;

    type Request;
    type Output;

    fn handle(&self, dataset: &Generation, request: &Self::Request) -> HandlerResult<Self::Output>;

    fn handle_request(
        &self,
        dataset: &Generation,
        request: &Self::Request,
    ) -> (Status, HandlerResult<Self::Output>) {
        let result = self.handle(dataset, request);
        let status = match result {
            Ok(_) => Status::Ok,
            Err(_) => Status::Error,
        };
        (status, result)
    }
}

/// A query that could not be answered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error("{0}")]
    InvalidQuery(String),

    #[error("{0}")]
    InvalidOptions(String),

    #[error("Too many {what}: {actual} given, at most {limit} allowed")]
    TooBig {
        what: &'static str,
        actual: usize,
        limit: usize,
    },

    #[error("Could not find a matching segment for coordinate {0}")]
    NoSegment(usize),

    #[error("No route found between the given coordinates")]
    NoRoute,

    #[error("No round trip found through the given coordinates")]
    NoTrips,

    #[error("Could not match the trace")]
    NoMatch,
}

impl HandlerError {
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::InvalidQuery(_) => "InvalidQuery",
            HandlerError::InvalidOptions(_) => "InvalidOptions",
            HandlerError::TooBig { .. } => "TooBig",
            HandlerError::NoSegment(_) => "NoSegment",
            HandlerError::NoRoute => "NoRoute",
            HandlerError::NoTrips => "NoTrips",
            HandlerError::NoMatch => "NoMatch",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl Serialize for HandlerError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body().serialize(serializer)
    }
}

/// JSON body of a failed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// A coordinate snapped onto the road network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub node: u32,
    pub location: Coordinate,
    /// Distance from the input coordinate in metres.
    pub distance: f64,
}

/// Duration and distance of one leg between consecutive waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub duration: f64,
    pub distance: f64,
}

/// Reject invalid coordinates and enforce `min..=limit` of them.
pub(crate) fn check_coordinates(
    coordinates: &[Coordinate],
    min: usize,
    limit: usize,
) -> HandlerResult<()> {
    if let Some(index) = coordinates.iter().position(|c| !c.is_valid()) {
        return Err(HandlerError::InvalidQuery(format!(
            "Coordinate {} is outside the valid WGS84 range",
            index
        )));
    }
    if coordinates.len() < min {
        return Err(HandlerError::InvalidOptions(format!(
            "At least {} coordinates are required",
            min
        )));
    }
    if coordinates.len() > limit {
        return Err(HandlerError::TooBig {
            what: "coordinates",
            actual: coordinates.len(),
            limit,
        });
    }
    Ok(())
}

/// Snap every coordinate, failing on the first one that cannot be placed.
pub(crate) fn snap_all(dataset: &Generation, coordinates: &[Coordinate]) -> HandlerResult<Vec<Waypoint>> {
    coordinates
        .iter()
        .enumerate()
        .map(|(index, coordinate)| {
            search::snap(dataset.network(), coordinate).ok_or(HandlerError::NoSegment(index))
        })
        .collect()
}
