//! Tagged request and reply variants for the closed set of query kinds.

use serde::{Deserialize, Serialize};

use crate::handlers::{
    HandlerError, MatchRequest, MatchResponse, NearestRequest, NearestResponse, RouteRequest,
    RouteResponse, TableRequest, TableResponse, TileRequest, TripRequest, TripResponse,
};

/// One query of any kind, tagged by `service`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "lowercase")]
pub enum Query {
    Route(RouteRequest),
    Table(TableRequest),
    Nearest(NearestRequest),
    Trip(TripRequest),
    Match(MatchRequest),
    Tile(TileRequest),
}

impl Query {
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Route(_) => "route",
            Query::Table(_) => "table",
            Query::Nearest(_) => "nearest",
            Query::Trip(_) => "trip",
            Query::Match(_) => "match",
            Query::Tile(_) => "tile",
        }
    }
}

/// Result of a [`Query`], serialized without a tag.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Route(RouteResponse),
    Table(TableResponse),
    Nearest(NearestResponse),
    Trip(TripResponse),
    Match(MatchResponse),
    Tile(String),
    Error(HandlerError),
}
