//! Fastest route through a list of waypoints.

use serde::{Deserialize, Serialize};

use crate::dataset::{Coordinate, Generation};
use crate::handlers::{check_coordinates, search, snap_all, Handler, HandlerError, HandlerResult, Leg, Waypoint};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub coordinates: Vec<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Total duration in seconds.
    pub duration: f64,
    /// Total distance in metres.
    pub distance: f64,
    pub legs: Vec<Leg>,
    pub waypoints: Vec<Waypoint>,
    pub geometry: Vec<Coordinate>,
}

#[derive(Debug, Clone)]
pub struct RouteHandler {
    max_locations: usize,
}

impl RouteHandler {
    pub fn new(max_locations: usize) -> Self {
        Self { max_locations }
    }
}

impl Handler for RouteHandler {
    const KIND: &'static str = "route";

    type Request = RouteRequest;
    type Output = RouteResponse;

    fn handle(&self, dataset: &Generation, request: &RouteRequest) -> HandlerResult<RouteResponse> {
        check_coordinates(&request.coordinates, 2, self.max_locations)?;
        let waypoints = snap_all(dataset, &request.coordinates)?;

        let nodes: Vec<u32> = waypoints.iter().map(|w| w.node).collect();
        let (path, legs) = search::path_through(dataset.graph(), &nodes).ok_or(HandlerError::NoRoute)?;

        Ok(RouteResponse {
            duration: path.duration,
            distance: path.distance,
            legs: legs
                .into_iter()
                .map(|(duration, distance)| Leg { duration, distance })
                .collect(),
            waypoints,
            geometry: search::geometry(dataset.network(), &path.nodes),
        })
    }
}
