//! Round trip through all coordinates, starting and ending at the first one.
//!
//! The visiting order is a nearest-neighbour tour over the duration table,
//! which is fast and good enough for the small inputs the limit allows.

use serde::{Deserialize, Serialize};

use crate::dataset::{Coordinate, Generation};
use crate::handlers::{check_coordinates, search, snap_all, Handler, HandlerError, HandlerResult, Leg, Waypoint};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRequest {
    pub coordinates: Vec<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripResponse {
    pub duration: f64,
    pub distance: f64,
    /// Input indices in visiting order, starting with 0.
    pub waypoint_order: Vec<usize>,
    pub waypoints: Vec<Waypoint>,
    /// One leg per hop, the last one returning to the start.
    pub legs: Vec<Leg>,
    pub geometry: Vec<Coordinate>,
}

#[derive(Debug, Clone)]
pub struct TripHandler {
    max_locations: usize,
}

impl TripHandler {
    pub fn new(max_locations: usize) -> Self {
        Self { max_locations }
    }
}

fn nearest_neighbour_tour(table: &[Vec<f64>]) -> Vec<usize> {
    let n = table.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut at = 0;
    visited[0] = true;
    order.push(0);

    while order.len() < n {
        let next = (0..n)
            .filter(|&j| !visited[j])
            .min_by(|&a, &b| table[at][a].total_cmp(&table[at][b]).then(a.cmp(&b)));
        let Some(next) = next else { break };
        visited[next] = true;
        order.push(next);
        at = next;
    }
    order
}

impl Handler for TripHandler {
    const KIND: &'static str = "trip";

    type Request = TripRequest;
    type Output = TripResponse;

    fn handle(&self, dataset: &Generation, request: &TripRequest) -> HandlerResult<TripResponse> {
        check_coordinates(&request.coordinates, 2, self.max_locations)?;
        let waypoints = snap_all(dataset, &request.coordinates)?;
        let nodes: Vec<u32> = waypoints.iter().map(|w| w.node).collect();

        let mut table = Vec::with_capacity(nodes.len());
        for &source in &nodes {
            let row = search::durations_from(dataset.graph(), source, &nodes);
            let row: Option<Vec<f64>> = row.into_iter().collect();
            table.push(row.ok_or(HandlerError::NoTrips)?);
        }

        let waypoint_order = nearest_neighbour_tour(&table);
        let mut tour: Vec<u32> = waypoint_order.iter().map(|&i| nodes[i]).collect();
        tour.push(nodes[0]);

        let (path, legs) = search::path_through(dataset.graph(), &tour).ok_or(HandlerError::NoTrips)?;

        Ok(TripResponse {
            duration: path.duration,
            distance: path.distance,
            waypoint_order,
            waypoints,
            legs: legs
                .into_iter()
                .map(|(duration, distance)| Leg { duration, distance })
                .collect(),
            geometry: search::geometry(dataset.network(), &path.nodes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::{grid, node};

    #[test]
    fn test_round_trip_returns_to_start() {
        let dataset = grid();
        let handler = TripHandler::new(10);
        let request = TripRequest {
            coordinates: vec![node(&dataset, 0), node(&dataset, 8), node(&dataset, 1)],
        };
        let trip = handler.handle(&dataset, &request).unwrap();
        assert_eq!(trip.waypoint_order, vec![0, 2, 1]);
        assert_eq!(trip.legs.len(), 3);
        // 0 -> 1 -> 8 -> 0
        assert_eq!(trip.duration, 60.0 + 180.0 + 240.0);
        assert_eq!(trip.geometry.first(), trip.geometry.last());
    }

    #[test]
    fn test_unreachable_stop_has_no_trip() {
        let dataset = grid();
        let handler = TripHandler::new(10);
        let request = TripRequest {
            coordinates: vec![node(&dataset, 0), node(&dataset, 9)],
        };
        assert_eq!(handler.handle(&dataset, &request).unwrap_err(), HandlerError::NoTrips);
    }

    #[test]
    fn test_tour_visits_every_stop_once() {
        let table = vec![
            vec![0.0, 5.0, 1.0, 9.0],
            vec![5.0, 0.0, 2.0, 1.0],
            vec![1.0, 2.0, 0.0, 7.0],
            vec![9.0, 1.0, 7.0, 0.0],
        ];
        assert_eq!(nearest_neighbour_tour(&table), vec![0, 2, 1, 3]);
    }
}
