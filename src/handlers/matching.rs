//! Map matching of a GPS trace.

use serde::{Deserialize, Serialize};

use crate::dataset::{Coordinate, Generation};
use crate::handlers::{check_coordinates, search, Handler, HandlerError, HandlerResult, Waypoint};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub coordinates: Vec<Coordinate>,
    /// Per-point search radius in metres, capped by the configured maximum.
    #[serde(default)]
    pub radiuses: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    /// One entry per input point, `null` when the point was dropped.
    pub tracepoints: Vec<Option<Waypoint>>,
    /// Share of input points that matched.
    pub confidence: f64,
    pub duration: f64,
    pub distance: f64,
    pub geometry: Vec<Coordinate>,
}

#[derive(Debug, Clone)]
pub struct MatchHandler {
    max_locations: usize,
    max_radius: f64,
}

impl MatchHandler {
    pub fn new(max_locations: usize, max_radius: f64) -> Self {
        Self {
            max_locations,
            max_radius,
        }
    }

    fn radiuses(&self, request: &MatchRequest) -> HandlerResult<Vec<f64>> {
        let Some(radiuses) = &request.radiuses else {
            return Ok(vec![self.max_radius; request.coordinates.len()]);
        };
        if radiuses.len() != request.coordinates.len() {
            return Err(HandlerError::InvalidOptions(
                "Number of radiuses does not match number of coordinates".into(),
            ));
        }
        if let Some(bad) = radiuses
            .iter()
            .find(|r| r.is_nan() || **r <= 0.0 || **r > self.max_radius)
        {
            return Err(HandlerError::InvalidOptions(format!(
                "Radius {} must be greater than 0 and at most {}",
                bad, self.max_radius
            )));
        }
        Ok(radiuses.clone())
    }
}

impl Handler for MatchHandler {
    const KIND: &'static str = "match";

    type Request = MatchRequest;
    type Output = MatchResponse;

    fn handle(&self, dataset: &Generation, request: &MatchRequest) -> HandlerResult<MatchResponse> {
        check_coordinates(&request.coordinates, 2, self.max_locations)?;
        let radiuses = self.radiuses(request)?;

        let tracepoints: Vec<Option<Waypoint>> = request
            .coordinates
            .iter()
            .zip(&radiuses)
            .map(|(coordinate, &radius)| search::snap_within(dataset.network(), coordinate, radius))
            .collect();

        let mut matched: Vec<u32> = tracepoints.iter().flatten().map(|w| w.node).collect();
        // consecutive points on the same node add nothing to the path
        matched.dedup();
        let matched_points = tracepoints.iter().flatten().count();
        if matched_points < 2 {
            return Err(HandlerError::NoMatch);
        }

        let (path, _) = search::path_through(dataset.graph(), &matched).ok_or(HandlerError::NoMatch)?;

        Ok(MatchResponse {
            confidence: matched_points as f64 / request.coordinates.len() as f64,
            tracepoints,
            duration: path.duration,
            distance: path.distance,
            geometry: search::geometry(dataset.network(), &path.nodes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::{grid, node};

    #[test]
    fn test_off_road_points_are_dropped() {
        let dataset = grid();
        let handler = MatchHandler::new(10, 100.0);
        let request = MatchRequest {
            coordinates: vec![
                node(&dataset, 0),
                Coordinate::new(13.405, 52.505),
                node(&dataset, 1),
                node(&dataset, 2),
            ],
            radiuses: None,
        };
        let matched = handler.handle(&dataset, &request).unwrap();
        assert!(matched.tracepoints[1].is_none());
        assert_eq!(matched.confidence, 0.75);
        assert_eq!(matched.duration, 120.0);
    }

    #[test]
    fn test_too_few_matches() {
        let dataset = grid();
        let handler = MatchHandler::new(10, 100.0);
        let request = MatchRequest {
            coordinates: vec![node(&dataset, 0), Coordinate::new(13.405, 52.505)],
            radiuses: None,
        };
        assert_eq!(handler.handle(&dataset, &request).unwrap_err(), HandlerError::NoMatch);
    }

    #[test]
    fn test_radius_above_maximum() {
        let dataset = grid();
        let handler = MatchHandler::new(10, 100.0);
        let request = MatchRequest {
            coordinates: vec![node(&dataset, 0), node(&dataset, 1)],
            radiuses: Some(vec![50.0, 500.0]),
        };
        assert_eq!(handler.handle(&dataset, &request).unwrap_err().code(), "InvalidOptions");
    }
}
