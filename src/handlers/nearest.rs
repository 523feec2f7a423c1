//! Nearest road network nodes to a coordinate.

use serde::{Deserialize, Serialize};

use crate::dataset::{Coordinate, Generation};
use crate::handlers::{check_coordinates, search, Handler, HandlerError, HandlerResult, Waypoint};

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestRequest {
    pub coordinate: Coordinate,
    #[serde(default = "one")]
    pub number: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestResponse {
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone)]
pub struct NearestHandler {
    max_results: usize,
}

impl NearestHandler {
    pub fn new(max_results: usize) -> Self {
        Self { max_results }
    }
}

impl Handler for NearestHandler {
    const KIND: &'static str = "nearest";

    type Request = NearestRequest;
    type Output = NearestResponse;

    fn handle(&self, dataset: &Generation, request: &NearestRequest) -> HandlerResult<NearestResponse> {
        check_coordinates(std::slice::from_ref(&request.coordinate), 1, 1)?;
        if request.number == 0 {
            return Err(HandlerError::InvalidOptions("Number of results must be at least 1".into()));
        }
        if request.number > self.max_results {
            return Err(HandlerError::TooBig {
                what: "results",
                actual: request.number,
                limit: self.max_results,
            });
        }

        let waypoints = search::nearest_nodes(dataset.network(), &request.coordinate, request.number);
        if waypoints.is_empty() {
            return Err(HandlerError::NoSegment(0));
        }
        Ok(NearestResponse { waypoints })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::{grid, node};

    #[test]
    fn test_nearest_results() {
        let dataset = grid();
        let handler = NearestHandler::new(5);
        let request = NearestRequest {
            coordinate: node(&dataset, 4),
            number: 3,
        };
        let response = handler.handle(&dataset, &request).unwrap();
        assert_eq!(response.waypoints.len(), 3);
        assert_eq!(response.waypoints[0].node, 4);
        assert_eq!(response.waypoints[0].distance, 0.0);
    }

    #[test]
    fn test_nearest_number_bounds() {
        let dataset = grid();
        let handler = NearestHandler::new(2);
        let mut request = NearestRequest {
            coordinate: node(&dataset, 4),
            number: 0,
        };
        assert_eq!(handler.handle(&dataset, &request).unwrap_err().code(), "InvalidOptions");
        request.number = 3;
        assert_eq!(handler.handle(&dataset, &request).unwrap_err().code(), "TooBig");
    }

    #[test]
    fn test_number_defaults_to_one() {
        let request: NearestRequest =
            serde_json::from_str(r#"{"coordinate":{"lon":13.4,"lat":52.5}}"#).unwrap();
        assert_eq!(request.number, 1);
    }
}
