//! Duration matrix between sources and destinations.

use serde::{Deserialize, Serialize};

use crate::dataset::{Coordinate, Generation};
use crate::handlers::{check_coordinates, search, snap_all, Handler, HandlerError, HandlerResult, Waypoint};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRequest {
    pub coordinates: Vec<Coordinate>,
    /// Indices into `coordinates`; all of them when absent.
    #[serde(default)]
    pub sources: Option<Vec<usize>>,
    #[serde(default)]
    pub destinations: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResponse {
    /// `durations[i][j]` from source `i` to destination `j`, `null` when unreachable.
    pub durations: Vec<Vec<Option<f64>>>,
    pub sources: Vec<Waypoint>,
    pub destinations: Vec<Waypoint>,
}

#[derive(Debug, Clone)]
pub struct TableHandler {
    max_locations: usize,
}

impl TableHandler {
    pub fn new(max_locations: usize) -> Self {
        Self { max_locations }
    }
}

fn resolve(indices: &Option<Vec<usize>>, len: usize, what: &str) -> HandlerResult<Vec<usize>> {
    match indices {
        None => Ok((0..len).collect()),
        Some(indices) => {
            if indices.is_empty() {
                return Err(HandlerError::InvalidOptions(format!("Empty {} list", what)));
            }
            if let Some(bad) = indices.iter().find(|&&i| i >= len) {
                return Err(HandlerError::InvalidOptions(format!(
                    "{} index {} is out of range",
                    what, bad
                )));
            }
            Ok(indices.clone())
        }
    }
}

impl Handler for TableHandler {
    const KIND: &'static str = "table";

    type Request = TableRequest;
    type Output = TableResponse;

    fn handle(&self, dataset: &Generation, request: &TableRequest) -> HandlerResult<TableResponse> {
        check_coordinates(&request.coordinates, 1, self.max_locations)?;
        let sources = resolve(&request.sources, request.coordinates.len(), "source")?;
        let destinations = resolve(&request.destinations, request.coordinates.len(), "destination")?;

        let snapped = snap_all(dataset, &request.coordinates)?;
        let targets: Vec<u32> = destinations.iter().map(|&i| snapped[i].node).collect();

        let durations = sources
            .iter()
            .map(|&i| search::durations_from(dataset.graph(), snapped[i].node, &targets))
            .collect();

        Ok(TableResponse {
            durations,
            sources: sources.iter().map(|&i| snapped[i]).collect(),
            destinations: destinations.iter().map(|&i| snapped[i]).collect(),
        })
    }
}
