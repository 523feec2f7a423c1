//! Road network representation.
//!
//! # Responsibilities
//! - Serde model of the on-disk `network.json`
//! - Integrity checks run before a network is accepted
//! - Compact forward-star graph used by the query handlers

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::dataset::DatasetError;

const EARTH_RADIUS_M: f64 = 6_372_797.560856;

/// A WGS84 location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// True when both components are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Great-circle distance in metres.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// A directed road segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: u32,
    pub to: u32,
    /// Travel time in seconds.
    pub duration: f64,
    /// Length in metres.
    pub distance: f64,
}

/// The serialized road network of one dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoadNetwork {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Coordinate>,
    pub edges: Vec<Edge>,
}

impl RoadNetwork {
    /// Read a network from a JSON file.
    pub fn read_from(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write a network to a JSON file.
    pub fn write_to(&self, path: &Path) -> Result<(), DatasetError> {
        let io_err = |source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_all().map_err(io_err)
    }

    /// Check coordinates, edge endpoints and weights.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.nodes.len() >= u32::MAX as usize {
            return Err(DatasetError::Integrity(format!(
                "{} nodes exceed the addressable range",
                self.nodes.len()
            )));
        }
        if let Some(index) = self.nodes.iter().position(|c| !c.is_valid()) {
            return Err(DatasetError::Integrity(format!(
                "node {} has an invalid coordinate",
                index
            )));
        }

        let node_count = self.nodes.len() as u32;
        for (index, edge) in self.edges.iter().enumerate() {
            if edge.from >= node_count || edge.to >= node_count {
                return Err(DatasetError::Integrity(format!(
                    "edge {} references a missing node ({} -> {})",
                    index, edge.from, edge.to
                )));
            }
            let weights_ok = edge.duration.is_finite()
                && edge.duration >= 0.0
                && edge.distance.is_finite()
                && edge.distance >= 0.0;
            if !weights_ok {
                return Err(DatasetError::Integrity(format!(
                    "edge {} has a negative or non-finite weight",
                    index
                )));
            }
        }
        Ok(())
    }
}

/// Forward-star adjacency built from a validated network.
#[derive(Debug, Clone)]
pub struct Graph {
    first_edge: Vec<usize>,
    targets: Vec<u32>,
    durations: Vec<f64>,
    distances: Vec<f64>,
}

impl Graph {
    pub fn from_network(network: &RoadNetwork) -> Self {
        let node_count = network.nodes.len();
        let mut first_edge = vec![0usize; node_count + 1];
        for edge in &network.edges {
            first_edge[edge.from as usize + 1] += 1;
        }
        for i in 0..node_count {
            first_edge[i + 1] += first_edge[i];
        }

        let edge_count = network.edges.len();
        let mut cursor = first_edge.clone();
        let mut targets = vec![0u32; edge_count];
        let mut durations = vec![0.0; edge_count];
        let mut distances = vec![0.0; edge_count];
        for edge in &network.edges {
            let slot = cursor[edge.from as usize];
            cursor[edge.from as usize] += 1;
            targets[slot] = edge.to;
            durations[slot] = edge.duration;
            distances[slot] = edge.distance;
        }

        Self {
            first_edge,
            targets,
            durations,
            distances,
        }
    }

    pub fn node_count(&self) -> usize {
        self.first_edge.len() - 1
    }

    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    /// Outgoing edges of `node` as `(target, duration, distance)`.
    pub fn edges_from(&self, node: u32) -> impl Iterator<Item = (u32, f64, f64)> + '_ {
        let range = self.first_edge[node as usize]..self.first_edge[node as usize + 1];
        range.map(move |i| (self.targets[i], self.durations[i], self.distances[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> RoadNetwork {
        RoadNetwork {
            name: "triangle".into(),
            nodes: vec![
                Coordinate::new(13.38, 52.51),
                Coordinate::new(13.39, 52.51),
                Coordinate::new(13.39, 52.52),
            ],
            edges: vec![
                Edge { from: 0, to: 1, duration: 10.0, distance: 100.0 },
                Edge { from: 1, to: 2, duration: 20.0, distance: 200.0 },
                Edge { from: 0, to: 2, duration: 50.0, distance: 150.0 },
            ],
        }
    }

    #[test]
    fn test_graph_adjacency() {
        let graph = Graph::from_network(&triangle());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);

        let from_zero: Vec<_> = graph.edges_from(0).map(|(t, _, _)| t).collect();
        assert_eq!(from_zero, vec![1, 2]);
        assert_eq!(graph.edges_from(2).count(), 0);
    }

    #[test]
    fn test_validate_rejects_dangling_edge() {
        let mut network = triangle();
        network.edges.push(Edge { from: 2, to: 9, duration: 1.0, distance: 1.0 });
        assert!(matches!(network.validate(), Err(DatasetError::Integrity(_))));
    }

    #[test]
    fn test_validate_rejects_bad_coordinate() {
        let mut network = triangle();
        network.nodes[1].lat = 123.0;
        assert!(network.validate().is_err());
        assert!(triangle().validate().is_ok());
    }

    #[test]
    fn test_write_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        triangle().write_to(&path).unwrap();
        let read = RoadNetwork::read_from(&path).unwrap();
        assert_eq!(read.name, "triangle");
        assert_eq!(read.nodes, triangle().nodes);
        assert_eq!(read.edges, triangle().edges);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_to_full_disk_is_an_error() {
        let network = RoadNetwork {
            name: "single".into(),
            nodes: vec![Coordinate::new(13.38, 52.51)],
            edges: Vec::new(),
        };
        let result = network.write_to(Path::new("/dev/full"));
        assert!(result.is_err(), "late write failure must surface, got {:?}", result);
    }

    #[test]
    fn test_distance_is_plausible() {
        let a = Coordinate::new(13.38, 52.51);
        let b = Coordinate::new(13.38, 52.52);
        let d = a.distance_to(&b);
        assert!((d - 1112.0).abs() < 5.0, "got {}", d);
    }
}
