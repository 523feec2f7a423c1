//! GeoJSON export of the road segments inside one slippy-map tile.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::f64::consts::PI;

use crate::dataset::{Coordinate, Generation};
use crate::handlers::{Handler, HandlerError, HandlerResult};

pub const MAX_ZOOM: u32 = 22;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TileRequest {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

/// Longitude/latitude bounds of a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    west: f64,
    east: f64,
    south: f64,
    north: f64,
}

impl Bounds {
    fn of(tile: &TileRequest) -> Self {
        let n = f64::from(1u32 << tile.z);
        let lon = |x: f64| x / n * 360.0 - 180.0;
        let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
        Self {
            west: lon(f64::from(tile.x)),
            east: lon(f64::from(tile.x) + 1.0),
            north: lat(f64::from(tile.y)),
            south: lat(f64::from(tile.y) + 1.0),
        }
    }

    fn contains(&self, c: &Coordinate) -> bool {
        c.lon >= self.west && c.lon < self.east && c.lat > self.south && c.lat <= self.north
    }
}

#[derive(Debug, Clone, Default)]
pub struct TileHandler;

impl TileHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for TileHandler {
    const KIND: &'static str = "tile";

    type Request = TileRequest;
    /// A GeoJSON `FeatureCollection`.
    type Output = String;

    fn handle(&self, dataset: &Generation, tile: &TileRequest) -> HandlerResult<String> {
        if tile.z > MAX_ZOOM {
            return Err(HandlerError::InvalidOptions(format!(
                "Zoom level {} is above the maximum of {}",
                tile.z, MAX_ZOOM
            )));
        }
        let n = 1u64 << tile.z;
        if u64::from(tile.x) >= n || u64::from(tile.y) >= n {
            return Err(HandlerError::InvalidOptions(format!(
                "Tile {}/{}/{} does not exist",
                tile.z, tile.x, tile.y
            )));
        }

        let bounds = Bounds::of(tile);
        let nodes = &dataset.network().nodes;
        let features: Vec<serde_json::Value> = dataset
            .network()
            .edges
            .iter()
            .filter(|e| {
                bounds.contains(&nodes[e.from as usize]) || bounds.contains(&nodes[e.to as usize])
            })
            .map(|e| {
                let (a, b) = (nodes[e.from as usize], nodes[e.to as usize]);
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[a.lon, a.lat], [b.lon, b.lat]],
                    },
                    "properties": {
                        "from": e.from,
                        "to": e.to,
                        "duration": e.duration,
                        "distance": e.distance,
                    },
                })
            })
            .collect();

        Ok(json!({ "type": "FeatureCollection", "features": features }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fixtures::grid;

    #[test]
    fn test_tile_bounds() {
        let world = Bounds::of(&TileRequest { z: 0, x: 0, y: 0 });
        assert_eq!(world.west, -180.0);
        assert_eq!(world.east, 180.0);
        assert!((world.north - 85.0511).abs() < 1e-4);

        let quarter = Bounds::of(&TileRequest { z: 1, x: 1, y: 0 });
        assert_eq!(quarter.west, 0.0);
        assert!(quarter.south.abs() < 1e-9);
    }

    #[test]
    fn test_tile_contains_grid_edges() {
        let dataset = grid();
        // z=10 tile holding Berlin (13.4E, 52.5N)
        let tile = TileRequest { z: 10, x: 550, y: 335 };
        let body = TileHandler::new().handle(&dataset, &tile).unwrap();
        let geojson: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(geojson["type"], "FeatureCollection");
        assert_eq!(
            geojson["features"].as_array().unwrap().len(),
            dataset.network().edges.len()
        );

        let empty = TileHandler::new()
            .handle(&dataset, &TileRequest { z: 10, x: 0, y: 0 })
            .unwrap();
        assert!(empty.contains("\"features\":[]"));
    }

    #[test]
    fn test_invalid_tiles() {
        let dataset = grid();
        let handler = TileHandler::new();
        for tile in [
            TileRequest { z: 23, x: 0, y: 0 },
            TileRequest { z: 2, x: 4, y: 0 },
            TileRequest { z: 2, x: 0, y: 4 },
        ] {
            assert_eq!(handler.handle(&dataset, &tile).unwrap_err().code(), "InvalidOptions");
        }
    }
}
