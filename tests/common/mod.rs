//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

use route_gate::config::{EngineConfig, LimitsConfig};
use route_gate::dataset::storage::NETWORK_FILE;
use route_gate::dataset::{Coordinate, Edge, Generation, GenerationId, RoadNetwork};
use route_gate::engine::Engine;
use route_gate::http::HttpServer;
use route_gate::lifecycle::Shutdown;

/// A `size` x `size` grid 0.01 degrees apart with two-way 60s / 1000m edges.
/// Node `r * size + c` sits at `(13.40 + c * 0.01, 52.50 + r * 0.01)`.
pub fn grid_network(name: &str, size: u32) -> RoadNetwork {
    let mut nodes = Vec::new();
    for r in 0..size {
        for c in 0..size {
            nodes.push(Coordinate::new(13.40 + c as f64 * 0.01, 52.50 + r as f64 * 0.01));
        }
    }

    let mut edges = Vec::new();
    for r in 0..size {
        for c in 0..size {
            let node = r * size + c;
            let mut neighbours = Vec::new();
            if c + 1 < size {
                neighbours.push(node + 1);
            }
            if r + 1 < size {
                neighbours.push(node + size);
            }
            for other in neighbours {
                edges.push(Edge { from: node, to: other, duration: 60.0, distance: 1000.0 });
                edges.push(Edge { from: other, to: node, duration: 60.0, distance: 1000.0 });
            }
        }
    }

    RoadNetwork {
        name: name.to_string(),
        nodes,
        edges,
    }
}

pub fn generation(id: u64, name: &str) -> Arc<Generation> {
    let id = GenerationId::new(id).unwrap();
    Arc::new(Generation::new(id, grid_network(name, 3)).unwrap())
}

/// Write a 3x3 grid dataset into `dir`.
pub fn write_dataset(dir: &Path, name: &str) {
    std::fs::create_dir_all(dir).unwrap();
    grid_network(name, 3)
        .write_to(&dir.join(NETWORK_FILE))
        .unwrap();
}

pub fn node(index: usize) -> Coordinate {
    let network = grid_network("", 3);
    network.nodes[index]
}

pub fn limits() -> LimitsConfig {
    LimitsConfig::default()
}

/// Serve `engine` on an ephemeral local port.
pub async fn start_server(engine: Arc<Engine>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(EngineConfig::default(), engine);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}
