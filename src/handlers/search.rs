//! Graph search shared by the handlers.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::dataset::{Coordinate, Graph, RoadNetwork};
use crate::handlers::Waypoint;

const NO_PARENT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cost(f64);

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// The `count` nodes closest to `coordinate`, nearest first.
pub fn nearest_nodes(network: &RoadNetwork, coordinate: &Coordinate, count: usize) -> Vec<Waypoint> {
    let mut candidates: Vec<Waypoint> = network
        .nodes
        .iter()
        .enumerate()
        .map(|(index, location)| Waypoint {
            node: index as u32,
            location: *location,
            distance: coordinate.distance_to(location),
        })
        .collect();
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.node.cmp(&b.node)));
    candidates.truncate(count);
    candidates
}

/// The node closest to `coordinate`, `None` on an empty network.
pub fn snap(network: &RoadNetwork, coordinate: &Coordinate) -> Option<Waypoint> {
    network
        .nodes
        .iter()
        .enumerate()
        .map(|(index, location)| Waypoint {
            node: index as u32,
            location: *location,
            distance: coordinate.distance_to(location),
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Like [`snap`], but only nodes within `radius` metres qualify.
pub fn snap_within(network: &RoadNetwork, coordinate: &Coordinate, radius: f64) -> Option<Waypoint> {
    snap(network, coordinate).filter(|waypoint| waypoint.distance <= radius)
}

/// Fastest path between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<u32>,
    pub duration: f64,
    pub distance: f64,
}

struct SearchTree {
    durations: Vec<f64>,
    distances: Vec<f64>,
    parents: Vec<u32>,
}

/// Dijkstra on duration from `source`, stopping early once `target` settles.
fn dijkstra(graph: &Graph, source: u32, target: Option<u32>) -> SearchTree {
    let n = graph.node_count();
    let mut tree = SearchTree {
        durations: vec![f64::INFINITY; n],
        distances: vec![f64::INFINITY; n],
        parents: vec![NO_PARENT; n],
    };
    let mut settled = vec![false; n];
    let mut pq: BinaryHeap<Reverse<(Cost, u32)>> = BinaryHeap::new();

    tree.durations[source as usize] = 0.0;
    tree.distances[source as usize] = 0.0;
    pq.push(Reverse((Cost(0.0), source)));

    while let Some(Reverse((Cost(d), u))) = pq.pop() {
        if settled[u as usize] {
            continue;
        }
        settled[u as usize] = true;
        if Some(u) == target {
            break;
        }

        for (v, duration, distance) in graph.edges_from(u) {
            let new_duration = d + duration;
            if new_duration < tree.durations[v as usize] {
                tree.durations[v as usize] = new_duration;
                tree.distances[v as usize] = tree.distances[u as usize] + distance;
                tree.parents[v as usize] = u;
                pq.push(Reverse((Cost(new_duration), v)));
            }
        }
    }
    tree
}

/// Fastest path from `source` to `target`, `None` when unreachable.
pub fn shortest_path(graph: &Graph, source: u32, target: u32) -> Option<Path> {
    let tree = dijkstra(graph, source, Some(target));
    let duration = tree.durations[target as usize];
    if !duration.is_finite() {
        return None;
    }

    let mut nodes = vec![target];
    let mut node = target;
    while node != source {
        node = tree.parents[node as usize];
        nodes.push(node);
    }
    nodes.reverse();

    Some(Path {
        nodes,
        duration,
        distance: tree.distances[target as usize],
    })
}

/// Durations from `source` to each of `targets`, `None` when unreachable.
pub fn durations_from(graph: &Graph, source: u32, targets: &[u32]) -> Vec<Option<f64>> {
    let tree = dijkstra(graph, source, None);
    targets
        .iter()
        .map(|&t| Some(tree.durations[t as usize]).filter(|d| d.is_finite()))
        .collect()
}

/// Fastest path visiting `waypoints` in order, joined into one path.
///
/// Returns the joined path and the per-leg `(duration, distance)`.
pub fn path_through(graph: &Graph, waypoints: &[u32]) -> Option<(Path, Vec<(f64, f64)>)> {
    let mut joined = Path {
        nodes: waypoints.first().copied().into_iter().collect(),
        duration: 0.0,
        distance: 0.0,
    };
    let mut legs = Vec::with_capacity(waypoints.len().saturating_sub(1));

    for pair in waypoints.windows(2) {
        let leg = shortest_path(graph, pair[0], pair[1])?;
        joined.nodes.extend_from_slice(&leg.nodes[1..]);
        joined.duration += leg.duration;
        joined.distance += leg.distance;
        legs.push((leg.duration, leg.distance));
    }
    Some((joined, legs))
}

/// Coordinates of the nodes along a path.
pub fn geometry(network: &RoadNetwork, nodes: &[u32]) -> Vec<Coordinate> {
    nodes.iter().map(|&n| network.nodes[n as usize]).collect()
}
