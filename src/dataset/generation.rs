//! Immutable dataset generations.

use serde::Serialize;
use std::num::NonZeroU64;
use std::sync::Arc;

use crate::dataset::network::{Graph, RoadNetwork};
use crate::dataset::storage::StorageConfig;
use crate::dataset::DatasetError;
use crate::gate::region::HolderLease;

/// Identifier of a published generation. Zero is reserved for "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GenerationId(NonZeroU64);

impl GenerationId {
    /// Id given to the single generation of a standalone process.
    pub const STANDALONE: GenerationId = GenerationId(NonZeroU64::MIN);

    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// The id following this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for GenerationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared, reference-counted handle to one generation.
///
/// The generation is destroyed when the last handle drops, so a request
/// that cloned the handle keeps its generation alive after a swap.
pub type DatasetHandle = Arc<Generation>;

/// One immutable snapshot of the road network.
#[derive(Debug)]
pub struct Generation {
    id: GenerationId,
    network: RoadNetwork,
    graph: Graph,
    // Detaches from the shared holder table when the generation is destroyed.
    lease: Option<HolderLease>,
}

impl Generation {
    /// Validate `network` and build its query structures.
    pub fn new(id: GenerationId, network: RoadNetwork) -> Result<Self, DatasetError> {
        network.validate()?;
        let graph = Graph::from_network(&network);
        Ok(Self {
            id,
            network,
            graph,
            lease: None,
        })
    }

    /// Load the dataset stored at `storage`.
    pub fn load(storage: &StorageConfig, id: GenerationId) -> Result<Self, DatasetError> {
        let network = storage.load_network()?;
        let generation = Self::new(id, network)?;
        tracing::info!(
            generation = %id,
            path = %storage.base().display(),
            nodes = generation.graph.node_count(),
            edges = generation.graph.edge_count(),
            "Dataset generation loaded"
        );
        Ok(generation)
    }

    /// Tie this generation to a holder slot of the shared region.
    pub fn with_lease(mut self, lease: HolderLease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.network.name
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        tracing::info!(generation = %self.id, "Dataset generation released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::network::{Coordinate, Edge};

    #[test]
    fn test_generation_ids() {
        assert_eq!(GenerationId::new(0), None);
        let id = GenerationId::new(41).unwrap();
        assert_eq!(id.next().get(), 42);
        assert_eq!(GenerationId::STANDALONE.get(), 1);
        assert_eq!(serde_json::to_string(&id).unwrap(), "41");
    }

    #[test]
    fn test_generation_rejects_invalid_network() {
        let network = RoadNetwork {
            name: "broken".into(),
            nodes: vec![Coordinate::new(0.0, 0.0)],
            edges: vec![Edge { from: 0, to: 1, duration: 1.0, distance: 1.0 }],
        };
        assert!(Generation::new(GenerationId::STANDALONE, network).is_err());
    }

    #[test]
    fn test_handle_outlives_swap() {
        let first = Arc::new(Generation::new(GenerationId::STANDALONE, RoadNetwork::default()).unwrap());
        let in_flight = Arc::clone(&first);
        let weak = Arc::downgrade(&first);

        drop(first);
        assert!(weak.upgrade().is_some(), "in-flight holder keeps the generation alive");
        drop(in_flight);
        assert!(weak.upgrade().is_none());
    }
}
