//! Loader side of shared mode: publishes and retires dataset generations.
//!
//! # Data Flow
//! ```text
//! publish(source)
//!     → validate source dataset
//!     → write gen-<id> (staged, then renamed into place)
//!     → barrier.begin_update()          new queries wait
//!     → wait_for_quiescence(timeout)    in-flight queries finish
//!     → region: current generation = id
//!     → guard dropped                   queries resume, servers swap lazily
//!
//! retire_unused()
//!     → every gen-<id> that is not current and has no holders
//!     → tombstone holder slot, remove directory, free slot
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::dataset::storage::{generation_dir, parse_generation_dir, NETWORK_FILE};
use crate::dataset::{DatasetError, GenerationId, StorageConfig};
use crate::gate::region::HOLDER_SLOTS;
use crate::gate::{QueryBarrier, RegionError, SharedRegion};

/// Failures of the loader process.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Source is not a dataset directory: {}", .0.display())]
    InvalidSource(PathBuf),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Queries did not drain within {timeout:?} ({active} still active), generation {generation} not published")]
    DrainTimeout {
        generation: GenerationId,
        timeout: Duration,
        active: u64,
    },

    #[error("Holder slot for generation {generation} is still held by generation {occupant}")]
    SlotBusy {
        generation: GenerationId,
        occupant: GenerationId,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PublishError + '_ {
    move |source| PublishError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Holder count of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HolderEntry {
    pub generation: u64,
    pub holders: u64,
}

/// Snapshot of a shared root.
#[derive(Debug, Clone, Serialize)]
pub struct DatastoreStatus {
    pub root: PathBuf,
    pub current_generation: Option<GenerationId>,
    pub active_queries: u64,
    pub update_pending: bool,
    /// Generation directories present on disk.
    pub generations: Vec<GenerationId>,
    pub holders: Vec<HolderEntry>,
}

/// The single loader of a shared root.
#[derive(Debug)]
pub struct Datastore {
    root: PathBuf,
    region: Arc<SharedRegion>,
    barrier: QueryBarrier,
}

impl Datastore {
    /// Open the shared root, creating it and its region if needed.
    pub fn open_or_create(root: &Path) -> Result<Self, RegionError> {
        let region = SharedRegion::create(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            barrier: QueryBarrier::new(Arc::clone(&region)),
            region,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    /// Copy the dataset at `source` into a new generation and make it current.
    ///
    /// New queries are held back until every in-flight query has finished.
    /// If that takes longer than `drain_timeout` the publish is abandoned and
    /// the previous generation stays current.
    pub fn publish(&self, source: &Path, drain_timeout: Duration) -> Result<GenerationId, PublishError> {
        let storage = StorageConfig::new(source);
        if !storage.is_valid() {
            return Err(PublishError::InvalidSource(source.to_path_buf()));
        }
        let network = storage.load_network()?;

        let id = self.next_generation_id()?;
        self.free_slot(id)?;

        let dir = generation_dir(&self.root, id);
        let staging = self.root.join(format!(".staging-{}", id));
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(io_error(&staging))?;
        }
        std::fs::create_dir_all(&staging).map_err(io_error(&staging))?;
        network.write_to(&staging.join(NETWORK_FILE))?;
        StorageConfig::new(&staging).load_network()?;
        std::fs::rename(&staging, &dir).map_err(io_error(&dir))?;

        let update = self.barrier.begin_update();
        if !update.wait_for_quiescence(drain_timeout) {
            let active = self.barrier.active_queries();
            drop(update);
            tracing::warn!(
                generation = %id,
                active_queries = active,
                timeout_ms = drain_timeout.as_millis() as u64,
                "Queries did not drain, publish abandoned"
            );
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to remove abandoned generation");
            }
            return Err(PublishError::DrainTimeout {
                generation: id,
                timeout: drain_timeout,
                active,
            });
        }

        let previous = self.region.current_generation();
        self.region.set_current_generation(id);
        drop(update);

        tracing::info!(
            generation = %id,
            previous = ?previous.map(GenerationId::get),
            dataset = %network.name,
            nodes = network.nodes.len(),
            edges = network.edges.len(),
            "Dataset generation published"
        );
        Ok(id)
    }

    /// Remove every non-current generation that no process holds.
    ///
    /// Returns the ids that were removed.
    pub fn retire_unused(&self) -> Result<Vec<GenerationId>, PublishError> {
        let current = self.region.current_generation();
        let mut retired = Vec::new();

        for id in self.generations_on_disk()? {
            if Some(id) == current {
                continue;
            }
            if self.retire(id)? {
                retired.push(id);
            } else {
                tracing::debug!(generation = %id, holders = self.region.holders(id), "Generation still held");
            }
        }
        Ok(retired)
    }

    pub fn status(&self) -> Result<DatastoreStatus, PublishError> {
        Ok(DatastoreStatus {
            root: self.root.clone(),
            current_generation: self.region.current_generation(),
            active_queries: self.barrier.active_queries(),
            update_pending: self.barrier.update_pending(),
            generations: self.generations_on_disk()?,
            holders: self
                .region
                .holder_table()
                .into_iter()
                .map(|(generation, holders)| HolderEntry { generation, holders })
                .collect(),
        })
    }

    fn retire(&self, id: GenerationId) -> Result<bool, PublishError> {
        let Some(token) = self.region.try_retire(id) else {
            return Ok(false);
        };
        let dir = generation_dir(&self.root, id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(io_error(&dir))?;
        }
        drop(token);
        tracing::info!(generation = %id, "Retired generation destroyed");
        Ok(true)
    }

    /// Make sure the holder slot `id` maps to is not taken by an older generation.
    fn free_slot(&self, id: GenerationId) -> Result<(), PublishError> {
        let occupant = self
            .region
            .holder_table()
            .into_iter()
            .map(|(generation, _)| generation)
            .filter(|&g| g != id.get() && g % HOLDER_SLOTS as u64 == id.get() % HOLDER_SLOTS as u64)
            .find_map(GenerationId::new);

        match occupant {
            None => Ok(()),
            Some(occupant) => {
                let current = self.region.current_generation() == Some(occupant);
                if !current && self.retire(occupant)? {
                    Ok(())
                } else {
                    Err(PublishError::SlotBusy {
                        generation: id,
                        occupant,
                    })
                }
            }
        }
    }

    fn next_generation_id(&self) -> Result<GenerationId, PublishError> {
        let on_disk = self.generations_on_disk()?.into_iter().max();
        let newest = on_disk.max(self.region.current_generation());
        Ok(newest.map_or(GenerationId::STANDALONE, GenerationId::next))
    }

    fn generations_on_disk(&self) -> Result<Vec<GenerationId>, PublishError> {
        let entries = std::fs::read_dir(&self.root).map_err(io_error(&self.root))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&self.root))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(parse_generation_dir) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Coordinate, RoadNetwork};

    fn write_source(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let network = RoadNetwork {
            name: name.into(),
            nodes: vec![Coordinate::new(13.4, 52.5)],
            edges: vec![],
        };
        network.write_to(&dir.join(NETWORK_FILE)).unwrap();
    }

    #[test]
    fn test_publish_assigns_increasing_ids() {
        let shared = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        write_source(source.path(), "first");

        let store = Datastore::open_or_create(shared.path()).unwrap();
        let timeout = Duration::from_secs(1);
        let first = store.publish(source.path(), timeout).unwrap();
        let second = store.publish(source.path(), timeout).unwrap();
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);

        let status = store.status().unwrap();
        assert_eq!(status.current_generation, Some(second));
        assert_eq!(status.generations, vec![first, second]);
        assert!(!status.update_pending);
    }

    #[test]
    fn test_invalid_source_is_rejected() {
        let shared = tempfile::tempdir().unwrap();
        let store = Datastore::open_or_create(shared.path()).unwrap();
        let err = store
            .publish(&shared.path().join("missing"), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, PublishError::InvalidSource(_)));
        assert_eq!(store.region().current_generation(), None);
    }

    #[test]
    fn test_retire_keeps_current_and_held() {
        let shared = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        write_source(source.path(), "net");
        let store = Datastore::open_or_create(shared.path()).unwrap();
        let timeout = Duration::from_secs(1);

        let first = store.publish(source.path(), timeout).unwrap();
        let lease = store.region().attach(first).unwrap();
        let second = store.publish(source.path(), timeout).unwrap();

        assert!(store.retire_unused().unwrap().is_empty());
        drop(lease);
        assert_eq!(store.retire_unused().unwrap(), vec![first]);
        assert!(!generation_dir(shared.path(), first).exists());
        assert!(generation_dir(shared.path(), second).exists());
    }

    #[test]
    fn test_drain_timeout_abandons_publish() {
        let shared = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        write_source(source.path(), "net");
        let store = Datastore::open_or_create(shared.path()).unwrap();
        let first = store.publish(source.path(), Duration::from_secs(1)).unwrap();

        let server = QueryBarrier::new(Arc::clone(store.region()));
        server.enter();
        let err = store
            .publish(source.path(), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, PublishError::DrainTimeout { active: 1, .. }));
        assert_eq!(store.region().current_generation(), Some(first));
        assert!(!store.status().unwrap().update_pending);
        assert_eq!(store.status().unwrap().generations, vec![first]);
        server.leave();
    }
}
