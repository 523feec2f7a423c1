//! Watchdog for generations published into a shared region.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::dataset::storage::generation_dir;
use crate::dataset::{DatasetError, DatasetHandle, Generation, GenerationId, StorageConfig};
use crate::gate::region::{RegionError, SharedRegion};
use crate::watchdog::GenerationLoader;

/// Failure to bring a published generation into this process.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No dataset generation has been published")]
    NothingPublished,

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Follows the current generation of a shared region.
#[derive(Debug)]
pub struct SharedWatchdog {
    root: PathBuf,
    region: Arc<SharedRegion>,
    // id of the last generation handed out, 0 before the first load
    loaded: AtomicU64,
    // last id that failed to load; not retried until another is published
    rejected: AtomicU64,
}

impl SharedWatchdog {
    /// Whether a region exists below `root` and has a published generation.
    pub fn try_connect(root: &Path) -> bool {
        SharedRegion::open(root)
            .map(|region| region.current_generation().is_some())
            .unwrap_or(false)
    }

    pub fn connect(root: &Path) -> Result<Self, RegionError> {
        let region = SharedRegion::open(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            region,
            loaded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }

    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load whatever generation is current right now.
    pub fn load_current(&self) -> Result<DatasetHandle, LoadError> {
        let id = self
            .region
            .current_generation()
            .ok_or(LoadError::NothingPublished)?;
        self.load(id)
    }

    fn load(&self, id: GenerationId) -> Result<DatasetHandle, LoadError> {
        // Attach before reading so the loader cannot remove the files under us.
        let lease = self.region.attach(id)?;
        let storage = StorageConfig::new(generation_dir(&self.root, id));
        let generation = Generation::load(&storage, id)?.with_lease(lease);
        self.loaded.store(id.get(), Ordering::Release);
        Ok(Arc::new(generation))
    }
}

impl GenerationLoader for SharedWatchdog {
    fn has_newer_generation(&self) -> bool {
        match self.region.current_generation() {
            Some(id) => {
                id.get() != self.loaded.load(Ordering::Acquire)
                    && id.get() != self.rejected.load(Ordering::Acquire)
            }
            None => false,
        }
    }

    fn load_if_newer(&self) -> Option<DatasetHandle> {
        let id = self.region.current_generation()?;
        if !self.has_newer_generation() {
            return None;
        }
        match self.load(id) {
            Ok(generation) => Some(generation),
            Err(e) => {
                self.rejected.store(id.get(), Ordering::Release);
                tracing::warn!(
                    generation = %id,
                    error = %e,
                    "Failed to load published generation, keeping the current one"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::network::{Coordinate, RoadNetwork};
    use crate::dataset::storage::NETWORK_FILE;

    fn publish_raw(root: &Path, region: &SharedRegion, raw: u64) {
        let id = GenerationId::new(raw).unwrap();
        let dir = generation_dir(root, id);
        std::fs::create_dir_all(&dir).unwrap();
        let network = RoadNetwork {
            name: format!("gen {}", raw),
            nodes: vec![Coordinate::new(13.4, 52.5)],
            edges: vec![],
        };
        network.write_to(&dir.join(NETWORK_FILE)).unwrap();
        region.set_current_generation(id);
    }

    #[test]
    fn test_try_connect_requires_published_generation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!SharedWatchdog::try_connect(dir.path()));

        let region = SharedRegion::create(dir.path()).unwrap();
        assert!(!SharedWatchdog::try_connect(dir.path()));

        publish_raw(dir.path(), &region, 1);
        assert!(SharedWatchdog::try_connect(dir.path()));
    }

    #[test]
    fn test_follows_current_generation() {
        let dir = tempfile::tempdir().unwrap();
        let region = SharedRegion::create(dir.path()).unwrap();
        publish_raw(dir.path(), &region, 1);

        let watchdog = SharedWatchdog::connect(dir.path()).unwrap();
        assert!(watchdog.has_newer_generation());
        let first = watchdog.load_if_newer().unwrap();
        assert_eq!(first.id().get(), 1);
        assert_eq!(region.holders(first.id()), 1);
        assert!(!watchdog.has_newer_generation());
        assert!(watchdog.load_if_newer().is_none());

        publish_raw(dir.path(), &region, 2);
        assert!(watchdog.has_newer_generation());
        let second = watchdog.load_if_newer().unwrap();
        assert_eq!(second.name(), "gen 2");

        let first_id = first.id();
        drop(first);
        assert_eq!(region.holders(first_id), 0);
    }

    #[test]
    fn test_broken_generation_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let region = SharedRegion::create(dir.path()).unwrap();
        publish_raw(dir.path(), &region, 1);
        let watchdog = SharedWatchdog::connect(dir.path()).unwrap();
        let _first = watchdog.load_current().unwrap();

        let broken = GenerationId::new(2).unwrap();
        std::fs::create_dir_all(generation_dir(dir.path(), broken)).unwrap();
        region.set_current_generation(broken);

        assert!(watchdog.has_newer_generation());
        assert!(watchdog.load_if_newer().is_none());
        assert_eq!(region.holders(broken), 0, "failed load releases its lease");
        assert!(!watchdog.has_newer_generation(), "failed generation is not retried");

        publish_raw(dir.path(), &region, 3);
        assert_eq!(watchdog.load_if_newer().map(|g| g.id().get()), Some(3));
    }
}
