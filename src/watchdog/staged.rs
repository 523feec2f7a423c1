//! In-process generation handover.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dataset::DatasetHandle;
use crate::watchdog::GenerationLoader;

/// Loader fed directly by code in this process.
///
/// A generation passed to [`StagedLoader::stage`] is handed to the gate on
/// the next query. Staging again before that replaces the earlier one.
#[derive(Debug, Default)]
pub struct StagedLoader {
    staged: Mutex<Option<DatasetHandle>>,
    ready: AtomicBool,
}

impl StagedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, generation: DatasetHandle) {
        let mut staged = self.staged.lock();
        tracing::debug!(generation = %generation.id(), "Generation staged");
        *staged = Some(generation);
        self.ready.store(true, Ordering::Release);
    }
}

impl GenerationLoader for StagedLoader {
    fn has_newer_generation(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn load_if_newer(&self) -> Option<DatasetHandle> {
        let mut staged = self.staged.lock();
        self.ready.store(false, Ordering::Release);
        staged.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Generation, GenerationId, RoadNetwork};
    use std::sync::Arc;

    #[test]
    fn test_stage_is_consumed_once() {
        let loader = StagedLoader::new();
        assert!(!loader.has_newer_generation());
        assert!(loader.load_if_newer().is_none());

        let id = GenerationId::new(9).unwrap();
        loader.stage(Arc::new(Generation::new(id, RoadNetwork::default()).unwrap()));
        assert!(loader.has_newer_generation());
        assert_eq!(loader.load_if_newer().map(|g| g.id()), Some(id));
        assert!(!loader.has_newer_generation());
        assert!(loader.load_if_newer().is_none());
    }
}
