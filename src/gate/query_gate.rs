//! Admission and generation handoff.

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dataset::{DatasetHandle, Generation};
use crate::gate::barrier::QueryBarrier;
use crate::observability::metrics;
use crate::watchdog::GenerationLoader;

thread_local! {
    static IN_TRANSITION: Cell<bool> = const { Cell::new(false) };
}

/// Counters describing the gate's activity in this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub admitted: u64,
    pub released: u64,
    pub swaps: u64,
    /// Queries in flight across every process on the region.
    pub active_queries: u64,
    pub update_pending: bool,
}

/// Serializes generation swaps against query admission.
///
/// Every query is admitted on the shared barrier, then passes through the
/// process-local transition lock where a newer generation, if one has been
/// published, replaces the current handle. The query keeps its own clone of
/// whichever handle was current when it left the lock.
///
/// Retired generations are not destroyed at swap time: they live until the
/// last in-flight query that cloned them finishes.
pub struct QueryGate {
    barrier: QueryBarrier,
    loader: Box<dyn GenerationLoader>,
    transition: Mutex<()>,
    occupancy: AtomicUsize,
    max_occupancy: AtomicUsize,
    admitted: AtomicU64,
    released: AtomicU64,
    swaps: AtomicU64,
}

impl std::fmt::Debug for QueryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryGate")
            .field("barrier", &self.barrier)
            .field("stats", &self.stats())
            .finish()
    }
}

impl QueryGate {
    pub fn new(barrier: QueryBarrier, loader: Box<dyn GenerationLoader>) -> Self {
        Self {
            barrier,
            loader,
            transition: Mutex::new(()),
            occupancy: AtomicUsize::new(0),
            max_occupancy: AtomicUsize::new(0),
            admitted: AtomicU64::new(0),
            released: AtomicU64::new(0),
            swaps: AtomicU64::new(0),
        }
    }

    pub fn barrier(&self) -> &QueryBarrier {
        &self.barrier
    }

    /// Register one in-flight query. Dropping the admission releases it.
    pub fn admit(&self) -> Admission<'_> {
        self.barrier.enter();
        self.admitted.fetch_add(1, Ordering::Relaxed);
        metrics::record_active_queries(self.barrier.active_queries());
        Admission { gate: self }
    }

    fn release(&self) {
        self.barrier.leave();
        self.released.fetch_add(1, Ordering::Relaxed);
        metrics::record_active_queries(self.barrier.active_queries());
    }

    /// Replace `current` with a newer generation if the loader has one.
    ///
    /// Returns the new handle, or `None` when nothing newer was published.
    pub fn quiesce_and_swap(&self, current: &ArcSwap<Generation>) -> Option<DatasetHandle> {
        let _transition = self.lock_transition();
        self.swap_locked(current)
    }

    /// Run the swap check and take the caller's own reference to the
    /// resulting current generation before the lock is released.
    pub(crate) fn checkout(&self, current: &ArcSwap<Generation>) -> DatasetHandle {
        let _transition = self.lock_transition();
        self.swap_locked(current);
        current.load_full()
    }

    fn swap_locked(&self, current: &ArcSwap<Generation>) -> Option<DatasetHandle> {
        let _occupant = OccupancyProbe::enter(self);

        if !self.loader.has_newer_generation() {
            tracing::trace!("No newer dataset generation");
            return None;
        }
        let next = self.loader.load_if_newer()?;

        let previous = current.swap(Arc::clone(&next));
        self.swaps.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            from = %previous.id(),
            to = %next.id(),
            // one reference is `previous` itself
            still_in_flight = Arc::strong_count(&previous) - 1,
            "Dataset generation swapped"
        );
        metrics::record_generation_swap(next.id());
        Some(next)
    }

    fn lock_transition(&self) -> TransitionGuard<'_> {
        IN_TRANSITION.with(|flag| {
            assert!(!flag.replace(true), "reentrant transition lock acquisition");
        });
        TransitionGuard {
            _lock: self.transition.lock(),
        }
    }

    /// Highest number of threads ever seen inside the swap body at once.
    pub fn max_transition_occupancy(&self) -> usize {
        self.max_occupancy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
            active_queries: self.barrier.active_queries(),
            update_pending: self.barrier.update_pending(),
        }
    }
}

/// One admitted query; releases its slot on drop, on every exit path.
#[must_use = "the query is released as soon as the admission is dropped"]
pub struct Admission<'a> {
    gate: &'a QueryGate,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

struct TransitionGuard<'a> {
    _lock: MutexGuard<'a, ()>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        IN_TRANSITION.with(|flag| flag.set(false));
    }
}

struct OccupancyProbe<'a> {
    gate: &'a QueryGate,
}

impl<'a> OccupancyProbe<'a> {
    fn enter(gate: &'a QueryGate) -> Self {
        let inside = gate.occupancy.fetch_add(1, Ordering::AcqRel) + 1;
        gate.max_occupancy.fetch_max(inside, Ordering::AcqRel);
        assert_eq!(inside, 1, "more than one thread inside the generation swap");
        Self { gate }
    }
}

impl Drop for OccupancyProbe<'_> {
    fn drop(&mut self) {
        self.gate.occupancy.fetch_sub(1, Ordering::AcqRel);
    }
}
