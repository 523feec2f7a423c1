//! Cross-process query counter.
//!
//! # Responsibilities
//! - Count in-flight queries of every process attached to the region
//! - Hold back new queries while a loader publishes a generation
//! - Let the loader wait until the count drains to zero
//!
//! # Design Decisions
//! - The count and the update-pending flag share one atomic word, so
//!   admission is a single compare-and-swap that can never slip past a
//!   loader that has already raised the flag
//! - Waiters poll with capped exponential backoff (other processes cannot
//!   signal us) and also park on a local condition variable so releases
//!   in this process wake them immediately

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::gate::region::SharedRegion;

const PENDING_BIT: u64 = 1 << 63;
const COUNT_MASK: u64 = PENDING_BIT - 1;

const BACKOFF_BASE_US: u64 = 50;
const BACKOFF_MAX_US: u64 = 5_000;

/// Delay before the next poll of the shared state.
fn poll_delay(attempt: u32) -> Duration {
    let exponential = 2u64.saturating_pow(attempt.min(16));
    Duration::from_micros(BACKOFF_BASE_US.saturating_mul(exponential).min(BACKOFF_MAX_US))
}

/// Admission counter and update flag backed by a [`SharedRegion`].
pub struct QueryBarrier {
    region: Arc<SharedRegion>,
    wait_lock: Mutex<()>,
    wakeup: Condvar,
}

impl std::fmt::Debug for QueryBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBarrier")
            .field("active_queries", &self.active_queries())
            .field("update_pending", &self.update_pending())
            .field("shared", &self.region.is_shared())
            .finish()
    }
}

impl QueryBarrier {
    pub fn new(region: Arc<SharedRegion>) -> Self {
        Self {
            region,
            wait_lock: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// A barrier visible to this process only.
    pub fn in_process() -> Self {
        Self::new(SharedRegion::in_process())
    }

    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    fn load(&self) -> u64 {
        self.region.header().state.load(Ordering::Acquire)
    }

    /// Queries currently admitted across all processes.
    pub fn active_queries(&self) -> u64 {
        self.load() & COUNT_MASK
    }

    /// Whether a loader is currently publishing a generation.
    pub fn update_pending(&self) -> bool {
        self.load() & PENDING_BIT != 0
    }

    /// Register one in-flight query, waiting out any pending update.
    pub fn enter(&self) {
        let state = &self.region.header().state;
        let mut current = state.load(Ordering::Acquire);
        loop {
            if current & PENDING_BIT != 0 {
                self.wait_until(None, || !self.update_pending());
                current = state.load(Ordering::Acquire);
                continue;
            }
            assert!(
                current & COUNT_MASK < COUNT_MASK,
                "query count overflow, shared gate state is corrupted"
            );
            match state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Unregister one in-flight query.
    pub fn leave(&self) {
        let state = &self.region.header().state;
        let mut current = state.load(Ordering::Acquire);
        loop {
            assert!(current & COUNT_MASK > 0, "invalid number of queries");
            match state.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if current & COUNT_MASK == 1 {
            self.notify_all();
        }
    }

    /// Raise the update-pending flag, blocking new admissions.
    ///
    /// Waits if another loader already holds the flag.
    pub fn begin_update(&self) -> UpdateGuard<'_> {
        let state = &self.region.header().state;
        loop {
            let previous = state.fetch_or(PENDING_BIT, Ordering::AcqRel);
            if previous & PENDING_BIT == 0 {
                return UpdateGuard { barrier: self };
            }
            self.wait_until(None, || !self.update_pending());
        }
    }

    /// Wait until no query is in flight anywhere. Returns false on timeout.
    pub fn wait_for_quiescence(&self, timeout: Duration) -> bool {
        self.wait_until(Some(Instant::now() + timeout), || {
            self.active_queries() == 0
        })
    }

    fn wait_until(&self, deadline: Option<Instant>, mut ready: impl FnMut() -> bool) -> bool {
        let mut attempt = 0;
        loop {
            if ready() {
                return true;
            }
            let mut delay = poll_delay(attempt);
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                delay = delay.min(deadline - now);
            }

            let mut guard = self.wait_lock.lock();
            if ready() {
                return true;
            }
            self.wakeup.wait_for(&mut guard, delay);
            attempt += 1;
        }
    }

    fn notify_all(&self) {
        let _guard = self.wait_lock.lock();
        self.wakeup.notify_all();
    }
}

/// Keeps the update-pending flag raised; clears it on drop.
#[must_use = "the update flag is cleared as soon as the guard is dropped"]
pub struct UpdateGuard<'a> {
    barrier: &'a QueryBarrier,
}

impl UpdateGuard<'_> {
    /// See [`QueryBarrier::wait_for_quiescence`].
    pub fn wait_for_quiescence(&self, timeout: Duration) -> bool {
        self.barrier.wait_for_quiescence(timeout)
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.barrier
            .region
            .header()
            .state
            .fetch_and(!PENDING_BIT, Ordering::AcqRel);
        self.barrier.notify_all();
    }
}
