//! Control region shared by every process serving the same dataset.
//!
//! # Layout
//! ```text
//! offset  field
//! 0       magic               u64
//! 8       layout version      u64
//! 16      gate state          u64  (bit 63 = update pending, bits 0..63 = active queries)
//! 24      current generation  u64  (0 = nothing published)
//! 32      holder slots        32 × {generation u64, holders u64}
//! ```
//!
//! # Design Decisions
//! - Every field is an atomic, so the region needs no lock of its own
//! - The same layout lives either in a memory-mapped file (shared mode)
//!   or on the heap (in-process fallback), so the gate code is identical
//! - Holder slots are direct-mapped by `generation % HOLDER_SLOTS`

use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::dataset::GenerationId;

/// Name of the control file inside a shared root.
pub const REGION_FILE: &str = "region";

/// Number of generations that can be held at the same time.
pub const HOLDER_SLOTS: usize = 32;

const MAGIC: u64 = u64::from_le_bytes(*b"RGATE\0\0\x01");
const LAYOUT_VERSION: u64 = 1;

/// Holder count of a generation whose files are being removed.
const TOMBSTONE: u64 = u64::MAX;

/// Errors raised while opening or using the shared region.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("No shared region found at {}", .0.display())]
    Missing(PathBuf),

    #[error("IO error on shared region {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shared region {} is corrupted: {reason}", path.display())]
    Corrupted { path: PathBuf, reason: String },

    #[error("Holder slot for generation {requested} is occupied by generation {occupant}")]
    SlotOccupied { requested: GenerationId, occupant: u64 },

    #[error("Generation {0} is being retired")]
    Retiring(GenerationId),
}

#[repr(C)]
#[derive(Debug, Default)]
pub(crate) struct HolderSlot {
    generation: AtomicU64,
    holders: AtomicU64,
}

#[repr(C)]
#[derive(Debug)]
pub(crate) struct RegionHeader {
    magic: AtomicU64,
    version: AtomicU64,
    pub(crate) state: AtomicU64,
    current_generation: AtomicU64,
    slots: [HolderSlot; HOLDER_SLOTS],
}

impl RegionHeader {
    fn new() -> Self {
        Self {
            magic: AtomicU64::new(MAGIC),
            version: AtomicU64::new(LAYOUT_VERSION),
            state: AtomicU64::new(0),
            current_generation: AtomicU64::new(0),
            slots: std::array::from_fn(|_| HolderSlot::default()),
        }
    }
}

const REGION_SIZE: usize = std::mem::size_of::<RegionHeader>();

enum Backing {
    Heap(Box<RegionHeader>),
    Mapped(MmapMut),
}

/// The gate state, current generation pointer and holder table.
pub struct SharedRegion {
    backing: Backing,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("path", &self.path)
            .field("current_generation", &self.current_generation())
            .finish()
    }
}

impl SharedRegion {
    /// A heap-backed region visible to this process only.
    pub fn in_process() -> Arc<Self> {
        Arc::new(Self {
            backing: Backing::Heap(Box::new(RegionHeader::new())),
            path: None,
        })
    }

    /// Open the region below `root`, creating and initializing it if needed.
    pub fn create(root: &Path) -> Result<Arc<Self>, RegionError> {
        let path = root.join(REGION_FILE);
        let io_err = |source| RegionError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(root).map_err(io_err)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err)?;
        if file.metadata().map_err(io_err)?.len() < REGION_SIZE as u64 {
            file.set_len(REGION_SIZE as u64).map_err(io_err)?;
        }
        // SAFETY: the file is at least REGION_SIZE bytes and only ever
        // accessed through the atomics of RegionHeader.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(io_err)?;
        let region = Self {
            backing: Backing::Mapped(mmap),
            path: Some(path.clone()),
        };

        let header = region.header();
        header.version.store(LAYOUT_VERSION, Ordering::Release);
        match header
            .magic
            .compare_exchange(0, MAGIC, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => tracing::info!(path = %path.display(), "Shared region initialized"),
            Err(MAGIC) => {}
            Err(other) => {
                return Err(RegionError::Corrupted {
                    path,
                    reason: format!("unexpected magic {:#x}", other),
                })
            }
        }
        Ok(Arc::new(region))
    }

    /// Open an existing region below `root`.
    pub fn open(root: &Path) -> Result<Arc<Self>, RegionError> {
        let path = root.join(REGION_FILE);
        if !path.is_file() {
            return Err(RegionError::Missing(path));
        }
        let io_err = |source| RegionError::Io {
            path: path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        if len < REGION_SIZE as u64 {
            return Err(RegionError::Corrupted {
                path,
                reason: format!("file is {} bytes, expected {}", len, REGION_SIZE),
            });
        }
        // SAFETY: see `create`.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(io_err)?;
        let region = Self {
            backing: Backing::Mapped(mmap),
            path: Some(path.clone()),
        };

        let header = region.header();
        let magic = header.magic.load(Ordering::Acquire);
        let version = header.version.load(Ordering::Acquire);
        if magic != MAGIC || version != LAYOUT_VERSION {
            return Err(RegionError::Corrupted {
                path,
                reason: format!("magic {:#x}, layout version {}", magic, version),
            });
        }
        Ok(Arc::new(region))
    }

    pub(crate) fn header(&self) -> &RegionHeader {
        match &self.backing {
            Backing::Heap(header) => header.as_ref(),
            // SAFETY: the mapping is page aligned, at least REGION_SIZE bytes
            // long, lives as long as `self`, and RegionHeader consists of
            // atomics only, for which every bit pattern is valid.
            Backing::Mapped(mmap) => unsafe { &*mmap.as_ptr().cast::<RegionHeader>() },
        }
    }

    /// Backing file, if this region is shared across processes.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    /// The generation new queries should run against.
    pub fn current_generation(&self) -> Option<GenerationId> {
        GenerationId::new(self.header().current_generation.load(Ordering::Acquire))
    }

    pub(crate) fn set_current_generation(&self, id: GenerationId) {
        self.header()
            .current_generation
            .store(id.get(), Ordering::Release);
    }

    fn slot(&self, id: GenerationId) -> &HolderSlot {
        &self.header().slots[(id.get() % HOLDER_SLOTS as u64) as usize]
    }

    /// Register this process as a holder of generation `id`.
    pub fn attach(self: &Arc<Self>, id: GenerationId) -> Result<HolderLease, RegionError> {
        let slot = self.slot(id);
        loop {
            let occupant = slot.generation.load(Ordering::Acquire);
            if occupant == 0 {
                let _ = slot.generation.compare_exchange(
                    0,
                    id.get(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                continue;
            }
            if occupant != id.get() {
                return Err(RegionError::SlotOccupied {
                    requested: id,
                    occupant,
                });
            }

            let holders = slot.holders.load(Ordering::Acquire);
            if holders == TOMBSTONE {
                return Err(RegionError::Retiring(id));
            }
            if slot
                .holders
                .compare_exchange(holders, holders + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            // The slot may have been recycled between the two loads.
            if slot.generation.load(Ordering::Acquire) != id.get() {
                slot.holders.fetch_sub(1, Ordering::AcqRel);
                continue;
            }
            return Ok(HolderLease {
                region: Arc::clone(self),
                generation: id,
            });
        }
    }

    /// Number of live holders of generation `id` across all processes.
    pub fn holders(&self, id: GenerationId) -> u64 {
        let slot = self.slot(id);
        if slot.generation.load(Ordering::Acquire) != id.get() {
            return 0;
        }
        match slot.holders.load(Ordering::Acquire) {
            TOMBSTONE => 0,
            n => n,
        }
    }

    /// Claim generation `id` for removal if nobody holds it.
    ///
    /// Must only be called by the single loader process, for a generation
    /// that is no longer current.
    pub fn try_retire(&self, id: GenerationId) -> Option<RetireToken<'_>> {
        let slot = self.slot(id);
        if slot.generation.load(Ordering::Acquire) != id.get() {
            return Some(RetireToken { slot: None });
        }
        slot.holders
            .compare_exchange(0, TOMBSTONE, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(RetireToken { slot: Some(slot) })
    }

    /// Occupied holder slots as `(generation, holders)`.
    pub fn holder_table(&self) -> Vec<(u64, u64)> {
        self.header()
            .slots
            .iter()
            .filter_map(|slot| {
                let generation = slot.generation.load(Ordering::Acquire);
                (generation != 0).then(|| (generation, slot.holders.load(Ordering::Acquire)))
            })
            .collect()
    }
}

/// One process's claim on a generation; released on drop.
#[derive(Debug)]
pub struct HolderLease {
    region: Arc<SharedRegion>,
    generation: GenerationId,
}

impl HolderLease {
    pub fn generation(&self) -> GenerationId {
        self.generation
    }
}

impl Drop for HolderLease {
    fn drop(&mut self) {
        let slot = self.region.slot(self.generation);
        let previous = slot.holders.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(
            previous != 0 && previous != TOMBSTONE,
            "holder count of generation {} underflowed",
            self.generation
        );
    }
}

/// Exclusive right to remove a retired generation's files.
///
/// Dropping the token frees the holder slot for reuse.
pub struct RetireToken<'a> {
    slot: Option<&'a HolderSlot>,
}

impl Drop for RetireToken<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot {
            // Generation first: attach refuses the tombstone until the slot is empty.
            slot.generation.store(0, Ordering::Release);
            slot.holders.store(0, Ordering::Release);
        }
    }
}
