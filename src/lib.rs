//! # shard-slots - Bitmap Slot Allocator for Fixed-Record Shards
//!
//! A shard stores objects in fixed-size slots; the object in slot `n` lives at
//! byte offset `n * record_size`. This crate decides which slot to hand out
//! next and keeps the free/used state in a one-bit-per-slot bitmap that is
//! persisted verbatim (no header, no checksum) to a [`BackingStore`].
//!
//! - **Lowest hole first**: released slots are reused before capacity grows
//! - **Cheap restarts**: loading reads the bitmap, never the shard data
//! - **Byte-aligned growth**: capacity is always a multiple of 8
//!
//! ## Quick Start
//!
//! ```rust
//! use shard_slots::{MemoryStore, Result, SlotAllocatorBuilder};
//!
//! # fn main() -> Result<()> {
//! let store = MemoryStore::new();
//! let slots = SlotAllocatorBuilder::new().target_capacity(16).load(store)?;
//!
//! let a = slots.allocate()?;
//! let b = slots.allocate()?;
//! slots.release(a)?;
//! assert_eq!(slots.allocate()?, a);
//! assert_ne!(a, b);
//!
//! slots.persist()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! [`SlotAllocator`] serializes every operation on one instance-wide lock and
//! can be shared between threads. [`BitPool`] is the unlocked core; it takes
//! `&mut self` for every mutation and leaves exclusion to its owner.

pub mod core;

#[allow(unused_imports)]
pub(crate) use crate::core::{bitmap, config, error, growth, store};

pub use crate::core::{
    bitmap::{BitPool, PoolStats, SlotIndex},
    config::{AllocatorConfig, DEFAULT_RECORD_SIZE, MAX_RECORD_SIZE},
    error::{Result, SlotError},
    growth::GrowthPolicy,
    store::{BackingStore, MemoryStore},
};

use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

struct Inner<S> {
    pool: BitPool,
    store: S,
}

/// Thread-safe slot allocator bound to its backing store
///
/// Every operation, including `persist`, holds one lock for its whole
/// duration. `persist` blocks until the store's durable flush returns.
///
/// # Examples
///
/// ```rust
/// use shard_slots::{GrowthPolicy, MemoryStore, SlotAllocatorBuilder, SlotError};
///
/// # fn main() -> shard_slots::Result<()> {
/// let slots = SlotAllocatorBuilder::new()
///     .target_capacity(8)
///     .growth(GrowthPolicy::Manual)
///     .load(MemoryStore::new())?;
///
/// for _ in 0..8 {
///     slots.allocate()?;
/// }
/// assert!(matches!(slots.allocate(), Err(SlotError::Exhausted { .. })));
///
/// slots.grow(8)?;
/// assert_eq!(slots.allocate()?, 8);
/// # Ok(())
/// # }
/// ```
pub struct SlotAllocator<S: BackingStore> {
    inner: Mutex<Inner<S>>,
    config: AllocatorConfig,
}

impl<S: BackingStore> SlotAllocator<S> {
    /// Read the bitmap from `store`, padding to `config.target_capacity`
    pub fn load(mut store: S, config: AllocatorConfig) -> Result<Self> {
        config.validate()?;
        let pool = BitPool::load_from(&mut store, config.target_capacity, config.growth)?;

        Ok(SlotAllocator {
            inner: Mutex::new(Inner { pool, store }),
            config,
        })
    }

    /// Re-read the bitmap from the store
    ///
    /// The in-memory pool is replaced only if the read succeeds.
    pub fn reload(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let pool = BitPool::load_from(
            &mut inner.store,
            self.config.target_capacity,
            self.config.growth,
        )?;
        inner.pool = pool;

        info!("Reloaded slot bitmap ({} slots)", inner.pool.capacity());
        Ok(())
    }

    /// Claim the lowest free slot
    pub fn allocate(&self) -> Result<SlotIndex> {
        self.inner.lock().pool.allocate()
    }

    /// Return a slot to the free pool
    pub fn release(&self, slot: SlotIndex) -> Result<()> {
        self.inner.lock().pool.release(slot)
    }

    /// Mark a slot used without moving the head cursor
    pub fn mark_used(&self, slot: SlotIndex) -> Result<()> {
        self.inner.lock().pool.mark_used(slot)
    }

    /// Replay provisional claims and rescan for the lowest free slot
    pub fn recover(&self, claims: &[SlotIndex]) -> Result<()> {
        self.inner.lock().pool.recover(claims)
    }

    /// Add `by_slots` free slots (rounded up to a multiple of 8)
    ///
    /// Returns the new capacity.
    pub fn grow(&self, by_slots: u32) -> Result<u32> {
        self.inner.lock().pool.grow(by_slots)
    }

    /// Overwrite the store with the current bitmap and flush it
    pub fn persist(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let Inner { pool, store } = &mut *guard;
        pool.persist(store)
    }

    /// Slot the next `allocate` would return, without claiming it
    pub fn next_free(&self) -> Option<SlotIndex> {
        self.inner.lock().pool.next_free()
    }

    pub fn is_free(&self, slot: SlotIndex) -> bool {
        self.inner.lock().pool.is_free(slot)
    }

    pub fn is_used(&self, slot: SlotIndex) -> bool {
        self.inner.lock().pool.is_used(slot)
    }

    pub fn capacity(&self) -> u32 {
        self.inner.lock().pool.capacity()
    }

    pub fn head(&self) -> SlotIndex {
        self.inner.lock().pool.head()
    }

    pub fn free_count(&self) -> u32 {
        self.inner.lock().pool.free_count()
    }

    pub fn used_count(&self) -> u32 {
        self.inner.lock().pool.used_count()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.lock().pool.stats()
    }

    /// Copy of the in-memory bitmap bytes
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().pool.as_bytes().to_vec()
    }

    /// Byte offset of `slot`'s record within the shard's data region
    pub fn offset_of(&self, slot: SlotIndex) -> u64 {
        // load() validated record_size <= MAX_RECORD_SIZE, so this fits
        slot as u64 * self.config.record_size
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Persist, then hand back the pool and the store
    ///
    /// If persisting fails the allocator is returned with the error, still
    /// holding the only up-to-date bitmap, so the caller can retry.
    pub fn close(self) -> std::result::Result<(BitPool, S), (Self, SlotError)> {
        if let Err(e) = self.persist() {
            warn!("Failed to persist slot bitmap on close: {}", e);
            return Err((self, e));
        }
        let Inner { pool, store } = self.inner.into_inner();

        debug!("Closed slot allocator ({} slots)", pool.capacity());
        Ok((pool, store))
    }
}

impl<S: BackingStore> fmt::Debug for SlotAllocator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAllocator")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SlotAllocator<File> {
    /// Open (or create) a bitmap file and load it
    pub fn open<P: AsRef<Path>>(path: P, config: AllocatorConfig) -> Result<Self> {
        let file = crate::core::store::open_file(&path)?;
        debug!("Opened slot bitmap file: {:?}", path.as_ref());
        Self::load(file, config)
    }
}

/// Builder for [`SlotAllocator`]
///
/// # Examples
///
/// ```rust
/// use shard_slots::{GrowthPolicy, MemoryStore, SlotAllocatorBuilder};
///
/// # fn main() -> shard_slots::Result<()> {
/// let slots = SlotAllocatorBuilder::new()
///     .target_capacity(1024)
///     .record_size(256)
///     .growth(GrowthPolicy::Auto { step_slots: 64 })
///     .load(MemoryStore::new())?;
///
/// assert_eq!(slots.capacity(), 1024);
/// assert_eq!(slots.offset_of(2), 512);
/// # Ok(())
/// # }
/// ```
pub struct SlotAllocatorBuilder {
    config: AllocatorConfig,
}

impl SlotAllocatorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        SlotAllocatorBuilder {
            config: AllocatorConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: AllocatorConfig) -> Self {
        SlotAllocatorBuilder { config }
    }

    /// Minimum capacity after load
    pub fn target_capacity(mut self, slots: u32) -> Self {
        self.config.target_capacity = slots;
        self
    }

    /// Size of one record in the shard's data region
    pub fn record_size(mut self, bytes: u64) -> Self {
        self.config.record_size = bytes;
        self
    }

    pub fn growth(mut self, growth: GrowthPolicy) -> Self {
        self.config.growth = growth;
        self
    }

    /// Report exhaustion from `allocate` instead of growing
    pub fn manual_growth(self) -> Self {
        self.growth(GrowthPolicy::Manual)
    }

    /// Load the allocator from `store`
    pub fn load<S: BackingStore>(self, store: S) -> Result<SlotAllocator<S>> {
        SlotAllocator::load(store, self.config)
    }

    /// Open (or create) a bitmap file and load the allocator from it
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<SlotAllocator<File>> {
        SlotAllocator::open(path, self.config)
    }
}

impl Default for SlotAllocatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
