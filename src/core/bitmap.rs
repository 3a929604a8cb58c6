//! Bitmap slot pool
//!
//! One bit per slot, grouped into bytes: bit `k` of byte `i` tracks slot
//! `i * 8 + k`.
//! - 1 = free slot
//! - 0 = used slot
//!
//! `head` is a lower bound on the lowest free slot: every slot below it is
//! used. Allocation scans forward from `head`; release may move it back.

use crate::error::{Result, SlotError};
use crate::growth::{self, GrowthPolicy, SLOTS_PER_BYTE};
use crate::store::BackingStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Zero-based index of a fixed-size record within a shard
pub type SlotIndex = u32;

/// Point-in-time view of a pool's occupancy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub capacity: u32,
    pub free_slots: u32,
    pub used_slots: u32,
    pub head: u32,
    pub fragmentation: f64,
}

/// Free/used bitmap with a head cursor
///
/// `BitPool` does no locking of its own: mutation goes through `&mut self`,
/// so callers that share one across threads wrap it, as
/// [`SlotAllocator`](crate::SlotAllocator) does.
#[derive(Debug, Clone)]
pub struct BitPool {
    /// Bitmap bytes (each byte = 8 slots)
    bitmap: Vec<u8>,

    /// Every slot below `head` is used
    head: SlotIndex,

    /// Number of free slots below capacity
    free_slots: u32,

    growth: GrowthPolicy,
}

impl BitPool {
    /// Create an empty pool (capacity 0)
    pub fn new(growth: GrowthPolicy) -> Self {
        BitPool {
            bitmap: Vec::new(),
            head: 0,
            free_slots: 0,
            growth,
        }
    }

    /// Build a pool from persisted bitmap bytes
    ///
    /// Pads with free bytes until capacity reaches `target_capacity`. A
    /// bitmap already larger than the target is kept whole.
    pub fn load(bytes: Vec<u8>, target_capacity: u32, growth: GrowthPolicy) -> Result<Self> {
        let loaded = bytes.len() as u64 * SLOTS_PER_BYTE as u64;
        let target = growth::round_up_slots(target_capacity as u64);
        let capacity = loaded.max(target);
        if capacity > u32::MAX as u64 {
            return Err(SlotError::CapacityOverflow {
                requested: capacity,
            });
        }

        let mut bitmap = bytes;
        bitmap.resize((capacity / SLOTS_PER_BYTE as u64) as usize, 0xFF);

        let free_slots = bitmap.iter().map(|byte| byte.count_ones()).sum();
        let mut pool = BitPool {
            bitmap,
            head: 0,
            free_slots,
            growth,
        };
        pool.rescan();

        info!(
            "Loaded slot bitmap: {} slots ({} from store), {} free, head {}",
            pool.capacity(),
            loaded,
            pool.free_slots,
            pool.head
        );
        Ok(pool)
    }

    /// Read the whole bitmap from `store` and build a pool from it
    pub fn load_from<S: BackingStore>(
        store: &mut S,
        target_capacity: u32,
        growth: GrowthPolicy,
    ) -> Result<Self> {
        let bytes = store.read_all()?;
        Self::load(bytes, target_capacity, growth)
    }

    /// Claim the lowest free slot at or above `head`
    ///
    /// When the pool is full this grows under [`GrowthPolicy::Auto`] and
    /// returns [`SlotError::Exhausted`] under [`GrowthPolicy::Manual`]. If
    /// auto-growth would push capacity past `u32::MAX` slots it returns
    /// [`SlotError::CapacityOverflow`] and the pool is left unchanged.
    pub fn allocate(&mut self) -> Result<SlotIndex> {
        let mut slot = self.scan_from(self.head);

        if slot == self.capacity() {
            let step = self.growth.step().ok_or(SlotError::Exhausted {
                capacity: self.capacity(),
            })?;
            info!(
                "Slot pool exhausted at {} slots, growing by {}",
                self.capacity(),
                step
            );
            slot = self.capacity();
            if self.grow(step)? == slot {
                return Err(SlotError::Exhausted { capacity: slot });
            }
        }

        self.clear_bit(slot);
        self.free_slots -= 1;
        self.head = self.scan_from(slot + 1);

        debug!("Allocated slot {} (head {})", slot, self.head);
        Ok(slot)
    }

    /// Return a slot to the free pool
    ///
    /// A released slot below `head` becomes the next allocation. Releasing a
    /// slot that is already free changes nothing in the bitmap.
    pub fn release(&mut self, slot: SlotIndex) -> Result<()> {
        self.check_slot(slot)?;

        if self.bit(slot) {
            warn!("Double release detected for slot {}", slot);
        } else {
            self.set_bit(slot);
            self.free_slots += 1;
        }

        if slot < self.head {
            self.head = slot;
        }

        debug!("Released slot {} (head {})", slot, self.head);
        Ok(())
    }

    /// Mark a slot used without moving `head`
    ///
    /// Used to replay provisional claims during recovery; follow with
    /// [`rescan`](Self::rescan).
    pub fn mark_used(&mut self, slot: SlotIndex) -> Result<()> {
        self.check_slot(slot)?;

        if self.bit(slot) {
            self.clear_bit(slot);
            self.free_slots -= 1;
        }
        Ok(())
    }

    /// Replay provisional claims, then re-establish `head`
    ///
    /// Every claim is range-checked before any bit changes.
    pub fn recover(&mut self, claims: &[SlotIndex]) -> Result<()> {
        for &slot in claims {
            self.check_slot(slot)?;
        }
        for &slot in claims {
            self.mark_used(slot)?;
        }
        self.rescan();

        info!(
            "Replayed {} provisional claims, head now {}",
            claims.len(),
            self.head
        );
        Ok(())
    }

    /// Full forward scan from slot 0 to reset `head`
    pub fn rescan(&mut self) {
        self.head = self.scan_from(0);
    }

    /// Append `by_slots` free slots, rounded up to a whole byte
    ///
    /// Returns the new capacity.
    pub fn grow(&mut self, by_slots: u32) -> Result<u32> {
        let new_capacity = growth::grown_capacity(self.capacity(), by_slots as u64)?;
        let added = new_capacity - self.capacity();
        if added == 0 {
            return Ok(new_capacity);
        }

        let new_len = (new_capacity / SLOTS_PER_BYTE) as usize;
        self.bitmap.resize(new_len, 0xFF);
        self.free_slots += added;

        info!("Grew slot pool by {} slots to {}", added, new_capacity);
        Ok(new_capacity)
    }

    /// Overwrite `store` with the bitmap: truncate, rewind, write, sync
    ///
    /// No rollback: a failure part way leaves the store in whatever state
    /// the failed step produced.
    pub fn persist<S: BackingStore>(&self, store: &mut S) -> Result<()> {
        store.truncate()?;
        store.rewind()?;
        store.write_all(&self.bitmap)?;
        store.sync()?;

        debug!(
            "Persisted slot bitmap: {} bytes, {} free slots",
            self.bitmap.len(),
            self.free_slots
        );
        Ok(())
    }

    /// Slot the next `allocate` would return, if one is free
    pub fn next_free(&self) -> Option<SlotIndex> {
        let slot = self.scan_from(self.head);
        (slot < self.capacity()).then_some(slot)
    }

    /// Check if a slot is free (out-of-range slots are never free)
    pub fn is_free(&self, slot: SlotIndex) -> bool {
        slot < self.capacity() && self.bit(slot)
    }

    /// Check if a slot is in use (out-of-range slots are never used)
    pub fn is_used(&self, slot: SlotIndex) -> bool {
        slot < self.capacity() && !self.bit(slot)
    }

    /// Total slots tracked (always a multiple of 8)
    pub fn capacity(&self) -> u32 {
        (self.bitmap.len() as u32) * SLOTS_PER_BYTE
    }

    /// Lower bound on the lowest free slot
    pub fn head(&self) -> SlotIndex {
        self.head
    }

    /// Get number of free slots available
    pub fn free_count(&self) -> u32 {
        self.free_slots
    }

    /// Get number of slots in use
    pub fn used_count(&self) -> u32 {
        self.capacity() - self.free_slots
    }

    /// Current growth policy
    pub fn growth(&self) -> GrowthPolicy {
        self.growth
    }

    /// Change what `allocate` does when the pool is full
    pub fn set_growth(&mut self, growth: GrowthPolicy) {
        self.growth = growth;
    }

    /// Raw bitmap bytes, exactly as they are persisted
    pub fn as_bytes(&self) -> &[u8] {
        &self.bitmap
    }

    /// Used/free transitions per slot (0.0 = contiguous, higher = scattered)
    pub fn fragmentation_score(&self) -> f64 {
        if self.bitmap.is_empty() {
            return 0.0;
        }

        let mut transitions = 0usize;
        let mut prev_used = false;

        for &byte in &self.bitmap {
            for bit_idx in 0..SLOTS_PER_BYTE {
                let is_used = (byte & (1u8 << bit_idx)) == 0;
                if is_used != prev_used {
                    transitions += 1;
                }
                prev_used = is_used;
            }
        }

        (transitions as f64) / (self.capacity() as f64)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            free_slots: self.free_slots,
            used_slots: self.used_count(),
            head: self.head,
            fragmentation: self.fragmentation_score(),
        }
    }

    /// First free slot at or after `start`, or capacity if there is none
    ///
    /// Bytes with no free bit are skipped whole.
    fn scan_from(&self, start: SlotIndex) -> SlotIndex {
        let capacity = self.capacity();
        let mut byte_idx = (start / SLOTS_PER_BYTE) as usize;
        let mut mask = 0xFFu8 << (start % SLOTS_PER_BYTE);

        while byte_idx < self.bitmap.len() {
            let candidates = self.bitmap[byte_idx] & mask;
            if candidates != 0 {
                return byte_idx as u32 * SLOTS_PER_BYTE + candidates.trailing_zeros();
            }
            byte_idx += 1;
            mask = 0xFF;
        }

        capacity
    }

    fn check_slot(&self, slot: SlotIndex) -> Result<()> {
        if slot >= self.capacity() {
            return Err(SlotError::InvalidSlot {
                slot,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    fn bit(&self, slot: SlotIndex) -> bool {
        self.bitmap[(slot / SLOTS_PER_BYTE) as usize] & (1u8 << (slot % SLOTS_PER_BYTE)) != 0
    }

    fn set_bit(&mut self, slot: SlotIndex) {
        self.bitmap[(slot / SLOTS_PER_BYTE) as usize] |= 1u8 << (slot % SLOTS_PER_BYTE);
    }

    fn clear_bit(&mut self, slot: SlotIndex) {
        self.bitmap[(slot / SLOTS_PER_BYTE) as usize] &= !(1u8 << (slot % SLOTS_PER_BYTE));
    }
}

impl Default for BitPool {
    fn default() -> Self {
        Self::new(GrowthPolicy::default())
    }
}
