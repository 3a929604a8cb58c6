//! Capacity growth for the slot bitmap
//!
//! Capacity only ever grows in whole bytes of bitmap, so every growth step is
//! rounded up to a multiple of 8 slots. Whether `allocate` grows on its own or
//! hands [`SlotError::Exhausted`](crate::error::SlotError::Exhausted) back to
//! the caller is decided by [`GrowthPolicy`].

use crate::error::{Result, SlotError};
use serde::{Deserialize, Serialize};

/// Slots tracked by one bitmap byte
pub const SLOTS_PER_BYTE: u32 = 8;

/// Default auto-growth step: one bitmap byte
pub const DEFAULT_GROWTH_STEP: u32 = SLOTS_PER_BYTE;

/// What `allocate` does when every slot is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum GrowthPolicy {
    /// Return `Exhausted`; the caller must `grow` before retrying
    Manual,

    /// Grow by `step_slots` (rounded up to a multiple of 8) and allocate
    /// the first new slot
    Auto { step_slots: u32 },
}

impl GrowthPolicy {
    /// Auto-growth by one bitmap byte at a time
    pub fn auto() -> Self {
        GrowthPolicy::Auto {
            step_slots: DEFAULT_GROWTH_STEP,
        }
    }

    /// Slots added per automatic growth step, if auto-growth is enabled
    pub fn step(&self) -> Option<u32> {
        match self {
            GrowthPolicy::Manual => None,
            GrowthPolicy::Auto { step_slots } => Some(*step_slots),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let GrowthPolicy::Auto { step_slots: 0 } = self {
            return Err(SlotError::Config(
                "auto growth step_slots must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self::auto()
    }
}

/// Number of bitmap bytes needed to track `slots` slots
pub fn bytes_for_slots(slots: u64) -> u64 {
    (slots + SLOTS_PER_BYTE as u64 - 1) / SLOTS_PER_BYTE as u64
}

/// Round a slot count up to the next whole byte of bitmap
pub fn round_up_slots(slots: u64) -> u64 {
    bytes_for_slots(slots) * SLOTS_PER_BYTE as u64
}

/// Capacity after adding `by_slots` to `capacity`, checked against `u32`
pub fn grown_capacity(capacity: u32, by_slots: u64) -> Result<u32> {
    let requested = capacity as u64 + round_up_slots(by_slots);
    u32::try_from(requested).map_err(|_| SlotError::CapacityOverflow { requested })
}
