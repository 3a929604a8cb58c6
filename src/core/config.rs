//! Allocator configuration
//!
//! Settings can be built in code or read from TOML:
//!
//! ```toml
//! target_capacity = 4096
//! record_size = 4096
//!
//! [growth]
//! mode = "auto"
//! step_slots = 64
//! ```
//!
//! Use `mode = "manual"` to have `allocate` report exhaustion instead of
//! growing.

use crate::error::{Result, SlotError};
use crate::growth::GrowthPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default record size in bytes (one 4KB chunk per slot)
pub const DEFAULT_RECORD_SIZE: u64 = 4096;

/// Largest record size whose offsets fit in `u64` for every `u32` slot
pub const MAX_RECORD_SIZE: u64 = u64::MAX / u32::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocatorConfig {
    /// Minimum capacity after load; a larger persisted bitmap is kept whole
    pub target_capacity: u32,

    /// Size of one slot's record in the shard's data region
    pub record_size: u64,

    pub growth: GrowthPolicy,
}

impl AllocatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: AllocatorConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.record_size == 0 {
            return Err(SlotError::Config(
                "record_size must be greater than zero".to_string(),
            ));
        }
        if self.record_size > MAX_RECORD_SIZE {
            return Err(SlotError::Config(format!(
                "record_size {} exceeds maximum {}",
                self.record_size, MAX_RECORD_SIZE
            )));
        }
        self.growth.validate()
    }

    /// Byte offset of `slot`'s record within the shard
    ///
    /// `None` if the offset does not fit in `u64`, which cannot happen once
    /// the config has passed [`validate`](Self::validate).
    pub fn offset_of(&self, slot: u32) -> Option<u64> {
        (slot as u64).checked_mul(self.record_size)
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            target_capacity: 0,
            record_size: DEFAULT_RECORD_SIZE,
            growth: GrowthPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AllocatorConfig::new();
        assert_eq!(config.target_capacity, 0);
        assert_eq!(config.record_size, DEFAULT_RECORD_SIZE);
        assert_eq!(config.growth, GrowthPolicy::Auto { step_slots: 8 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_auto_growth() {
        let config = AllocatorConfig::from_toml_str(
            r#"
            target_capacity = 1024
            record_size = 512

            [growth]
            mode = "auto"
            step_slots = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.target_capacity, 1024);
        assert_eq!(config.record_size, 512);
        assert_eq!(config.growth, GrowthPolicy::Auto { step_slots: 64 });
        assert_eq!(config.offset_of(3), Some(1536));
    }

    #[test]
    fn test_parse_manual_growth() {
        let config = AllocatorConfig::from_toml_str(
            r#"
            [growth]
            mode = "manual"
            "#,
        )
        .unwrap();

        assert_eq!(config.growth, GrowthPolicy::Manual);
        assert_eq!(config.record_size, DEFAULT_RECORD_SIZE);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let result = AllocatorConfig::from_toml_str("record_size = 0");
        assert!(matches!(result, Err(SlotError::Config(_))));

        let result = AllocatorConfig::from_toml_str(
            r#"
            [growth]
            mode = "auto"
            step_slots = 0
            "#,
        );
        assert!(matches!(result, Err(SlotError::Config(_))));
    }

    #[test]
    fn test_record_size_bounded_for_offsets() {
        let config = AllocatorConfig {
            record_size: u64::MAX / 2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SlotError::Config(_))));
        assert_eq!(config.offset_of(3), None);

        let largest = AllocatorConfig {
            record_size: MAX_RECORD_SIZE,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());
        assert_eq!(
            largest.offset_of(u32::MAX),
            Some(u32::MAX as u64 * MAX_RECORD_SIZE)
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result = AllocatorConfig::from_toml_str("slot_count = 10");
        assert!(matches!(result, Err(SlotError::ConfigParse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "target_capacity = 64").unwrap();
        temp.flush().unwrap();

        let config = AllocatorConfig::from_file(temp.path()).unwrap();
        assert_eq!(config.target_capacity, 64);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AllocatorConfig {
            target_capacity: 16,
            record_size: 128,
            growth: GrowthPolicy::Manual,
        };

        let encoded = toml::to_string(&config).unwrap();
        assert_eq!(AllocatorConfig::from_toml_str(&encoded).unwrap(), config);
    }
}
