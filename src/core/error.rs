use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Slot pool exhausted: all {capacity} slots are in use")]
    Exhausted { capacity: u32 },

    #[error("Invalid slot: {slot} (capacity {capacity})")]
    InvalidSlot { slot: u32, capacity: u32 },

    #[error("Capacity overflow: cannot track {requested} slots")]
    CapacityOverflow { requested: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SlotError>;
