//! Slot allocation core
//!
//! - [`error`] - Error types for slot operations
//! - [`growth`] - Byte-aligned capacity growth and the auto/manual policy
//! - [`bitmap`] - The free/used bitmap and head cursor ([`bitmap::BitPool`])
//! - [`store`] - Durable storage for the persisted bitmap
//! - [`config`] - Allocator settings, loadable from TOML

pub mod bitmap;
pub mod config;
pub mod error;
pub mod growth;
pub mod store;
