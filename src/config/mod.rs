//! Store configuration types

mod types;

pub use types::{ConnectionMode, MemoryStoreConfig, RedisStoreConfig, SlidingReset};
