//! Per-user reward aggregates and their two-tier cache.

pub mod cache;
pub mod store;

pub use cache::{CacheTtls, StatsCache, UserRewardStats};
pub use store::{CacheStore, MemoryCacheStore};
