//! Caching layers.
//!
//! Two caches with different lifetimes: [`ExpiringCache`] holds metadata in
//! memory under a TTL, and [`ChunkStore`] persists decrypted content ranges
//! on disk with no expiry at all (chunks are immutable because content ids
//! are). Both are safe for concurrent use from filesystem callbacks.

mod chunks;
mod expiring;

pub use chunks::{ChunkKey, ChunkStore, ChunkStoreError};
pub use expiring::{CacheMiss, ExpiringCache};
