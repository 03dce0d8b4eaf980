//! Mount configuration.
//!
//! Tunables for the adapter's caches and remote I/O. Defaults assume a
//! network backend: short metadata TTLs bound staleness after concurrent
//! external mutation, while the I/O timeout is the only escape from an
//! unresponsive remote.

use std::path::PathBuf;
use std::time::Duration;

/// Default TTL for cached file attributes.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(2);

/// Default TTL for cached directory listings.
pub const DEFAULT_DIR_TTL: Duration = Duration::from_secs(2);

/// Default client-side timeout for remote calls.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration options for a MoonFS mount.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Time-to-live for cached file records (attributes + content id).
    pub attr_ttl: Duration,

    /// Time-to-live for cached directory listings.
    pub dir_ttl: Duration,

    /// Timeout for individual remote calls. Operations block for at most
    /// this long before failing with a transport error.
    pub io_timeout: Duration,

    /// Directory holding the on-disk decrypted-chunk cache.
    pub chunk_cache_dir: PathBuf,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_ATTR_TTL,
            dir_ttl: DEFAULT_DIR_TTL,
            io_timeout: DEFAULT_IO_TIMEOUT,
            chunk_cache_dir: default_chunk_cache_dir(),
        }
    }
}

impl MountConfig {
    /// Sets the TTL for cached file records.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the TTL for cached directory listings.
    #[must_use]
    pub fn dir_ttl(mut self, ttl: Duration) -> Self {
        self.dir_ttl = ttl;
        self
    }

    /// Sets the timeout for individual remote calls.
    #[must_use]
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the chunk cache directory.
    #[must_use]
    pub fn chunk_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chunk_cache_dir = dir.into();
        self
    }
}

/// Platform cache directory for decrypted chunks, falling back to the
/// system temp directory when the platform reports none.
fn default_chunk_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("moonfs")
        .join("chunks")
}
