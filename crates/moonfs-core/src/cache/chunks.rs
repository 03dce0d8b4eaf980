//! On-disk cache of decrypted content ranges.
//!
//! Layout: one directory per content id, one file per range, named
//! `{offset}-{len}`. Content ids are immutable, so entries never need
//! invalidation; the same `(content id, offset, len)` key always refers to
//! the same bytes. Anything unreadable or of unexpected size is treated as
//! a miss, never as an error surfaced to the reader.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::fs::ContentId;

/// Identifies one decrypted range of one immutable object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub content_id: ContentId,
    pub offset: u64,
    pub len: usize,
}

impl ChunkKey {
    pub fn new(content_id: ContentId, offset: u64, len: usize) -> Self {
        Self {
            content_id,
            offset,
            len,
        }
    }
}

/// Write-side failures. Read-side problems never produce one of these.
#[derive(Debug, Error)]
pub enum ChunkStoreError {
    #[error("failed to create chunk cache directory {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write chunk {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Filesystem-backed chunk cache.
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ChunkStoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| ChunkStoreError::CreateDir {
            dir: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    fn chunk_path(&self, key: &ChunkKey) -> PathBuf {
        self.root
            .join(key.content_id.as_str())
            .join(format!("{}-{}", key.offset, key.len))
    }

    /// True if a plausible entry exists on disk for this key.
    pub fn exists(&self, key: &ChunkKey) -> bool {
        self.chunk_path(key).is_file()
    }

    /// Read a cached chunk. `None` on absence, unreadability, or a size
    /// that disagrees with the key (a torn or corrupted write).
    pub fn get(&self, key: &ChunkKey) -> Option<Vec<u8>> {
        let path = self.chunk_path(key);
        match fs::read(&path) {
            Ok(bytes) if bytes.len() == key.len => Some(bytes),
            Ok(bytes) => {
                warn!(
                    path = %path.display(),
                    expected = key.len,
                    actual = bytes.len(),
                    "chunk size mismatch, discarding cache entry"
                );
                let _ = fs::remove_file(&path);
                None
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "chunk unreadable, treating as miss");
                None
            }
        }
    }

    /// Persist a decrypted chunk. The key's length must match the data.
    pub fn put(&self, key: &ChunkKey, data: &[u8]) -> Result<(), ChunkStoreError> {
        debug_assert_eq!(key.len, data.len());
        let path = self.chunk_path(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ChunkStoreError::CreateDir {
                dir: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, data).map_err(|source| ChunkStoreError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), len = data.len(), "cached chunk");
        Ok(())
    }

    /// Remove every cached chunk, keeping the root directory.
    pub fn clear(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
