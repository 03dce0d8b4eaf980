//! The file-operation dispatcher.
//!
//! [`FilesystemAdapter`] receives the standard file-operation contract from
//! its host and orchestrates the caches, the cipher, the write sessions and
//! the two remote collaborators. Every operation runs synchronously on the
//! calling thread; the client-side transport timeout is the only bound on
//! how long a call can block. Remote failures are translated once, at the
//! call boundary, and never retried here.

use dashmap::DashSet;
use tracing::{debug, warn};

use crate::cache::{ChunkKey, ChunkStore, ExpiringCache};
use crate::config::MountConfig;
use crate::crypto::{SeekableCipher, IV_LEN};
use crate::error::{FsError, FsResult};
use crate::fs::path::{self, VirtualPath};
use crate::fs::session::WriteSessions;
use crate::fs::table::FileTable;
use crate::fs::{ContentId, DirectoryListing, FileRecord, Stat};
use crate::remote::{ContentStore, MetadataRegistry, RemoteError, TransportError};

/// Cached virtual filesystem over a metadata registry and a content store.
pub struct FilesystemAdapter<R, C> {
    registry: R,
    content: C,
    cipher: SeekableCipher,
    files: FileTable,
    dirs: ExpiringCache<String, Vec<String>>,
    chunks: ChunkStore,
    sessions: WriteSessions,
    open_files: DashSet<String>,
}

impl<R: MetadataRegistry, C: ContentStore> FilesystemAdapter<R, C> {
    pub fn new(
        registry: R,
        content: C,
        cipher: SeekableCipher,
        config: &MountConfig,
    ) -> FsResult<Self> {
        let chunks = ChunkStore::open(&config.chunk_cache_dir)?;
        Ok(Self {
            registry,
            content,
            cipher,
            files: FileTable::new(config.attr_ttl),
            dirs: ExpiringCache::new(config.dir_ttl),
            chunks,
            sessions: WriteSessions::new(),
            open_files: DashSet::new(),
        })
    }

    /// Attributes for a path. The root is synthetic; other paths are served
    /// from the file table within its TTL, then from the registry.
    pub fn getattr(&self, path: &str) -> FsResult<Stat> {
        let path = path::normalize(path)?;
        if matches!(path::classify(&path), VirtualPath::Root) {
            return Ok(Stat::directory());
        }

        if let Some(record) = self.files.lookup(&path) {
            return Ok(record.attributes);
        }

        // A buffering path may have no fresh record (the TTL elapsed
        // mid-session); its size is the buffer's, not the remote's.
        if let Some(len) = self.sessions.buffered_len(&path) {
            let stat = Stat::file(len);
            self.files
                .insert(FileRecord::new(&path, stat.clone(), None));
            return Ok(stat);
        }

        let attr = self
            .registry
            .lookup_attributes(&path)
            .map_err(|e| FsError::from_remote(&path, e))?;
        self.files.insert(FileRecord::new(
            &path,
            attr.stat.clone(),
            attr.content_id,
        ));
        Ok(attr.stat)
    }

    /// Validate that a path can be listed.
    pub fn opendir(&self, path: &str) -> FsResult<()> {
        let normalized = path::normalize(path)?;
        if matches!(path::classify(&normalized), VirtualPath::Root) {
            return Ok(());
        }
        let stat = self.getattr(&normalized)?;
        if stat.is_dir() {
            Ok(())
        } else {
            Err(FsError::NotADirectory { path: normalized })
        }
    }

    /// Directory entries, always led by `.` and `..`. Served from the
    /// short-TTL listing cache, re-fetched from the registry on miss.
    pub fn readdir(&self, path: &str) -> FsResult<DirectoryListing> {
        let path = path::normalize(path)?;

        if self.dirs.contains(&path) {
            if let Ok(children) = self.dirs.get(&path) {
                return Ok(DirectoryListing::new(children));
            }
        }

        if let Some(record) = self.files.lookup(&path) {
            if !record.attributes.is_dir() {
                return Err(FsError::NotADirectory { path });
            }
        }

        let children = self
            .registry
            .list_children(&path)
            .map_err(|e| FsError::from_remote(&path, e))?;
        self.dirs.set(path, children.clone());
        Ok(DirectoryListing::new(children))
    }

    /// Validate existence and grant read access. Reading a path that was
    /// never opened fails with an invalid-state error.
    pub fn open(&self, path: &str) -> FsResult<()> {
        let path = path::normalize(path)?;
        match path::classify(&path) {
            VirtualPath::Root | VirtualPath::Role(_) => {
                return Err(FsError::IsDirectory { path });
            }
            VirtualPath::Entry { .. } => {}
        }

        // A freshly created file exists locally before the remote hears
        // about it.
        if self.sessions.is_buffering(&path) {
            self.open_files.insert(path);
            return Ok(());
        }

        let exists = self
            .registry
            .exists(&path)
            .map_err(|e| FsError::from_remote(&path, e))?;
        if exists {
            self.open_files.insert(path);
            Ok(())
        } else {
            Err(FsError::NotFound { path })
        }
    }

    /// Read up to `size` bytes at `offset`.
    ///
    /// Order of precedence: the pending write buffer (uncommitted local
    /// truth), then the chunk cache, then a remote fetch + decrypt. The
    /// result is clamped to the file's reported size.
    pub fn read(&self, path: &str, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        let path = path::normalize(path)?;
        if !self.open_files.contains(&path) {
            return Err(FsError::InvalidState {
                path,
                operation: "read",
                required: "open",
            });
        }

        if let Some(bytes) = self.sessions.read(&path, offset, size) {
            return Ok(bytes);
        }

        let record = self.record_for(&path)?;
        if record.attributes.is_dir() {
            return Err(FsError::IsDirectory { path });
        }
        let Some(content_id) = record.content_id else {
            // Known file with no committed object yet: nothing to read.
            return Ok(Vec::new());
        };

        if offset >= record.attributes.size {
            return Ok(Vec::new());
        }
        #[allow(clippy::cast_possible_truncation)]
        let len = size.min((record.attributes.size - offset) as usize);
        if len == 0 {
            return Ok(Vec::new());
        }

        let key = ChunkKey::new(content_id.clone(), offset, len);
        if let Some(cached) = self.chunks.get(&key) {
            debug!(path = %path, offset, len, "read served from chunk cache");
            return Ok(cached);
        }

        let plaintext = self.fetch_and_decrypt(&path, &content_id, offset, len)?;
        if let Err(e) = self.chunks.put(&key, &plaintext) {
            // A failed cache write costs a refetch later, nothing more.
            warn!(path = %path, error = %e, "failed to cache chunk");
        }
        Ok(plaintext)
    }

    /// Install a zero-size record and open a write session.
    pub fn create(&self, path: &str) -> FsResult<()> {
        let path = path::normalize(path)?;
        match path::classify(&path) {
            VirtualPath::Root | VirtualPath::Role(_) => {
                return Err(FsError::IsDirectory { path });
            }
            VirtualPath::Entry { .. } => {}
        }
        self.sessions.begin(&path);
        self.files
            .insert(FileRecord::new(&path, Stat::file(0), None));
        self.open_files.insert(path);
        Ok(())
    }

    /// Buffer `data` at `offset`. No remote I/O; the record's size tracks
    /// the buffer so concurrent `getattr` sees uncommitted growth.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
        let path = path::normalize(path)?;
        let (written, len) = self.sessions.write(&path, offset, data);
        if self.files.peek(&path).is_some() {
            self.files.update_size(&path, len);
        } else {
            self.files
                .insert(FileRecord::new(&path, Stat::file(len), None));
        }
        Ok(written)
    }

    /// Resize the pending buffer, allocating a session if none is open.
    pub fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let path = path::normalize(path)?;
        let len = self.sessions.truncate(&path, size);
        if self.files.peek(&path).is_some() {
            self.files.update_size(&path, len);
        } else {
            self.files
                .insert(FileRecord::new(&path, Stat::file(len), None));
        }
        Ok(())
    }

    /// Commit any pending write session for the path.
    pub fn flush(&self, path: &str) -> FsResult<()> {
        let path = path::normalize(path)?;
        self.commit(&path)
    }

    /// Commit any pending write session, then drop read access.
    pub fn release(&self, path: &str) -> FsResult<()> {
        let path = path::normalize(path)?;
        let result = self.commit(&path);
        self.open_files.remove(&path);
        result
    }

    /// Delete a path from the remote namespace and every local cache.
    pub fn unlink(&self, path: &str) -> FsResult<()> {
        let path = path::normalize(path)?;
        // The path must be currently known; an unknown path is confirmed
        // against the registry first so a bogus delete never goes out.
        if self.files.lookup(&path).is_none() {
            self.registry
                .lookup_attributes(&path)
                .map_err(|e| FsError::from_remote(&path, e))?;
        }

        self.registry
            .delete(&path)
            .map_err(|e| FsError::from_remote(&path, e))?;

        self.files.remove(&path);
        self.sessions.discard(&path);
        self.open_files.remove(&path);
        self.invalidate_parent_listing(&path);
        Ok(())
    }

    /// Rebind `old` to `new`, committing any pending write on `old` first
    /// so in-flight edits are not lost under the old name.
    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let old = path::normalize(old)?;
        let new = path::normalize(new)?;

        if self.sessions.is_buffering(&old) {
            self.commit(&old)?;
        } else if self.files.lookup(&old).is_none() {
            self.registry
                .lookup_attributes(&old)
                .map_err(|e| FsError::from_remote(&old, e))?;
        }

        self.registry
            .rename(&old, &new)
            .map_err(|e| FsError::from_remote(&old, e))?;

        // Both names re-fetch fresh state on next lookup.
        self.files.remove(&old);
        self.files.remove(&new);
        self.open_files.remove(&old);
        self.invalidate_parent_listing(&old);
        self.invalidate_parent_listing(&new);
        Ok(())
    }

    /// Most recent locally known record for a path, regardless of TTL.
    /// Used by hosts for cheap entry-kind decisions during listing.
    pub fn cached_record(&self, path: &str) -> Option<FileRecord> {
        let path = path::normalize(path).ok()?;
        self.files.peek(&path)
    }

    /// Drop every cached chunk on disk.
    pub fn clear_chunk_cache(&self) -> std::io::Result<()> {
        self.chunks.clear()
    }

    /// Encrypt and upload the pending buffer under the path's commit lock.
    ///
    /// On failure the buffer is reinstated so the caller can retry with
    /// another `release`; on success the session returns to absent and the
    /// record carries the new content id.
    fn commit(&self, path: &str) -> FsResult<()> {
        if !self.sessions.is_buffering(path) {
            return Ok(());
        }
        let lock = self.sessions.commit_lock(path);
        let _guard = lock.lock();

        // Another release may have won the race and committed already.
        let Some(buffer) = self.sessions.take(path) else {
            return Ok(());
        };
        if !buffer.is_dirty() {
            return Ok(());
        }

        let envelope = self.cipher.encrypt_stream(buffer.content());
        let payload_len = buffer.len();
        match self.content.store(path, &envelope.into_bytes()) {
            Ok(content_id) => {
                debug!(path = %path, len = payload_len, cid = %content_id, "committed write session");
                if self.files.peek(path).is_some() {
                    self.files.set_content_id(path, content_id);
                    self.files.update_size(path, payload_len);
                } else {
                    self.files.insert(FileRecord::new(
                        path,
                        Stat::file(payload_len),
                        Some(content_id),
                    ));
                }
                self.invalidate_parent_listing(path);
                Ok(())
            }
            Err(e) => {
                self.sessions.restore(path, buffer);
                let source = match e {
                    RemoteError::Transport(t) => t,
                    RemoteError::NotFound => TransportError::Status {
                        status: 404,
                        endpoint: "upload".into(),
                    },
                };
                warn!(path = %path, error = %source, "write session commit failed, buffer preserved");
                Err(FsError::UploadFailure {
                    path: path.to_string(),
                    source,
                })
            }
        }
    }

    /// Fresh record for a path, from the table or the registry.
    fn record_for(&self, path: &str) -> FsResult<FileRecord> {
        if let Some(record) = self.files.lookup(path) {
            return Ok(record);
        }
        let attr = self
            .registry
            .lookup_attributes(path)
            .map_err(|e| FsError::from_remote(path, e))?;
        let record = FileRecord::new(path, attr.stat, attr.content_id);
        self.files.insert(record.clone());
        Ok(record)
    }

    /// Fetch the IV and the ciphertext range for `[offset, offset+len)` of
    /// the plaintext, then decrypt. Stored-object offsets are shifted by the
    /// IV prefix.
    fn fetch_and_decrypt(
        &self,
        path: &str,
        content_id: &ContentId,
        offset: u64,
        len: usize,
    ) -> FsResult<Vec<u8>> {
        let iv = self
            .content
            .fetch_range(content_id, 0, IV_LEN)
            .map_err(|e| FsError::from_remote(path, e))?;
        let ciphertext = self
            .content
            .fetch_range(content_id, IV_LEN as u64 + offset, len)
            .map_err(|e| FsError::from_remote(path, e))?;
        let plaintext = self.cipher.decrypt_range(&iv, offset, &ciphertext)?;
        debug!(path = %path, offset, len, "fetched and decrypted range");
        Ok(plaintext)
    }

    fn invalidate_parent_listing(&self, path: &str) {
        let parent = match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        };
        self.dirs.invalidate(&parent);
    }
}
