//! Buffered write sessions.
//!
//! Remote objects are immutable, so a file cannot be patched in place: the
//! whole object is rewritten on commit. [`PendingWrite`] accumulates the
//! full future content of one path in memory; [`WriteSessions`] keys the
//! buffers by path and hands out the per-path commit locks that keep two
//! `release` calls on the same path from interleaving uploads.
//!
//! State machine per path: absent → buffering (create/first write) →
//! committing (release/flush) → absent on success, back to buffering with
//! the buffer intact on failure.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// The accumulated future content of one path.
#[derive(Debug, Default)]
pub struct PendingWrite {
    content: Vec<u8>,
    dirty: bool,
}

impl PendingWrite {
    /// A fresh buffer for a newly created file. Dirty from the start so an
    /// empty file still gets committed.
    pub fn for_create() -> Self {
        Self {
            content: Vec::new(),
            dirty: true,
        }
    }

    /// Splice `data` at `offset`, zero-filling any gap past the current end.
    ///
    /// Returns the number of bytes written (always `data.len()`).
    pub fn write(&mut self, offset: u64, data: &[u8]) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        let offset = offset as usize;
        let end = offset + data.len();
        if end > self.content.len() {
            self.content.resize(end, 0);
        }
        self.content[offset..end].copy_from_slice(data);
        self.dirty = true;
        data.len()
    }

    /// Read back buffered bytes, clamped to the buffer end. Empty when
    /// `offset` is past the end.
    pub fn read(&self, offset: u64, size: usize) -> &[u8] {
        #[allow(clippy::cast_possible_truncation)]
        let offset = offset as usize;
        if offset >= self.content.len() {
            return &[];
        }
        let end = (offset + size).min(self.content.len());
        &self.content[offset..end]
    }

    /// Resize in place: pads with zeros or cuts.
    pub fn truncate(&mut self, size: u64) {
        #[allow(clippy::cast_possible_truncation)]
        let size = size as usize;
        if size != self.content.len() {
            self.content.resize(size, 0);
            self.dirty = true;
        }
    }

    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Snapshot of the content for encryption and upload.
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// Path-keyed write buffers plus the per-path commit lock table.
#[derive(Default)]
pub struct WriteSessions {
    pending: DashMap<String, PendingWrite>,
    commit_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WriteSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffering session for a newly created path, replacing any
    /// stale leftover buffer.
    pub fn begin(&self, path: &str) {
        self.pending
            .insert(path.to_string(), PendingWrite::for_create());
    }

    /// Splice into the path's buffer, allocating one on first write.
    /// Returns the bytes written and the resulting buffer length.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> (usize, u64) {
        let mut entry = self.pending.entry(path.to_string()).or_default();
        let written = entry.write(offset, data);
        (written, entry.len())
    }

    /// Resize the path's buffer, allocating one if absent. Returns the
    /// resulting length.
    pub fn truncate(&self, path: &str, size: u64) -> u64 {
        let mut entry = self.pending.entry(path.to_string()).or_default();
        entry.truncate(size);
        entry.len()
    }

    /// Buffered bytes at `offset`, or `None` when no session is open.
    pub fn read(&self, path: &str, offset: u64, size: usize) -> Option<Vec<u8>> {
        self.pending
            .get(path)
            .map(|entry| entry.read(offset, size).to_vec())
    }

    pub fn is_buffering(&self, path: &str) -> bool {
        self.pending.contains_key(path)
    }

    pub fn buffered_len(&self, path: &str) -> Option<u64> {
        self.pending.get(path).map(|entry| entry.len())
    }

    /// Remove the buffer for commit. Callers must hold the path's commit
    /// lock and put the buffer back via [`restore`](Self::restore) if the
    /// upload fails.
    pub fn take(&self, path: &str) -> Option<PendingWrite> {
        self.pending.remove(path).map(|(_, buffer)| buffer)
    }

    /// Reinstate a buffer after a failed commit so the caller can retry.
    pub fn restore(&self, path: &str, buffer: PendingWrite) {
        self.pending.insert(path.to_string(), buffer);
    }

    /// Drop any buffer without committing.
    pub fn discard(&self, path: &str) {
        self.pending.remove(path);
    }

    /// The commit lock for a path. One lock per path for the lifetime of
    /// the session table; lock entries are small and never removed.
    pub fn commit_lock(&self, path: &str) -> Arc<Mutex<()>> {
        self.commit_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_splices_and_zero_fills() {
        let mut buf = PendingWrite::for_create();
        buf.write(0, b"hello");
        buf.write(10, b"world");
        assert_eq!(buf.content(), b"hello\x00\x00\x00\x00\x00world");
        assert_eq!(buf.len(), 15);
    }

    #[test]
    fn overlapping_writes_last_wins() {
        let mut buf = PendingWrite::for_create();
        buf.write(0, b"aaaaaa");
        buf.write(2, b"bb");
        assert_eq!(buf.content(), b"aabbaa");
    }

    #[test]
    fn truncate_pads_and_cuts() {
        let mut buf = PendingWrite::for_create();
        buf.write(0, b"hello");
        buf.truncate(8);
        assert_eq!(buf.content(), b"hello\x00\x00\x00");
        buf.truncate(2);
        assert_eq!(buf.content(), b"he");
    }

    #[test]
    fn read_clamps_to_end() {
        let mut buf = PendingWrite::for_create();
        buf.write(0, b"hello");
        assert_eq!(buf.read(3, 100), b"lo");
        assert_eq!(buf.read(5, 10), b"");
        assert_eq!(buf.read(99, 1), b"");
    }

    #[test]
    fn create_marks_dirty_even_when_empty() {
        assert!(PendingWrite::for_create().is_dirty());
        assert!(PendingWrite::for_create().is_empty());
    }

    #[test]
    fn sessions_track_paths_independently() {
        let sessions = WriteSessions::new();
        sessions.write("/docs/a.txt", 0, b"aa");
        sessions.write("/docs/b.txt", 0, b"bbbb");
        assert_eq!(sessions.buffered_len("/docs/a.txt"), Some(2));
        assert_eq!(sessions.buffered_len("/docs/b.txt"), Some(4));
        assert!(!sessions.is_buffering("/docs/c.txt"));
    }

    #[test]
    fn take_then_restore_preserves_bytes() {
        let sessions = WriteSessions::new();
        sessions.write("/docs/a.txt", 0, b"data");
        let buffer = sessions.take("/docs/a.txt").unwrap();
        assert!(!sessions.is_buffering("/docs/a.txt"));
        sessions.restore("/docs/a.txt", buffer);
        assert_eq!(sessions.read("/docs/a.txt", 0, 4), Some(b"data".to_vec()));
    }

    #[test]
    fn commit_lock_is_shared_per_path() {
        let sessions = WriteSessions::new();
        let a = sessions.commit_lock("/docs/a.txt");
        let b = sessions.commit_lock("/docs/a.txt");
        assert!(Arc::ptr_eq(&a, &b));
        let other = sessions.commit_lock("/docs/b.txt");
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
