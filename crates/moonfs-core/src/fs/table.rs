//! Path-keyed table of cached file records.
//!
//! A thin layer over [`ExpiringCache`] that adds the record-level mutations
//! the adapter needs while a write session is open (size and content id
//! updates) without forcing callers to re-fetch from the registry. The root
//! path is synthetic and never stored here.

use std::time::Duration;

use crate::cache::ExpiringCache;
use crate::fs::{ContentId, FileRecord};

pub struct FileTable {
    records: ExpiringCache<String, FileRecord>,
}

impl FileTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: ExpiringCache::new(ttl),
        }
    }

    /// A record that is present and unexpired. Expired records are logically
    /// absent and left for the next insert to overwrite.
    pub fn lookup(&self, path: &str) -> Option<FileRecord> {
        if self.records.contains(&path.to_string()) {
            self.records.get(&path.to_string()).ok()
        } else {
            None
        }
    }

    /// A record regardless of freshness. Used where a stale answer beats a
    /// round trip, such as deciding an entry's kind while listing.
    pub fn peek(&self, path: &str) -> Option<FileRecord> {
        self.records.get(&path.to_string()).ok()
    }

    pub fn insert(&self, record: FileRecord) {
        self.records.set(record.path.clone(), record);
    }

    /// Update the reported size of a buffered file so `getattr` reflects
    /// uncommitted writes. No-op when the path is unknown.
    pub fn update_size(&self, path: &str, size: u64) {
        if let Ok(mut record) = self.records.get(&path.to_string()) {
            record.attributes.size = size;
            self.records.set(path.to_string(), record);
        }
    }

    /// Bind a freshly committed content id to the path's record.
    pub fn set_content_id(&self, path: &str, content_id: ContentId) {
        if let Ok(mut record) = self.records.get(&path.to_string()) {
            record.content_id = Some(content_id);
            self.records.set(path.to_string(), record);
        }
    }

    pub fn remove(&self, path: &str) {
        self.records.invalidate(&path.to_string());
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}
