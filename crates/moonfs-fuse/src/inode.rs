//! Bidirectional inode ↔ virtual path mapping.
//!
//! The core adapter is path-keyed; the kernel speaks inodes. This table
//! hands out stable inode numbers for paths as the kernel discovers them
//! and rebinds them on rename so open handles keep working. Inode 1 is the
//! root, per FUSE convention, and is always present.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

pub struct InodeTable {
    by_ino: DashMap<u64, String>,
    by_path: DashMap<String, u64>,
    next: AtomicU64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let table = Self {
            by_ino: DashMap::new(),
            by_path: DashMap::new(),
            next: AtomicU64::new(ROOT_INODE + 1),
        };
        table.by_ino.insert(ROOT_INODE, "/".to_string());
        table.by_path.insert("/".to_string(), ROOT_INODE);
        table
    }

    /// Inode for a path, allocating one on first sight.
    pub fn get_or_insert(&self, path: &str) -> u64 {
        if let Some(ino) = self.by_path.get(path) {
            return *ino;
        }
        let ino = self.next.fetch_add(1, Ordering::Relaxed);
        // Two threads can race here; the by_path entry wins and the loser's
        // ino is simply never referenced again.
        let ino = *self.by_path.entry(path.to_string()).or_insert(ino);
        self.by_ino.insert(ino, path.to_string());
        ino
    }

    pub fn path_of(&self, ino: u64) -> Option<String> {
        self.by_ino.get(&ino).map(|p| p.clone())
    }

    /// Move an inode to a new path, keeping its number.
    pub fn rebind(&self, old: &str, new: &str) {
        if let Some((_, ino)) = self.by_path.remove(old) {
            // If the target path already had an inode, it is orphaned; the
            // kernel forgets it on its own schedule.
            self.by_path.insert(new.to_string(), ino);
            self.by_ino.insert(ino, new.to_string());
        }
    }

    pub fn remove_path(&self, path: &str) {
        if let Some((_, ino)) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_preinstalled() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INODE), Some("/".to_string()));
        assert_eq!(table.get_or_insert("/"), ROOT_INODE);
    }

    #[test]
    fn paths_get_stable_inodes() {
        let table = InodeTable::new();
        let a = table.get_or_insert("/docs/a.txt");
        let b = table.get_or_insert("/docs/b.txt");
        assert_ne!(a, b);
        assert_eq!(table.get_or_insert("/docs/a.txt"), a);
        assert_eq!(table.path_of(a), Some("/docs/a.txt".to_string()));
    }

    #[test]
    fn rebind_keeps_the_inode_number() {
        let table = InodeTable::new();
        let ino = table.get_or_insert("/docs/a.txt");
        table.rebind("/docs/a.txt", "/docs/b.txt");
        assert_eq!(table.path_of(ino), Some("/docs/b.txt".to_string()));
        assert_eq!(table.get_or_insert("/docs/b.txt"), ino);
    }

    #[test]
    fn remove_forgets_both_directions() {
        let table = InodeTable::new();
        let ino = table.get_or_insert("/docs/a.txt");
        table.remove_path("/docs/a.txt");
        assert_eq!(table.path_of(ino), None);
        assert_ne!(table.get_or_insert("/docs/a.txt"), ino);
    }
}
