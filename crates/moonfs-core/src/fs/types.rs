//! Fixed-shape records shared across the filesystem core.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Mode bits for a regular file entry (`S_IFREG | 0644`).
pub const FILE_MODE: u32 = 0o100_644;

/// Mode bits for a directory entry (`S_IFDIR | 0755`).
pub const DIR_MODE: u32 = 0o040_755;

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;

/// Opaque identifier of an immutable stored object.
///
/// Two objects with the same content id have identical bytes; an object is
/// never mutated under its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a path names a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// POSIX-shaped attribute record, mirroring the registry's wire form.
///
/// Timestamps are seconds since the Unix epoch, fractional, as the registry
/// reports them. The `sn_size` alias absorbs a field-name quirk the registry
/// exhibits for directory entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    #[serde(rename = "st_mode")]
    pub mode: u32,
    #[serde(rename = "st_nlink", default = "default_nlink")]
    pub nlink: u32,
    #[serde(rename = "st_size", alias = "sn_size", default)]
    pub size: u64,
    #[serde(rename = "st_atime", default)]
    pub atime: f64,
    #[serde(rename = "st_mtime", default)]
    pub mtime: f64,
    #[serde(rename = "st_ctime", default)]
    pub ctime: f64,
}

fn default_nlink() -> u32 {
    1
}

impl Stat {
    /// Synthetic attributes for a directory, stamped with the current time.
    pub fn directory() -> Self {
        let now = unix_now();
        Self {
            mode: DIR_MODE,
            nlink: 2,
            size: 4096,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    /// Attributes for a regular file of the given size.
    pub fn file(size: u64) -> Self {
        let now = unix_now();
        Self {
            mode: FILE_MODE,
            nlink: 1,
            size,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn kind(&self) -> NodeKind {
        if self.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Locally cached view of one remote path.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: String,
    /// Absent for directories and for files created locally but not yet
    /// committed.
    pub content_id: Option<ContentId>,
    pub attributes: Stat,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, attributes: Stat, content_id: Option<ContentId>) -> Self {
        Self {
            path: path.into(),
            content_id,
            attributes,
        }
    }
}

/// A directory's entries in readdir order, always led by `.` and `..`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryListing {
    entries: Vec<String>,
}

impl DirectoryListing {
    pub fn new(children: impl IntoIterator<Item = String>) -> Self {
        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(children);
        Self { entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Entries excluding the dot entries.
    pub fn children(&self) -> &[String] {
        &self.entries[2..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_classification() {
        assert!(Stat::directory().is_dir());
        assert!(!Stat::file(10).is_dir());
        assert_eq!(Stat::file(10).kind(), NodeKind::File);
        assert_eq!(Stat::directory().kind(), NodeKind::Directory);
    }

    #[test]
    fn stat_deserializes_wire_names() {
        let json = r#"{"st_mode": 33188, "st_nlink": 1, "st_size": 42,
                       "st_atime": 1.5, "st_mtime": 2.5, "st_ctime": 3.5}"#;
        let stat: Stat = serde_json::from_str(json).unwrap();
        assert_eq!(stat.mode, 0o100_644);
        assert_eq!(stat.size, 42);
        assert_eq!(stat.mtime, 2.5);
    }

    #[test]
    fn stat_accepts_directory_size_alias() {
        let json = r#"{"st_mode": 16877, "st_nlink": 2, "sn_size": 4096,
                       "st_atime": 0, "st_mtime": 0, "st_ctime": 0}"#;
        let stat: Stat = serde_json::from_str(json).unwrap();
        assert!(stat.is_dir());
        assert_eq!(stat.size, 4096);
    }

    #[test]
    fn listing_is_prefixed_with_dot_entries() {
        let listing = DirectoryListing::new(vec!["a.txt".into(), "b.txt".into()]);
        assert_eq!(listing.entries(), [".", "..", "a.txt", "b.txt"]);
        assert_eq!(listing.children(), ["a.txt", "b.txt"]);
    }
}
