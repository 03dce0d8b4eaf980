//! The fuser `Filesystem` implementation.
//!
//! Thin translation layer: every callback resolves the inode to a virtual
//! path, delegates to the core adapter, and converts the result into the
//! kernel's reply types. All policy (caching, buffering, encryption) lives
//! in the adapter; nothing here talks to the network directly.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use tracing::{debug, error};

use moonfs_core::fs::{NodeKind, Stat};
use moonfs_core::remote::{ContentStore, MetadataRegistry};
use moonfs_core::FilesystemAdapter;

use crate::error::ToErrno;
use crate::inode::{InodeTable, ROOT_INODE};

const BLOCK_SIZE: u32 = 4096;

/// FUSE filesystem over a MoonFS adapter.
pub struct MoonFs<R, C> {
    adapter: Arc<FilesystemAdapter<R, C>>,
    inodes: InodeTable,
    attr_ttl: Duration,
}

impl<R: MetadataRegistry, C: ContentStore> MoonFs<R, C> {
    pub fn new(adapter: Arc<FilesystemAdapter<R, C>>, attr_ttl: Duration) -> Self {
        Self {
            adapter,
            inodes: InodeTable::new(),
            attr_ttl,
        }
    }

    fn path_for(&self, ino: u64) -> Result<String, c_int> {
        self.inodes.path_of(ino).ok_or(libc::ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let parent_path = self.path_for(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?;
        if parent_path == "/" {
            Ok(format!("/{name}"))
        } else {
            Ok(format!("{parent_path}/{name}"))
        }
    }

    fn attr_for(&self, ino: u64, stat: &Stat, req: &Request<'_>) -> FileAttr {
        file_attr(ino, stat, req.uid(), req.gid())
    }

    /// Entry kind for a readdir row without forcing a remote round trip:
    /// root children are role directories, everything else falls back to the
    /// last cached record, defaulting to a regular file.
    fn entry_kind(&self, parent: u64, path: &str) -> FileType {
        if parent == ROOT_INODE {
            return FileType::Directory;
        }
        match self.adapter.cached_record(path).map(|r| r.attributes.kind()) {
            Some(NodeKind::Directory) => FileType::Directory,
            _ => FileType::RegularFile,
        }
    }
}

impl<R: MetadataRegistry, C: ContentStore> Filesystem for MoonFs<R, C> {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.getattr(&path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_insert(&path);
                reply.entry(&self.attr_ttl, &self.attr_for(ino, &stat, req), 0);
            }
            Err(e) => {
                debug!(path = %path, error = %e, "lookup failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.getattr(&path) {
            Ok(stat) => reply.attr(&self.attr_ttl, &self.attr_for(ino, &stat, req)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        if let Some(size) = size {
            if let Err(e) = self.adapter.truncate(&path, size) {
                return reply.error(e.to_errno());
            }
        }
        match self.adapter.getattr(&path) {
            Ok(stat) => reply.attr(&self.attr_ttl, &self.attr_for(ino, &stat, req)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.open(&path) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => {
                debug!(path = %path, error = %e, "open refused");
                reply.error(e.to_errno());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.adapter.read(&path, offset, size as usize) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => {
                error!(path = %path, offset, error = %e, "read failed");
                reply.error(e.to_errno());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.adapter.write(&path, offset, data) {
            #[allow(clippy::cast_possible_truncation)]
            Ok(written) => reply.written(written as u32),
            Err(e) => {
                error!(path = %path, offset, error = %e, "write failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.flush(&path) {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!(path = %path, error = %e, "flush failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.release(&path) {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!(path = %path, error = %e, "release failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.opendir(&path) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_for(ino) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        let listing = match self.adapter.readdir(&path) {
            Ok(l) => l,
            Err(e) => {
                debug!(path = %path, error = %e, "readdir failed");
                return reply.error(e.to_errno());
            }
        };

        #[allow(clippy::cast_sign_loss)]
        let skip = offset as usize;
        for (i, name) in listing.entries().iter().enumerate().skip(skip) {
            let next_offset = (i + 1) as i64;
            let (entry_ino, kind) = match name.as_str() {
                "." => (ino, FileType::Directory),
                ".." => (ROOT_INODE, FileType::Directory),
                _ => {
                    let child = if path == "/" {
                        format!("/{name}")
                    } else {
                        format!("{path}/{name}")
                    };
                    let kind = self.entry_kind(ino, &child);
                    (self.inodes.get_or_insert(&child), kind)
                }
            };
            if reply.add(entry_ino, next_offset, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.create(&path) {
            Ok(()) => {
                let ino = self.inodes.get_or_insert(&path);
                let stat = Stat::file(0);
                reply.created(&self.attr_ttl, &self.attr_for(ino, &stat, req), 0, 0, 0);
            }
            Err(e) => {
                error!(path = %path, error = %e, "create failed");
                reply.error(e.to_errno());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.unlink(&path) {
            Ok(()) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => {
                error!(path = %path, error = %e, "unlink failed");
                reply.error(e.to_errno());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let old = match self.child_path(parent, name) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        let new = match self.child_path(newparent, newname) {
            Ok(p) => p,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.rename(&old, &new) {
            Ok(()) => {
                self.inodes.rebind(&old, &new);
                reply.ok();
            }
            Err(e) => {
                error!(old = %old, new = %new, error = %e, "rename failed");
                reply.error(e.to_errno());
            }
        }
    }
}

/// Convert a core attribute record into the kernel's shape.
fn file_attr(ino: u64, stat: &Stat, uid: u32, gid: u32) -> FileAttr {
    let kind = match stat.kind() {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    };
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(u64::from(BLOCK_SIZE)),
        atime: epoch_time(stat.atime),
        mtime: epoch_time(stat.mtime),
        ctime: epoch_time(stat.ctime),
        crtime: epoch_time(stat.ctime),
        kind,
        #[allow(clippy::cast_possible_truncation)]
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn epoch_time(seconds: f64) -> SystemTime {
    if seconds <= 0.0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_secs_f64(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_attr_conversion() {
        let stat = Stat::file(8192);
        let attr = file_attr(7, &stat, 1000, 1000);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.size, 8192);
        assert_eq!(attr.blocks, 2);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o644);
        assert_eq!(attr.uid, 1000);
    }

    #[test]
    fn directory_attr_conversion() {
        let attr = file_attr(1, &Stat::directory(), 0, 0);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn negative_timestamps_clamp_to_epoch() {
        assert_eq!(epoch_time(-5.0), UNIX_EPOCH);
        assert_eq!(epoch_time(0.0), UNIX_EPOCH);
        assert!(epoch_time(10.5) > UNIX_EPOCH);
    }
}
