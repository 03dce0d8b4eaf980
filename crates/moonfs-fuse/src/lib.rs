//! FUSE binding for MoonFS.
//!
//! Bridges the host-agnostic `moonfs-core` adapter onto the kernel's FUSE
//! protocol: inode/path mapping, attribute conversion, and errno
//! translation. The `moonfs` binary in this crate wires the HTTP
//! collaborators together and mounts the filesystem.

pub mod error;
pub mod filesystem;
pub mod inode;

pub use filesystem::MoonFs;
