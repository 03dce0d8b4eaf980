//! MoonFS core: a cached virtual filesystem over a remote content-addressed
//! object store.
//!
//! The crate is host-agnostic: [`fs::FilesystemAdapter`] exposes the
//! standard file-operation contract (`getattr`, `open`, `read`, `write`,
//! `release`, ...) against two injected collaborators, a metadata registry
//! and a content store (see [`remote`]), with transparent caching
//! ([`cache`]) and client-side seekable encryption ([`crypto`]). A FUSE
//! binding lives in a separate crate.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod remote;

pub use config::MountConfig;
pub use error::{FsError, FsResult};
pub use fs::FilesystemAdapter;
