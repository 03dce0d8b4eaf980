//! Virtual filesystem core.
//!
//! [`adapter::FilesystemAdapter`] is the entry point: it receives the
//! standard file-operation contract and orchestrates the caches, the cipher
//! and the remote collaborators. The sibling modules hold its moving parts:
//! path classification, the file record table, and buffered write sessions.

pub mod adapter;
pub mod path;
pub mod session;
pub mod table;
mod types;

pub use adapter::FilesystemAdapter;
pub use types::{ContentId, DirectoryListing, FileRecord, NodeKind, Stat, DIR_MODE, FILE_MODE};
