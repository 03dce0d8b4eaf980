//! Remote collaborators.
//!
//! The adapter talks to two abstract services: a metadata registry (path →
//! attributes and content id, directory listings, namespace mutations) and a
//! content store (immutable objects addressed by content id). The traits
//! here are the seam the adapter is tested through; [`http`] provides the
//! production implementations over the MoonStorage web API.
//!
//! `fetch_range` addresses the stored object form, i.e. the encrypted
//! envelope including its IV prefix. Callers that want plaintext offsets
//! must account for the IV themselves.

mod http;

pub use self::http::{HttpContentStore, HttpRegistry, Session};

use thiserror::Error;

use crate::fs::{ContentId, Stat};

/// What a registry lookup returns for one path.
#[derive(Debug, Clone)]
pub struct RemoteAttr {
    pub stat: Stat,
    /// Present for files; directories have no content object.
    pub content_id: Option<ContentId>,
}

/// Failure of a single remote call. Never retried by the core.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote reported the path or object does not exist.
    #[error("not found on remote")]
    NotFound,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Transport-level failures: everything that is not a clean 2xx/404.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("remote call timed out")]
    Timeout,

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("unexpected status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

/// Path-keyed metadata service.
pub trait MetadataRegistry: Send + Sync {
    /// Attributes and content id for a path. `RemoteError::NotFound` when
    /// the path does not exist.
    fn lookup_attributes(&self, path: &str) -> Result<RemoteAttr, RemoteError>;

    /// Child entry names of a directory, without `.`/`..`.
    fn list_children(&self, path: &str) -> Result<Vec<String>, RemoteError>;

    /// Whether a path currently exists.
    fn exists(&self, path: &str) -> Result<bool, RemoteError>;

    /// Remove a path from the namespace.
    fn delete(&self, path: &str) -> Result<(), RemoteError>;

    /// Rebind `old` to `new` in the namespace.
    fn rename(&self, old: &str, new: &str) -> Result<(), RemoteError>;
}

/// Content-addressed object service.
pub trait ContentStore: Send + Sync {
    /// Fetch `len` bytes of the stored object starting at `offset`.
    ///
    /// Offsets address the stored (encrypted envelope) form: byte 0 is the
    /// first IV byte.
    fn fetch_range(&self, content_id: &ContentId, offset: u64, len: usize)
        -> Result<Vec<u8>, RemoteError>;

    /// Upload a complete object for `path`, returning its content id.
    fn store(&self, path: &str, payload: &[u8]) -> Result<ContentId, RemoteError>;
}
