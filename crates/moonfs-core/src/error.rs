//! Error taxonomy for MoonFS core.
//!
//! Every remote failure is translated at the call boundary into one of the
//! variants below and returned immediately; the core never retries a remote
//! call on its own and never panics on one. Host bindings map these variants
//! onto POSIX error codes.

use thiserror::Error;

use crate::cache::ChunkStoreError;
use crate::crypto::CipherError;
use crate::remote::{RemoteError, TransportError};

/// Top-level error for filesystem adapter operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The remote path or object does not exist (maps to ENOENT).
    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    /// Network or timeout failure against a remote collaborator (maps to EIO).
    #[error("remote transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Operation requested on a path lacking required prior state, such as
    /// `read` on a path that was never opened (maps to EBADF).
    #[error("{operation} on {path} requires a prior {required}")]
    InvalidState {
        path: String,
        operation: &'static str,
        required: &'static str,
    },

    /// Malformed cipher parameters or path structure (maps to EINVAL/EPERM).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// File operation on a directory (maps to EISDIR).
    #[error("{path} is a directory")]
    IsDirectory { path: String },

    /// Directory operation on a file (maps to ENOTDIR).
    #[error("{path} is not a directory")]
    NotADirectory { path: String },

    /// A write-session commit failed after partial remote interaction.
    ///
    /// The buffered bytes are preserved; the caller may retry by issuing
    /// another `release` (maps to EIO).
    #[error("upload of {path} failed: {source}")]
    UploadFailure {
        path: String,
        #[source]
        source: TransportError,
    },
}

impl FsError {
    /// Map a remote-layer error for an operation on `path`.
    pub(crate) fn from_remote(path: &str, err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound => FsError::NotFound {
                path: path.to_string(),
            },
            RemoteError::Transport(e) => FsError::Transport(e),
        }
    }
}

impl From<CipherError> for FsError {
    fn from(err: CipherError) -> Self {
        FsError::InvalidInput {
            reason: err.to_string(),
        }
    }
}

// Chunk cache failures are never fatal for the adapter (a broken cache entry
// is just a miss), but the conversion exists for the rare paths that do
// surface them.
impl From<ChunkStoreError> for FsError {
    fn from(err: ChunkStoreError) -> Self {
        FsError::InvalidInput {
            reason: err.to_string(),
        }
    }
}

/// Result alias used throughout the adapter.
pub type FsResult<T> = Result<T, FsError>;
