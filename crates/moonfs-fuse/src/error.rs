//! Mapping from core errors to POSIX error codes.

use libc::c_int;
use moonfs_core::FsError;

/// Conversion to the errno the kernel receives.
pub trait ToErrno {
    fn to_errno(&self) -> c_int;
}

impl ToErrno for FsError {
    fn to_errno(&self) -> c_int {
        match self {
            FsError::NotFound { .. } => libc::ENOENT,
            FsError::Transport(_) | FsError::UploadFailure { .. } => libc::EIO,
            FsError::InvalidState { .. } => libc::EBADF,
            FsError::InvalidInput { .. } => libc::EPERM,
            FsError::IsDirectory { .. } => libc::EISDIR,
            FsError::NotADirectory { .. } => libc::ENOTDIR,
        }
    }
}
