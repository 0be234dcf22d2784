//! Error types for the opener crate.

use std::io;

use thiserror::Error;

/// Reasons a safe open can fail.
///
/// Variants never carry the requested or resolved path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OpenError {
    // Target errors
    /// The target (or one of its ancestors) does not exist and creation was
    /// not requested.
    #[error("file not found")]
    NotFound,

    /// The operating system denied access.
    #[error("permission denied")]
    PermissionDenied,

    /// The canonicalized path falls outside the allowed root.
    #[error("path escapes the allowed root")]
    PathEscape,

    /// A symbolic link was encountered while symlinks are not followed.
    #[error("symbolic link rejected")]
    SymlinkRejected,

    /// The target exists but is not a regular file.
    #[error("not a regular file")]
    NotAFile,

    // Input errors
    /// The request itself is unusable (empty, or contains a NUL byte).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The policy root is not an absolute, existing directory.
    #[error("invalid allowed root: {0}")]
    InvalidRoot(String),

    /// The policy combines options that cannot be honored together.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    // OS errors
    /// Any other OS-level failure, with the raw OS error code.
    #[error("I/O failure (os error {0})")]
    IoFailure(i32),
}

/// Fieldless classification of [`OpenError`], convenient for matching and
/// exit code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    PathEscape,
    SymlinkRejected,
    NotAFile,
    InvalidRequest,
    InvalidRoot,
    InvalidPolicy,
    IoFailure,
}

impl OpenError {
    /// Map a raw `errno` value onto the taxonomy.
    pub fn from_errno(code: i32) -> Self {
        match code {
            libc::ENOENT => Self::NotFound,
            libc::EACCES | libc::EPERM => Self::PermissionDenied,
            libc::EISDIR => Self::NotAFile,
            _ => Self::IoFailure(code),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::PathEscape => ErrorKind::PathEscape,
            Self::SymlinkRejected => ErrorKind::SymlinkRejected,
            Self::NotAFile => ErrorKind::NotAFile,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::InvalidRoot(_) => ErrorKind::InvalidRoot,
            Self::InvalidPolicy(_) => ErrorKind::InvalidPolicy,
            Self::IoFailure(_) => ErrorKind::IoFailure,
        }
    }

    /// The underlying OS error code, for [`OpenError::IoFailure`].
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::IoFailure(code) => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for open operations.
pub type Result<T> = std::result::Result<T, OpenError>;

impl From<io::Error> for OpenError {
    fn from(err: io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return Self::from_errno(code);
        }
        // Synthetic errors (no errno) are classified by kind.
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::IoFailure(libc::EIO),
        }
    }
}
