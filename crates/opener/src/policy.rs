//! Open policy: where a request may land and how the target is opened.

use std::path::{Path, PathBuf};

use libc::c_int;
use serde::{Deserialize, Serialize};

use crate::error::{OpenError, Result};

/// Access mode for the opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// Read-only access.
    #[default]
    ReadOnly,
    /// Read and write access.
    ReadWrite,
}

impl OpenMode {
    /// Check if this mode allows writing.
    pub fn can_write(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    fn access_flags(self) -> c_int {
        match self {
            Self::ReadOnly => libc::O_RDONLY,
            Self::ReadWrite => libc::O_RDWR,
        }
    }
}

/// Policy a request is validated against.
///
/// The policy is an immutable input: construct it once (directly, through
/// the builder methods, or by deserializing it from configuration) and pass
/// it to every open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPolicy {
    /// Absolute path of the directory every target must stay inside.
    pub allowed_root: PathBuf,
    /// Resolve symlinks (inside the root) instead of rejecting them.
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Create the target if it does not exist.
    #[serde(default)]
    pub create_if_missing: bool,
    /// Access mode.
    #[serde(default)]
    pub mode: OpenMode,
    /// Truncate the target on open. Only valid with [`OpenMode::ReadWrite`].
    #[serde(default)]
    pub truncate: bool,
}

impl OpenPolicy {
    /// Create a read-only policy rooted at `allowed_root`.
    pub fn new(allowed_root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_root: allowed_root.into(),
            follow_symlinks: false,
            create_if_missing: false,
            mode: OpenMode::ReadOnly,
            truncate: false,
        }
    }

    /// Create a read-only policy.
    pub fn read_only(allowed_root: impl Into<PathBuf>) -> Self {
        Self::new(allowed_root)
    }

    /// Create a read-write policy.
    pub fn read_write(allowed_root: impl Into<PathBuf>) -> Self {
        Self::new(allowed_root).mode(OpenMode::ReadWrite)
    }

    /// Set whether to follow symlinks.
    ///
    /// By default symlinks are rejected. When enabled, link targets are
    /// resolved relative to the root and must still stay inside it.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set whether a missing target is created.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Set the access mode.
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set whether an existing target is truncated.
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// The root every request is resolved against.
    pub fn root(&self) -> &Path {
        &self.allowed_root
    }

    /// Check the parts of the policy that need no filesystem access.
    ///
    /// Existence of the root is verified when it is opened.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_root.as_os_str().is_empty() {
            return Err(OpenError::InvalidRoot("root is empty".to_string()));
        }
        if !self.allowed_root.is_absolute() {
            return Err(OpenError::InvalidRoot("root is not absolute".to_string()));
        }
        if self.truncate && !self.mode.can_write() {
            return Err(OpenError::InvalidPolicy(
                "truncate requires read-write mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Flags for opening the final path component.
    ///
    /// `O_NOFOLLOW` makes the kernel refuse a symlink in the same call that
    /// opens the file. `O_NONBLOCK` keeps a FIFO from stalling the open
    /// before it can be rejected as a non-regular file.
    pub(crate) fn open_flags(&self) -> c_int {
        let mut flags =
            self.mode.access_flags() | libc::O_CLOEXEC | libc::O_NOFOLLOW | libc::O_NONBLOCK;
        if self.create_if_missing {
            flags |= libc::O_CREAT;
        }
        if self.truncate && self.mode.can_write() {
            flags |= libc::O_TRUNC;
        }
        flags
    }
}
