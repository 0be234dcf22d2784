//! # SafeOpen Opener Library
//!
//! This crate validates file paths that come from untrusted sources (command
//! line arguments, configuration values, network requests) and opens them
//! without a window between the check and the use.
//!
//! ## Overview
//!
//! A single operation, [`open`] (or [`SafeOpener::open`]), turns a path
//! request and an [`OpenPolicy`] into either a [`FileHandle`] or an
//! [`OpenError`]:
//!
//! - **Containment**: the request is normalized lexically and must stay
//!   inside the policy's `allowed_root`
//! - **Symlinks**: rejected by default; when followed, resolved inside the
//!   root by the same descriptor walk
//! - **Atomic open**: every component is opened with `openat(2)` and
//!   `O_NOFOLLOW` relative to its parent's descriptor
//! - **Release**: the handle owns its descriptor and closes it on drop or
//!   on an explicit, checked [`FileHandle::close`]
//!
//! ## Resolution
//!
//! ```text
//! "reports/q1.txt"
//!        │  normalize, check containment
//!        ▼
//! [root fd] ──openat("reports", O_DIRECTORY|O_NOFOLLOW)──▶ [dir fd]
//!                                                             │
//!              openat("q1.txt", O_NOFOLLOW|mode flags) ◀──────┘
//!                                                             │
//!                                       fstat: regular file? ▼
//!                                                       FileHandle
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::io::Read;
//!
//! use opener::{OpenError, OpenPolicy, SafeOpener};
//!
//! let opener = SafeOpener::new(OpenPolicy::read_only("/srv/data"))?;
//!
//! let mut handle = opener.open("reports/q1.txt")?;
//! let mut contents = String::new();
//! handle.read_to_string(&mut contents)?;
//!
//! assert_eq!(
//!     opener.open("../../etc/passwd").unwrap_err(),
//!     OpenError::PathEscape
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - [`opener`]: The validate-and-open operation
//! - [`policy`]: Open policy and access modes
//! - [`handle`]: The owned file handle
//! - [`error`]: Error types

pub mod error;
pub mod handle;
pub mod opener;
pub mod policy;
mod walk;

pub use error::{ErrorKind, OpenError, Result};
pub use handle::FileHandle;
pub use opener::{open, SafeOpener};
pub use policy::{OpenMode, OpenPolicy};
pub use walk::MAX_SYMLINK_HOPS;
