//! The validate-and-open operation.

use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::{OpenError, Result};
use crate::handle::FileHandle;
use crate::policy::OpenPolicy;
use crate::walk::{Root, Walk};

/// Opens untrusted paths under a fixed [`OpenPolicy`].
///
/// The opener holds no state besides its policy; it is `Send + Sync` and
/// every call to [`SafeOpener::open`] is independent.
#[derive(Debug, Clone)]
pub struct SafeOpener {
    policy: OpenPolicy,
}

impl SafeOpener {
    /// Create an opener, rejecting a policy that can never succeed.
    pub fn new(policy: OpenPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// The policy requests are validated against.
    pub fn policy(&self) -> &OpenPolicy {
        &self.policy
    }

    /// Validate `request` and open it. See [`open`].
    pub fn open(&self, request: impl AsRef<Path>) -> Result<FileHandle> {
        open(request, &self.policy)
    }
}

/// Validate `request` against `policy` and open it.
///
/// Relative requests are resolved against `policy.allowed_root`; absolute
/// requests must lie inside it. On success the returned handle is the only
/// owner of the descriptor. On failure no descriptor stays open and nothing
/// was created unless the final open itself created the file.
pub fn open(request: impl AsRef<Path>, policy: &OpenPolicy) -> Result<FileHandle> {
    let request = request.as_ref();
    let bytes = request.as_os_str().as_bytes();
    if bytes.is_empty() {
        return Err(OpenError::InvalidRequest("path is empty".to_string()));
    }
    if bytes.contains(&0) {
        return Err(OpenError::InvalidRequest(
            "path contains a NUL byte".to_string(),
        ));
    }
    policy.validate()?;

    let root = Root::open(&policy.allowed_root)?;
    let components = root.contain(request)?;
    let (fd, resolved) = Walk::new(&root, policy, components)
        .trailing_slash(bytes.ends_with(b"/"))
        .run()?;

    let handle = FileHandle::new(fd, resolved, policy.mode);
    // Checked on the descriptor, so the file inspected is the one opened.
    if !handle.metadata()?.is_file() {
        return Err(OpenError::NotAFile);
    }
    Ok(handle)
}
