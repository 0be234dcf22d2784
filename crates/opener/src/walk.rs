//! Descriptor-relative path resolution.
//!
//! A request is never handed to the kernel as a whole path. It is split into
//! components and opened one component at a time with `openat(2)` relative to
//! the descriptor of the previous directory, always with `O_NOFOLLOW`. A
//! symlink is therefore seen by the same call that would have opened it, and
//! nothing renamed or replaced between a check and the open can redirect the
//! walk outside the root.

use std::collections::VecDeque;
use std::ffi::{CStr, CString, OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Component, Path, PathBuf};

use libc::c_int;

use crate::error::{OpenError, Result};
use crate::policy::OpenPolicy;

/// Maximum number of symlinks expanded during a single open (Linux `MAXSYMLINKS`).
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Permission bits for files created by an open, before the umask.
const CREATE_MODE: libc::mode_t = 0o666;

/// Flags for intermediate directories. Only search permission is needed.
#[cfg(any(target_os = "linux", target_os = "android"))]
const DIR_FLAGS: c_int = libc::O_PATH | libc::O_DIRECTORY | libc::O_NOFOLLOW | libc::O_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const DIR_FLAGS: c_int = libc::O_RDONLY | libc::O_DIRECTORY | libc::O_NOFOLLOW | libc::O_CLOEXEC;

/// The opened allowed root.
pub(crate) struct Root {
    fd: OwnedFd,
    /// Root with symlinks resolved; resolved target paths are built on it.
    canonical: PathBuf,
    /// Root as configured, lexically normalized. Kept only when it names
    /// the same directory as `canonical`.
    configured: Option<PathBuf>,
}

impl Root {
    /// Open the policy root. The root is trusted configuration, so symlinks
    /// in it are followed.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let invalid = |e: io::Error| OpenError::InvalidRoot(e.to_string());

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY)
            .open(path)
            .map_err(invalid)?;
        let canonical = fs::canonicalize(path).map_err(invalid)?;

        // `..` after a symlink makes the lexical spelling name another
        // directory than the one the descriptor refers to.
        let configured = normalize(path);
        let configured = match fs::canonicalize(&configured) {
            Ok(resolved) if resolved == canonical => Some(configured),
            _ => None,
        };

        Ok(Self {
            fd: OwnedFd::from(file),
            canonical,
            configured,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.canonical
    }

    /// Resolve `request` lexically against the root and return its
    /// components relative to the root.
    ///
    /// Fails with [`OpenError::PathEscape`] when the normalized path is not
    /// inside the root.
    pub(crate) fn contain(&self, request: &Path) -> Result<Vec<OsString>> {
        let joined = if request.is_absolute() {
            normalize(request)
        } else {
            normalize(&self.canonical.join(request))
        };

        let relative = joined
            .strip_prefix(&self.canonical)
            .ok()
            .or_else(|| {
                self.configured
                    .as_deref()
                    .and_then(|configured| joined.strip_prefix(configured).ok())
            })
            .ok_or(OpenError::PathEscape)?;

        Ok(relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_os_string()),
                _ => None,
            })
            .collect())
    }
}

/// Lexically normalize an absolute path: drop `.`, apply `..` to the
/// preceding component. `..` at the filesystem root stays at the root.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// A single descriptor walk from the root to the target.
pub(crate) struct Walk<'a> {
    root: &'a Root,
    policy: &'a OpenPolicy,
    /// Directories opened below the root, innermost last.
    dirs: Vec<OwnedFd>,
    /// Names of `dirs`, for building the resolved path.
    names: Vec<OsString>,
    pending: VecDeque<OsString>,
    hops: usize,
    /// The request ended in a separator, so the target must be a directory.
    trailing_slash: bool,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(root: &'a Root, policy: &'a OpenPolicy, components: Vec<OsString>) -> Self {
        Self {
            root,
            policy,
            dirs: Vec::new(),
            names: Vec::new(),
            pending: components.into(),
            hops: 0,
            trailing_slash: false,
        }
    }

    pub(crate) fn trailing_slash(mut self, trailing_slash: bool) -> Self {
        self.trailing_slash = trailing_slash;
        self
    }

    /// Walk to the final component and open it with the policy's flags.
    ///
    /// Returns the descriptor and the resolved path. Every directory
    /// descriptor opened on the way is closed when the walk is dropped.
    pub(crate) fn run(mut self) -> Result<(OwnedFd, PathBuf)> {
        while let Some(name) = self.pending.pop_front() {
            if name == ".." {
                self.ascend()?;
                continue;
            }
            if name.is_empty() || name == "." {
                continue;
            }

            let c_name = c_name(&name)?;
            let last = self.pending.is_empty();
            let flags = if !last {
                DIR_FLAGS
            } else if self.trailing_slash {
                // A file is answered with ENOTDIR, a directory with NotAFile.
                (self.policy.open_flags() | libc::O_DIRECTORY) & !(libc::O_CREAT | libc::O_TRUNC)
            } else {
                self.policy.open_flags()
            };

            match open_at(self.current(), &c_name, flags, CREATE_MODE) {
                Ok(fd) if last => {
                    let resolved = self.resolved(&name);
                    return Ok((fd, resolved));
                }
                Ok(fd) => {
                    self.dirs.push(fd);
                    self.names.push(name);
                }
                Err(err) => {
                    if !is_link_errno(&err) || !is_symlink_at(self.current(), &c_name) {
                        return Err(err.into());
                    }
                    self.expand_link(&c_name)?;
                }
            }
        }

        // The request named the root itself, or a directory reached via `..`.
        Err(OpenError::NotAFile)
    }

    fn current(&self) -> BorrowedFd<'_> {
        self.dirs.last().unwrap_or(&self.root.fd).as_fd()
    }

    fn ascend(&mut self) -> Result<()> {
        if self.dirs.pop().is_none() {
            return Err(OpenError::PathEscape);
        }
        self.names.pop();
        Ok(())
    }

    fn resolved(&self, name: &OsStr) -> PathBuf {
        let mut path = self.root.path().to_path_buf();
        path.extend(&self.names);
        path.push(name);
        path
    }

    /// Replace the symlink `name` in the current directory by its target.
    fn expand_link(&mut self, name: &CStr) -> Result<()> {
        if !self.policy.follow_symlinks {
            return Err(OpenError::SymlinkRejected);
        }

        self.hops += 1;
        if self.hops > MAX_SYMLINK_HOPS {
            return Err(OpenError::IoFailure(libc::ELOOP));
        }

        let target = read_link_at(self.current(), name)?;
        let components: Vec<OsString> = if target.is_absolute() {
            let inside = self.root.contain(&target)?;
            self.dirs.clear();
            self.names.clear();
            inside
        } else {
            target
                .components()
                .filter_map(|c| match c {
                    Component::ParentDir => Some(OsString::from("..")),
                    Component::Normal(name) => Some(name.to_os_string()),
                    _ => None,
                })
                .collect()
        };

        for component in components.into_iter().rev() {
            self.pending.push_front(component);
        }
        Ok(())
    }
}

fn c_name(name: &OsStr) -> Result<CString> {
    CString::new(name.as_bytes())
        .map_err(|_| OpenError::InvalidRequest("path contains a NUL byte".to_string()))
}

/// Errors `openat` reports for a symlink under `O_NOFOLLOW`. Linux answers
/// `ENOTDIR` instead of `ELOOP` when `O_DIRECTORY` is also set; FreeBSD
/// answers `EMLINK`.
fn is_link_errno(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ELOOP) | Some(libc::ENOTDIR) | Some(libc::EMLINK))
}

fn cvt(rc: c_int) -> io::Result<c_int> {
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

pub(crate) fn open_at(
    dir: BorrowedFd<'_>,
    name: &CStr,
    flags: c_int,
    mode: libc::mode_t,
) -> io::Result<OwnedFd> {
    // SAFETY: `name` is NUL-terminated and `dir` is a live descriptor.
    let fd = cvt(unsafe {
        libc::openat(dir.as_raw_fd(), name.as_ptr(), flags, mode as libc::c_uint)
    })?;
    // SAFETY: `openat` returned a fresh descriptor that nothing else owns.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn read_link_at(dir: BorrowedFd<'_>, name: &CStr) -> io::Result<PathBuf> {
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    loop {
        // SAFETY: the kernel writes at most `capacity` bytes into `buf`.
        let len = unsafe {
            libc::readlinkat(
                dir.as_raw_fd(),
                name.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.capacity(),
            )
        };
        if len == -1 {
            return Err(io::Error::last_os_error());
        }

        let len = len as usize;
        if len < buf.capacity() {
            // SAFETY: `len` bytes were initialized by `readlinkat`.
            unsafe { buf.set_len(len) };
            return Ok(PathBuf::from(OsString::from_vec(buf)));
        }
        // Possibly truncated; retry with a larger buffer.
        buf.reserve(buf.capacity() * 2);
    }
}

pub(crate) fn is_symlink_at(dir: BorrowedFd<'_>, name: &CStr) -> bool {
    let mut stat = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: `stat` is only read after `fstatat` reports success.
    let rc = unsafe {
        libc::fstatat(
            dir.as_raw_fd(),
            name.as_ptr(),
            stat.as_mut_ptr(),
            libc::AT_SYMLINK_NOFOLLOW,
        )
    };
    if rc != 0 {
        return false;
    }
    // SAFETY: `fstatat` returned 0, so it filled in `stat`.
    let stat = unsafe { stat.assume_init() };
    stat.st_mode & libc::S_IFMT == libc::S_IFLNK
}
