//! Owned handle to a safely opened file.

use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::{OpenError, Result};
use crate::policy::OpenMode;

/// An open regular file inside the allowed root.
///
/// The handle owns exactly one descriptor. It is closed when the handle is
/// dropped or when [`FileHandle::close`] is called, whichever comes first.
/// The handle cannot be cloned and never duplicates its descriptor.
#[derive(Debug)]
pub struct FileHandle {
    file: File,
    path: PathBuf,
    mode: OpenMode,
}

impl FileHandle {
    pub(crate) fn new(fd: OwnedFd, path: PathBuf, mode: OpenMode) -> Self {
        Self {
            file: File::from(fd),
            path,
            mode,
        }
    }

    /// Resolved path of the file, below the canonical root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the file was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Metadata of the open file (`fstat`, not a path lookup).
    pub fn metadata(&self) -> Result<Metadata> {
        Ok(self.file.metadata()?)
    }

    /// Read from the current offset to end of file.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Flush file contents and metadata to disk.
    pub fn sync_all(&self) -> Result<()> {
        Ok(self.file.sync_all()?)
    }

    /// Close the descriptor and report the result of `close(2)`.
    ///
    /// The descriptor is released even when an error is returned; it must
    /// not be closed again, so there is no retry on `EINTR`.
    pub fn close(self) -> Result<()> {
        let fd = self.file.into_raw_fd();
        // SAFETY: `fd` came out of the owned `File` and is closed exactly once.
        if unsafe { libc::close(fd) } == -1 {
            return Err(OpenError::from(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl AsFd for FileHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for FileHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
