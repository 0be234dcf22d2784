//! Command implementations for the `safeopen` binary.
//!
//! Each command opens exactly one file through [`opener::open`] and streams
//! between it and the given reader or writer, so the commands can be driven
//! by stdin/stdout in the binary and by buffers in tests.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use opener::{ErrorKind, OpenError, OpenMode, OpenPolicy};
use thiserror::Error;

/// Errors produced by a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The file could not be opened.
    #[error("open failed: {0}")]
    Open(#[from] OpenError),

    /// Reading or writing an opened file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CommandError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Open(err) => exit_code(err),
            Self::Io(_) => 74,
        }
    }
}

/// Process exit code for an open failure.
///
/// Codes follow `sysexits.h` where one fits (64 usage, 74 I/O).
pub fn exit_code(err: &OpenError) -> i32 {
    match err.kind() {
        ErrorKind::NotFound => 2,
        ErrorKind::PermissionDenied => 3,
        ErrorKind::PathEscape => 4,
        ErrorKind::SymlinkRejected => 5,
        ErrorKind::NotAFile => 6,
        ErrorKind::InvalidRequest | ErrorKind::InvalidRoot | ErrorKind::InvalidPolicy => 64,
        ErrorKind::IoFailure => 74,
    }
}

/// Options for [`write`], layered over the configured policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Create the file if missing.
    pub create: bool,
    /// Truncate instead of appending.
    pub truncate: bool,
}

/// Copy the file at `request` to `out`. Returns the number of bytes copied.
pub fn cat<W: Write>(policy: &OpenPolicy, request: &Path, out: &mut W) -> Result<u64, CommandError> {
    let policy = policy.clone().mode(OpenMode::ReadOnly).truncate(false);
    let mut handle = opener::open(request, &policy)?;

    let copied = io::copy(&mut handle, out)?;
    out.flush()?;

    tracing::debug!("Copied {} bytes from {:?}", copied, handle.path());
    Ok(copied)
}

/// Open `request` read-only and return the resolved path.
///
/// The handle is released before returning.
pub fn check(policy: &OpenPolicy, request: &Path) -> Result<PathBuf, CommandError> {
    let policy = policy.clone().mode(OpenMode::ReadOnly).truncate(false);
    let handle = opener::open(request, &policy)?;
    let resolved = handle.path().to_path_buf();
    handle.close()?;
    Ok(resolved)
}

/// The line `check` prints for `result`.
pub fn check_report(result: &Result<PathBuf, CommandError>) -> String {
    match result {
        Ok(resolved) => format!("open succeeded: {}", resolved.display()),
        Err(CommandError::Open(err)) => format!("open failed: {}", err),
        Err(err) => format!("check failed: {}", err),
    }
}

/// Copy `input` into the file at `request`.
///
/// Appends unless `options.truncate` is set. The handle is closed
/// explicitly so a failing `close(2)` is reported instead of dropped.
pub fn write<R: Read>(
    policy: &OpenPolicy,
    request: &Path,
    options: WriteOptions,
    input: &mut R,
) -> Result<u64, CommandError> {
    let policy = policy
        .clone()
        .mode(OpenMode::ReadWrite)
        .create_if_missing(policy.create_if_missing || options.create)
        .truncate(policy.truncate || options.truncate);
    let mut handle = opener::open(request, &policy)?;

    if !policy.truncate {
        handle.seek(SeekFrom::End(0))?;
    }
    let written = io::copy(input, &mut handle)?;
    handle.flush()?;

    tracing::debug!("Wrote {} bytes to {:?}", written, handle.path());
    handle.close()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, OpenPolicy) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("hello.txt"), "Hello").unwrap();
        let policy = OpenPolicy::read_only(temp_dir.path());
        (temp_dir, policy)
    }

    #[test]
    fn test_cat() {
        let (_temp_dir, policy) = setup();
        let mut out = Vec::new();

        let copied = cat(&policy, Path::new("hello.txt"), &mut out).unwrap();
        assert_eq!(copied, 5);
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn test_cat_ignores_write_policy() {
        let (_temp_dir, policy) = setup();
        let policy = OpenPolicy::read_write(policy.root()).truncate(true);
        let mut out = Vec::new();

        cat(&policy, Path::new("hello.txt"), &mut out).unwrap();
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn test_cat_escape() {
        let (_temp_dir, policy) = setup();
        let mut out = Vec::new();

        let err = cat(&policy, Path::new("../hello.txt"), &mut out).unwrap_err();
        assert!(matches!(err, CommandError::Open(OpenError::PathEscape)));
        assert_eq!(err.exit_code(), 4);
        assert!(out.is_empty());
    }

    #[test]
    fn test_check() {
        let (temp_dir, policy) = setup();

        let resolved = check(&policy, Path::new("./hello.txt")).unwrap();
        assert_eq!(
            resolved,
            temp_dir.path().canonicalize().unwrap().join("hello.txt")
        );

        let err = check(&policy, Path::new("missing.txt")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_check_report() {
        let (temp_dir, policy) = setup();

        let report = check_report(&check(&policy, Path::new("hello.txt")));
        let expected = temp_dir.path().canonicalize().unwrap().join("hello.txt");
        assert_eq!(report, format!("open succeeded: {}", expected.display()));

        let report = check_report(&check(&policy, Path::new("missing.txt")));
        assert_eq!(report, "open failed: file not found");

        let report = check_report(&check(&policy, Path::new("../hello.txt")));
        assert_eq!(report, "open failed: path escapes the allowed root");
    }

    #[test]
    fn test_write_appends() {
        let (temp_dir, policy) = setup();
        let mut input: &[u8] = b", world";

        let written = write(
            &policy,
            Path::new("hello.txt"),
            WriteOptions::default(),
            &mut input,
        )
        .unwrap();

        assert_eq!(written, 7);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("hello.txt")).unwrap(),
            "Hello, world"
        );
    }

    #[test]
    fn test_write_truncates_when_asked() {
        let (temp_dir, policy) = setup();
        let mut input: &[u8] = b"race";
        let options = WriteOptions {
            truncate: true,
            ..Default::default()
        };

        write(&policy, Path::new("hello.txt"), options, &mut input).unwrap();
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("hello.txt")).unwrap(),
            "race"
        );
    }

    #[test]
    fn test_write_create() {
        let (temp_dir, policy) = setup();
        let mut input: &[u8] = b"race";

        let err = write(
            &policy,
            Path::new("new.txt"),
            WriteOptions::default(),
            &mut input,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let options = WriteOptions {
            create: true,
            ..Default::default()
        };
        write(&policy, Path::new("new.txt"), options, &mut input).unwrap();
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("new.txt")).unwrap(),
            "race"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&OpenError::NotFound), 2);
        assert_eq!(exit_code(&OpenError::PermissionDenied), 3);
        assert_eq!(exit_code(&OpenError::PathEscape), 4);
        assert_eq!(exit_code(&OpenError::SymlinkRejected), 5);
        assert_eq!(exit_code(&OpenError::NotAFile), 6);
        assert_eq!(exit_code(&OpenError::InvalidRequest("x".into())), 64);
        assert_eq!(exit_code(&OpenError::IoFailure(5)), 74);
    }
}
