//! Storage errors
//!
//! Failures of the snapshot file and the template cache. I/O errors are
//! classified by kind so the CLI can print a hint next to the message.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Permission denied for '{path}'")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No space left while writing '{path}'")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The snapshot did not parse; it was moved aside to `backup_path`
    #[error("Workspace snapshot '{path}' is unreadable ({details}); moved to '{backup_path}'")]
    CorruptSnapshot {
        path: PathBuf,
        backup_path: PathBuf,
        details: String,
    },

    #[error("Cannot encode cache entry '{path}': {details}")]
    Encode { path: PathBuf, details: String },

    #[error("'{path}' does not exist")]
    NotFound { path: PathBuf },

    /// The temp file was written but could not replace the target
    #[error("Cannot move '{from}' into place at '{to}': {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Classify a failed read of `path`
    pub fn from_read_io(error: io::Error, path: PathBuf) -> Self {
        classify(error, path, |path, source| StorageError::Read { path, source })
    }

    /// Classify a failed write of `path`
    pub fn from_write_io(error: io::Error, path: PathBuf) -> Self {
        classify(error, path, |path, source| {
            if is_out_of_space(&source) {
                StorageError::DiskFull { path, source }
            } else {
                StorageError::Write { path, source }
            }
        })
    }

    /// What the user can do about it, if anything
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => {
                Some("free some disk space; unsent edits are kept in memory until then")
            }
            StorageError::PermissionDenied { .. } | StorageError::CreateDirectory { .. } => {
                Some("check permissions of the data directory (wsync config show)")
            }
            StorageError::CorruptSnapshot { .. } => {
                Some("the next sync fetches the workspaces again; unsent edits may survive in the backup")
            }
            _ => None,
        }
    }
}

fn classify(
    error: io::Error,
    path: PathBuf,
    otherwise: impl FnOnce(PathBuf, io::Error) -> StorageError,
) -> StorageError {
    match error.kind() {
        io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
            path,
            source: error,
        },
        io::ErrorKind::NotFound => StorageError::NotFound { path },
        _ => otherwise(path, error),
    }
}

// Matched on the message; the error kind differs per platform.
fn is_out_of_space(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_has_hint() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_write_io(io_err, PathBuf::from("/data/workspaces.json"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.hint().is_some());
        assert!(err.to_string().contains("/data/workspaces.json"));
    }

    #[test]
    fn test_read_failure() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated");
        let err = StorageError::from_read_io(io_err, PathBuf::from("/cache/42.cbor"));
        assert!(matches!(err, StorageError::Read { .. }));
        assert_eq!(err.hint(), None);

        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = StorageError::from_read_io(io_err, PathBuf::from("/cache/42.cbor"));
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_out_of_space() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_write_io(io_err, PathBuf::from("/full/disk"));
        assert!(matches!(err, StorageError::DiskFull { .. }));

        // Reads never report a full disk
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_read_io(io_err, PathBuf::from("/full/disk"));
        assert!(matches!(err, StorageError::Read { .. }));
    }

    #[test]
    fn test_corrupt_snapshot_message() {
        let err = StorageError::CorruptSnapshot {
            path: PathBuf::from("/data/workspaces.json"),
            backup_path: PathBuf::from("/data/workspaces.json.corrupt.backup"),
            details: "expected value at line 1".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("unreadable"));
        assert!(msg.contains("corrupt.backup"));
        assert!(err.hint().is_some());
    }
}
