use std::io;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for pack/unpack operations.
///
/// `InvalidInput` and `Filesystem` are rejected before a worker is spawned;
/// the remaining variants classify failures of the running task.
#[derive(Error, Debug)]
pub enum PackdirError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("cannot prepare '{}': {reason}", path.display())]
    Filesystem { path: PathBuf, reason: String },

    #[error("'{}' is not a readable archive: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied: '{}'", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("unknown error: {reason}")]
    Unknown { reason: String },
}

pub type Result<T> = std::result::Result<T, PackdirError>;

/// Classify a raw I/O failure against the path it occurred on.
///
/// Decoder streams surface corruption as `InvalidData`, `InvalidInput` or
/// `UnexpectedEof`, so those map to `Format`; everything unrecognized is
/// passed through as `Unknown` with the original message.
pub fn classify_io(error: io::Error, path: &Path) -> PackdirError {
    match error.kind() {
        io::ErrorKind::NotFound => PackdirError::NotFound {
            path: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => PackdirError::PermissionDenied {
            path: path.to_path_buf(),
        },
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            PackdirError::Format {
                path: path.to_path_buf(),
                reason: error.to_string(),
            }
        }
        _ => PackdirError::Unknown {
            reason: error.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_io_maps_common_kinds() {
        let path = Path::new("/tmp/archive.zip");

        let not_found = classify_io(io::Error::new(io::ErrorKind::NotFound, "gone"), path);
        assert!(matches!(not_found, PackdirError::NotFound { .. }));

        let denied = classify_io(io::Error::new(io::ErrorKind::PermissionDenied, "no"), path);
        assert!(matches!(denied, PackdirError::PermissionDenied { .. }));

        let corrupt = classify_io(io::Error::new(io::ErrorKind::InvalidData, "bad gzip"), path);
        assert!(matches!(corrupt, PackdirError::Format { .. }));

        let truncated = classify_io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"), path);
        assert!(matches!(truncated, PackdirError::Format { .. }));

        let other = classify_io(io::Error::other("odd"), path);
        assert!(matches!(other, PackdirError::Unknown { .. }));
    }

    #[test]
    fn test_error_messages_carry_paths() {
        let err = PackdirError::NotFound {
            path: PathBuf::from("/data/missing"),
        };
        assert_eq!(err.to_string(), "not found: '/data/missing'");
    }
}
