//! Error types shared by every archive file system.

use thiserror::Error;

/// Result type for archive file-system operations.
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors surfaced by mounts and by the read operations.
///
/// The kinds mirror the POSIX errno family a host VFS layer expects to map
/// them onto.
#[derive(Debug, Error)]
pub enum FsError {
    /// Malformed header, bad signature, or an archive feature this crate
    /// does not support (ZIP64, spanning, unknown compression).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The archive has no usable structure to mount, or the source failed.
    #[error("i/o error: {0}")]
    Io(String),

    #[error("no such file or directory: {0}")]
    NoSuchFile(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// A directory exists in the tree but has no backing entry to list.
    #[error("no data: {0}")]
    NoData(String),

    /// Any mutating operation; archives are read-only.
    #[error("permission denied: read-only file system")]
    PermissionDenied,

    /// A synchronous operation hit a byte range its stream-backed source
    /// has not buffered yet.
    #[error("resource temporarily unavailable")]
    TryAgain,
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        FsError::Io(err.to_string())
    }
}
