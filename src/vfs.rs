//! The read-only file-system contract exposed to a host VFS layer.

use async_trait::async_trait;

use crate::error::{FsError, Result};

/// POSIX file-type bits.
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;
/// Mask selecting the file-type bits of a mode.
pub const S_IFMT: u32 = 0o170000;

/// Permission mask applied to every exposed inode: read and execute only.
pub const READ_ONLY_PERMS: u32 = 0o555;

/// Metadata for one file or directory inside a mounted archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    /// File type and permission bits; write bits are always masked out.
    pub mode: u32,
    pub size: u64,
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    /// Creation time, when the archive records one.
    pub birthtime_ms: Option<i64>,
}

impl Inode {
    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }
}

/// Space accounting for a mounted archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsUsage {
    /// The archive byte length.
    pub total_space: u64,
    /// Always zero; archives never grow.
    pub free_space: u64,
}

/// Read-only file system over an archive image.
///
/// Paths are absolute and `/`-separated. The synchronous variants run the
/// same code as the asynchronous ones; over a stream-backed source they may
/// fail with [`FsError::TryAgain`] until the needed bytes have arrived.
#[async_trait]
pub trait FileSystem: Send + Sync {
    fn usage(&self) -> FsUsage;

    /// The mount name or volume label.
    fn label(&self) -> Option<&str>;

    async fn stat(&self, path: &str) -> Result<Inode>;
    fn stat_sync(&self, path: &str) -> Result<Inode>;

    /// Names of the immediate children of the directory at `path`.
    async fn read_dir(&self, path: &str) -> Result<Vec<String>>;
    fn read_dir_sync(&self, path: &str) -> Result<Vec<String>>;

    /// Copy the byte range `[offset, end)` of the file at `path` into `buf`,
    /// returning the number of bytes copied. `end` is clamped to the file
    /// size; `buf` must hold at least the clamped range.
    async fn read(&self, path: &str, buf: &mut [u8], offset: u64, end: u64) -> Result<usize>;
    fn read_sync(&self, path: &str, buf: &mut [u8], offset: u64, end: u64) -> Result<usize>;

    // Archives are immutable; every mutating operation is denied.

    async fn write(&self, _path: &str, _buf: &[u8], _offset: u64) -> Result<usize> {
        Err(FsError::PermissionDenied)
    }

    async fn create(&self, _path: &str, _mode: u32) -> Result<()> {
        Err(FsError::PermissionDenied)
    }

    async fn mkdir(&self, _path: &str, _mode: u32) -> Result<()> {
        Err(FsError::PermissionDenied)
    }

    async fn unlink(&self, _path: &str) -> Result<()> {
        Err(FsError::PermissionDenied)
    }

    async fn rmdir(&self, _path: &str) -> Result<()> {
        Err(FsError::PermissionDenied)
    }

    async fn rename(&self, _from: &str, _to: &str) -> Result<()> {
        Err(FsError::PermissionDenied)
    }
}

/// Strip a trailing separator and guarantee a leading one, so `/a/b/`,
/// `a/b` and `/a/b` all address the same entry.
pub(crate) fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Split an absolute path into its parent directory and basename.
pub(crate) fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("/", path),
    }
}
