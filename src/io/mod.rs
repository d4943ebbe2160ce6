//! Random-access byte sources backing the archive decoders.
//!
//! Both decoders parse from fixed offsets (the ZIP tail in particular), so
//! the one capability they consume from their environment is a sized,
//! random-access read. Sources may hold the whole image in memory, serve it
//! from a file descriptor or an HTTP server, or accumulate it progressively
//! from a stream.

mod http;
mod local;
mod memory;
mod stream;

pub use http::HttpRangeSource;
pub use local::LocalFileSource;
pub use memory::MemorySource;
pub use stream::StreamSource;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{FsError, Result};

/// Trait for random access reading from an archive image.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Total size of the data source in bytes.
    fn size(&self) -> u64;

    /// Fill `buf` with the bytes at `offset`, suspending until a
    /// stream-backed source has buffered them. Reads outside `[0, size)`
    /// fail with [`FsError::InvalidArgument`].
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Non-suspending variant of [`read_at`](Self::read_at). Fails with
    /// [`FsError::TryAgain`] when the range is not buffered yet.
    fn try_read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Archive bytes handed to a mount call: either an owned buffer or any
/// random-access source.
pub enum SourceInput {
    Bytes(Vec<u8>),
    Source(Arc<dyn ReadAt>),
}

impl SourceInput {
    pub(crate) fn into_source(self) -> Arc<dyn ReadAt> {
        match self {
            SourceInput::Bytes(data) => Arc::new(MemorySource::new(data)),
            SourceInput::Source(source) => source,
        }
    }
}

impl From<Vec<u8>> for SourceInput {
    fn from(data: Vec<u8>) -> Self {
        SourceInput::Bytes(data)
    }
}

impl From<&[u8]> for SourceInput {
    fn from(data: &[u8]) -> Self {
        SourceInput::Bytes(data.to_vec())
    }
}

impl From<Arc<dyn ReadAt>> for SourceInput {
    fn from(source: Arc<dyn ReadAt>) -> Self {
        SourceInput::Source(source)
    }
}

impl<S: ReadAt + 'static> From<Arc<S>> for SourceInput {
    fn from(source: Arc<S>) -> Self {
        SourceInput::Source(source)
    }
}

/// Whether a parse path may suspend on the source or must fail fast with
/// [`FsError::TryAgain`]. The synchronous file-system operations run the
/// same code as the asynchronous ones in `NoWait` mode, where the returned
/// futures complete on first poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchMode {
    Wait,
    NoWait,
}

pub(crate) async fn fetch(
    source: &dyn ReadAt,
    mode: FetchMode,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    match mode {
        FetchMode::Wait => source.read_at(offset, buf).await,
        FetchMode::NoWait => source.try_read_at(offset, buf),
    }
}

pub(crate) fn check_range(size: u64, offset: u64, len: usize) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(FsError::InvalidArgument(format!(
            "read of {len} bytes at offset {offset} exceeds source size {size}"
        ))),
    }
}
