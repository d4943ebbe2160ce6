//! Stream-backed byte source with progressive fill.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

use super::{check_range, ReadAt};
use crate::error::{FsError, Result};

/// Feed chunk size used by [`StreamSource::from_reader`].
const FEED_CHUNK: usize = 64 * 1024;

#[derive(Clone, Copy)]
struct Progress {
    filled: u64,
    done: bool,
}

/// Byte source fed incrementally by a producer.
///
/// The total size must be declared up front: archives are parsed from fixed
/// offsets relative to it, the ZIP tail in particular. A read that lands past
/// the current watermark suspends until the producer has delivered enough
/// bytes; any number of readers may wait concurrently and resolve in
/// whatever order the watermark satisfies them.
pub struct StreamSource {
    size: u64,
    buf: Mutex<Vec<u8>>,
    progress_tx: watch::Sender<Progress>,
    progress_rx: watch::Receiver<Progress>,
}

impl StreamSource {
    pub fn new(size: u64) -> Self {
        let (progress_tx, progress_rx) = watch::channel(Progress {
            filled: 0,
            done: false,
        });
        Self {
            size,
            buf: Mutex::new(Vec::new()),
            progress_tx,
            progress_rx,
        }
    }

    /// Append a chunk delivered by the producer and wake pending readers.
    pub fn push(&self, chunk: &[u8]) {
        let filled = {
            let mut buf = self.buf.lock().unwrap();
            buf.extend_from_slice(chunk);
            buf.len() as u64
        };
        self.progress_tx.send_modify(|p| p.filled = filled);
    }

    /// Mark the stream complete. Readers still waiting past the final
    /// watermark fail with an i/o error.
    pub fn finish(&self) {
        self.progress_tx.send_modify(|p| p.done = true);
    }

    /// Number of bytes buffered so far.
    pub fn filled(&self) -> u64 {
        self.progress_rx.borrow().filled
    }

    /// Spawn a task draining `reader` into a new source of declared `size`.
    pub fn from_reader<R>(mut reader: R, size: u64) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let source = Arc::new(Self::new(size));
        let feed = Arc::clone(&source);
        tokio::spawn(async move {
            let mut chunk = vec![0u8; FEED_CHUNK];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => feed.push(&chunk[..n]),
                    Err(err) => {
                        tracing::warn!("stream source feed failed: {err}");
                        break;
                    }
                }
            }
            feed.finish();
        });
        source
    }

    fn copy_if_buffered(&self, offset: u64, buf: &mut [u8]) -> bool {
        let data = self.buf.lock().unwrap();
        if (data.len() as u64) < offset + buf.len() as u64 {
            return false;
        }
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        true
    }
}

#[async_trait]
impl ReadAt for StreamSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(self.size, offset, buf.len())?;
        let mut rx = self.progress_rx.clone();
        loop {
            let progress = *rx.borrow_and_update();
            if progress.filled >= offset + buf.len() as u64 {
                // The watermark never recedes, so the copy cannot miss.
                self.copy_if_buffered(offset, buf);
                return Ok(());
            }
            if progress.done {
                return Err(FsError::Io(format!(
                    "stream ended after {} of {} bytes",
                    progress.filled, self.size
                )));
            }
            rx.changed()
                .await
                .map_err(|_| FsError::Io("stream source closed".into()))?;
        }
    }

    fn try_read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(self.size, offset, buf.len())?;
        if self.copy_if_buffered(offset, buf) {
            Ok(())
        } else {
            Err(FsError::TryAgain)
        }
    }
}
