//! HTTP Range request source for remote archive images.
//!
//! Implements random-access reading from HTTP servers using the Range
//! request header (RFC 7233), so individual files can be served out of a
//! large remote archive without downloading the whole image.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::warn;

use super::{check_range, ReadAt};
use crate::error::{FsError, Result};

/// Delay before the first retry; doubled per attempt up to [`MAX_BACKOFF`].
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(4);

/// Attempts per range request. Archive reads are small and bursty (headers,
/// central directory, one extent at a time), so the cap bounds a stalled
/// mount to a few seconds instead of hanging on a dead connection.
const RANGE_ATTEMPTS: u32 = 4;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP Range source for remote archives.
///
/// The remote server must answer Range requests with `206 Partial Content`;
/// anything else fails the probe. Transient network errors are retried with
/// a capped exponential backoff, and transfer totals are tracked for
/// bandwidth reporting.
pub struct HttpRangeSource {
    /// HTTP client with connection pooling
    client: Client,
    url: String,
    size: u64,
    /// Cumulative bytes transferred from the network
    transferred_bytes: AtomicU64,
}

/// How a failed range request should be treated.
enum RangeError {
    /// Worth retrying: timeouts, dropped connections, short bodies.
    Transient(String),
    /// The server will keep giving the same answer.
    Fatal(String),
}

impl HttpRangeSource {
    /// Probe `url` with a one-byte range request. A `206 Partial Content`
    /// answer both proves Range support and carries the total image size in
    /// its `Content-Range` header, which some servers omit from HEAD
    /// responses.
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FsError::Io(e.to_string()))?;

        let resp = client
            .get(&url)
            .header("Range", "bytes=0-0")
            .send()
            .await
            .map_err(|e| FsError::Io(e.to_string()))?;

        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(FsError::Io(format!(
                "remote server does not answer Range requests (status {})",
                resp.status()
            )));
        }

        let size = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| {
                FsError::Io("remote server sent no usable Content-Range header".into())
            })?;

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
        })
    }

    /// Cumulative bytes received from the server.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// One attempt at filling `buf` from the given `Range` header value.
    async fn fetch_range(&self, range: &str, buf: &mut [u8]) -> std::result::Result<(), RangeError> {
        let resp = self
            .client
            .get(&self.url)
            .header("Range", range)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    RangeError::Transient(e.to_string())
                } else {
                    RangeError::Fatal(e.to_string())
                }
            })?;

        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(RangeError::Fatal(format!(
                "range request answered with status {}",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| RangeError::Transient(e.to_string()))?;
        if body.len() != buf.len() {
            // A short body usually means the connection dropped mid-transfer.
            return Err(RangeError::Transient(format!(
                "short range response: {} of {} bytes",
                body.len(),
                buf.len()
            )));
        }

        buf.copy_from_slice(&body);
        self.transferred_bytes
            .fetch_add(body.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Total size from a `Content-Range: bytes 0-0/1234` header value.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl ReadAt for HttpRangeSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(self.size, offset, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }

        let range = format!("bytes={}-{}", offset, offset + buf.len() as u64 - 1);
        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=RANGE_ATTEMPTS {
            match self.fetch_range(&range, buf).await {
                Ok(()) => return Ok(()),
                Err(RangeError::Fatal(msg)) => return Err(FsError::Io(msg)),
                Err(RangeError::Transient(msg)) => {
                    last_error = msg;
                    if attempt < RANGE_ATTEMPTS {
                        warn!(
                            "range request failed (attempt {attempt}/{RANGE_ATTEMPTS}): {last_error}"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }

        Err(FsError::Io(format!(
            "range request failed after {RANGE_ATTEMPTS} attempts: {last_error}"
        )))
    }

    // There is no local buffer to satisfy a synchronous read from.
    fn try_read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(self.size, offset, buf.len())?;
        Err(FsError::TryAgain)
    }
}
