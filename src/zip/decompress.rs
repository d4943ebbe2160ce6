//! Pluggable decompressor registry.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::DeflateDecoder;

use crate::error::{FsError, Result};

/// ZIP method 0: stored without compression.
pub const METHOD_STORE: u16 = 0;
/// ZIP method 8: raw DEFLATE.
pub const METHOD_DEFLATE: u16 = 8;

/// Decompression callback: compressed bytes, expected uncompressed size,
/// and the entry's general-purpose flags.
pub type DecompressFn = Box<dyn Fn(&[u8], u64, u16) -> Result<Vec<u8>> + Send + Sync>;

/// Registry mapping ZIP compression methods to decompressors.
///
/// Owned by each mounted archive, never process-global, so callers can
/// extend one mount with extra methods without affecting another.
pub struct DecompressorRegistry {
    methods: HashMap<u16, DecompressFn>,
}

impl DecompressorRegistry {
    /// Registry with the two methods every reader must support.
    pub fn new() -> Self {
        let mut registry = Self {
            methods: HashMap::new(),
        };
        registry.register(METHOD_STORE, Box::new(|data, _size, _flags| Ok(data.to_vec())));
        registry.register(
            METHOD_DEFLATE,
            Box::new(|data, uncompressed_size, _flags| {
                // ZIP carries raw DEFLATE, not zlib or gzip wrapped.
                let mut decoder = DeflateDecoder::new(data);
                let mut out = Vec::with_capacity(uncompressed_size as usize);
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| FsError::InvalidArgument(format!("deflate stream: {e}")))?;
                Ok(out)
            }),
        );
        registry
    }

    pub fn register(&mut self, method: u16, decompress: DecompressFn) {
        self.methods.insert(method, decompress);
    }

    pub fn decompress(
        &self,
        method: u16,
        data: &[u8],
        uncompressed_size: u64,
        flags: u16,
    ) -> Result<Vec<u8>> {
        let decompress = self.methods.get(&method).ok_or_else(|| {
            FsError::InvalidArgument(format!("unsupported compression method: {method}"))
        })?;
        decompress(data, uncompressed_size, flags)
    }
}

impl Default for DecompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
