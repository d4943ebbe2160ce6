use std::path::Path;

use async_trait::async_trait;

use super::{check_range, ReadAt};
use crate::error::Result;

/// Local file source with random access support.
pub struct LocalFileSource {
    file: std::fs::File,
    size: u64,
}

impl LocalFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ReadAt for LocalFileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.try_read_at(offset, buf)
    }

    // A file is always "buffered": the read happens in place.
    fn try_read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(self.size, offset, buf.len())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_exact_at(buf, offset)?;
        }

        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(buf)?;
        }

        Ok(())
    }
}
