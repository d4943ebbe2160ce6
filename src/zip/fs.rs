//! Read-only file system over a PKZIP central directory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use super::decompress::DecompressorRegistry;
use super::structures::{
    CentralDirectoryEntry, EndOfCentralDirectory, LocalFileHeader, FLAG_ENCRYPTED,
};
use crate::error::{FsError, Result};
use crate::io::{fetch, FetchMode, ReadAt, SourceInput};
use crate::vfs::{
    normalize_path, split_path, FileSystem, FsUsage, Inode, READ_ONLY_PERMS, S_IFDIR, S_IFREG,
};

/// Furthest the EOCD can sit from the tail: 22 fixed bytes plus the largest
/// possible archive comment.
const EOCD_SEARCH_SPAN: u64 = EndOfCentralDirectory::SIZE as u64 + 65535;

/// Size reported for synthesized directory inodes.
const SYNTHETIC_DIR_SIZE: u64 = 4096;

/// Mount options for [`ZipFs`].
pub struct ZipOptions {
    pub data: SourceInput,
    /// Mount label surfaced through [`FileSystem::label`].
    pub name: Option<String>,
    /// Defer decompression until an entry is first read. The default mount
    /// resolves every entry up front so later reads never touch the source.
    pub lazy: bool,
    /// Replacement decompressor registry; defaults to STORE + DEFLATE.
    pub decompressors: Option<DecompressorRegistry>,
}

impl ZipOptions {
    pub fn new(data: impl Into<SourceInput>) -> Self {
        Self {
            data: data.into(),
            name: None,
            lazy: false,
            decompressors: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn decompressors(mut self, registry: DecompressorRegistry) -> Self {
        self.decompressors = Some(registry);
        self
    }
}

/// A mounted ZIP archive.
///
/// The central directory is the authoritative index: local headers are only
/// consulted to locate each entry's compressed bytes. Directories that exist
/// merely as prefixes of entry paths are synthesized into the tree.
pub struct ZipFs {
    source: Arc<dyn ReadAt>,
    name: Option<String>,
    /// Absolute path (`/a/b.txt`) to its central-directory entry.
    entries: BTreeMap<String, CentralDirectoryEntry>,
    /// Absolute directory path to the set of immediate child basenames.
    directories: BTreeMap<String, BTreeSet<String>>,
    contents: RwLock<HashMap<String, Arc<Vec<u8>>>>,
    registry: DecompressorRegistry,
    mount_time_ms: i64,
    lazy: bool,
}

impl ZipFs {
    /// Backend name for registration with a host VFS.
    pub const NAME: &'static str = "zip";

    /// Mount an archive. Completes only once the EOCD and the full central
    /// directory have been read (and, unless `lazy`, every entry's contents
    /// resolved).
    pub async fn mount(options: ZipOptions) -> Result<Self> {
        let source = options.data.into_source();

        let eocd = Self::find_eocd(source.as_ref()).await?;
        eocd.check()?;
        debug!(
            entries = eocd.total_entries,
            cd_offset = eocd.cd_offset,
            "walking central directory"
        );

        let mut cd = vec![0u8; eocd.cd_size as usize];
        source.read_at(u64::from(eocd.cd_offset), &mut cd).await?;

        let mut entries = BTreeMap::new();
        let mut pos = 0usize;
        while pos + CentralDirectoryEntry::FIXED_SIZE <= cd.len() {
            let entry = CentralDirectoryEntry::parse(&cd[pos..])?;
            pos += entry.record_len;
            entries.entry(format!("/{}", entry.name)).or_insert(entry);
        }

        let directories = Self::synthesize_directories(&entries);

        let fs = Self {
            source,
            name: options.name,
            entries,
            directories,
            contents: RwLock::new(HashMap::new()),
            registry: options.decompressors.unwrap_or_default(),
            mount_time_ms: now_ms(),
            lazy: options.lazy,
        };

        if !fs.lazy {
            let paths: Vec<String> = fs
                .entries
                .iter()
                .filter(|(_, e)| !e.is_directory)
                .map(|(p, _)| p.clone())
                .collect();
            for path in paths {
                fs.load_contents(&path, FetchMode::Wait).await?;
            }
        }

        Ok(fs)
    }

    /// Locate the EOCD by scanning backward from `size - 22` across at most
    /// the 64 KiB a trailing comment can occupy.
    async fn find_eocd(source: &dyn ReadAt) -> Result<EndOfCentralDirectory> {
        let size = source.size();
        if size < EndOfCentralDirectory::SIZE as u64 {
            return Err(FsError::Io(
                "archive too small for an end of central directory record".into(),
            ));
        }

        let span = EOCD_SEARCH_SPAN.min(size);
        let start = size - span;
        let mut tail = vec![0u8; span as usize];
        source.read_at(start, &mut tail).await?;

        // Backward from `size - 22`. A candidate only counts when its
        // comment-length field spans exactly the remaining bytes, so a
        // signature embedded in the comment cannot shadow the real record.
        for pos in (0..=tail.len() - EndOfCentralDirectory::SIZE).rev() {
            if &tail[pos..pos + 4] == EndOfCentralDirectory::SIGNATURE {
                let comment_len = u16::from_le_bytes([tail[pos + 20], tail[pos + 21]]) as usize;
                if pos + EndOfCentralDirectory::SIZE + comment_len == tail.len() {
                    return EndOfCentralDirectory::parse(&tail[pos..]);
                }
            }
        }

        Err(FsError::Io(
            "end of central directory record not found".into(),
        ))
    }

    /// Build the directory tree from the flat entry paths: every strict
    /// prefix of an entry path becomes a directory, each holding the set of
    /// its immediate child basenames.
    fn synthesize_directories(
        entries: &BTreeMap<String, CentralDirectoryEntry>,
    ) -> BTreeMap<String, BTreeSet<String>> {
        let mut directories: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        directories.insert("/".to_string(), BTreeSet::new());

        for (path, entry) in entries {
            if entry.is_directory {
                directories.entry(path.clone()).or_default();
            }
            let mut child = path.as_str();
            loop {
                let (dir, base) = split_path(child);
                if !base.is_empty() {
                    directories
                        .entry(dir.to_string())
                        .or_default()
                        .insert(base.to_string());
                }
                if dir == "/" {
                    break;
                }
                child = dir;
            }
        }

        directories
    }

    /// Resolve an entry's uncompressed bytes, caching the result.
    async fn load_contents(&self, path: &str, mode: FetchMode) -> Result<Arc<Vec<u8>>> {
        if let Some(cached) = self.contents.read().unwrap().get(path) {
            return Ok(Arc::clone(cached));
        }

        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| FsError::NoSuchFile(path.to_string()))?;
        if entry.flags & FLAG_ENCRYPTED != 0 {
            return Err(FsError::InvalidArgument(format!(
                "{path}: encrypted entries are not supported"
            )));
        }

        // The local header's variable fields place the compressed bytes.
        let mut header = vec![0u8; LocalFileHeader::SIZE];
        fetch(
            self.source.as_ref(),
            mode,
            u64::from(entry.header_offset),
            &mut header,
        )
        .await?;
        let local = LocalFileHeader::parse(&header)?;
        let data_offset = u64::from(entry.header_offset) + local.data_offset();

        let mut compressed = vec![0u8; entry.compressed_size as usize];
        fetch(self.source.as_ref(), mode, data_offset, &mut compressed).await?;

        let data = self.registry.decompress(
            entry.compression_method,
            &compressed,
            u64::from(entry.uncompressed_size),
            entry.flags,
        )?;

        let mut cache = self.contents.write().unwrap();
        let data = cache
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(data));
        Ok(Arc::clone(data))
    }

    fn stat_inner(&self, path: &str) -> Result<Inode> {
        let path = normalize_path(path);

        if self.directories.contains_key(&path) {
            return Ok(Inode {
                mode: S_IFDIR | READ_ONLY_PERMS,
                size: SYNTHETIC_DIR_SIZE,
                atime_ms: now_ms(),
                mtime_ms: self.mount_time_ms,
                ctime_ms: self.mount_time_ms,
                birthtime_ms: Some(self.mount_time_ms),
            });
        }

        if let Some(entry) = self.entries.get(&path) {
            let kind = if entry.is_directory { S_IFDIR } else { S_IFREG };
            return Ok(Inode {
                mode: kind | READ_ONLY_PERMS,
                size: u64::from(entry.uncompressed_size),
                atime_ms: self.mount_time_ms,
                mtime_ms: entry.last_modified_ms,
                ctime_ms: entry.last_modified_ms,
                birthtime_ms: None,
            });
        }

        Err(FsError::NoSuchFile(path))
    }

    fn read_dir_inner(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize_path(path);
        let inode = self.stat_inner(&path)?;
        if !inode.is_directory() {
            return Err(FsError::NotADirectory(path));
        }
        match self.directories.get(&path) {
            Some(children) => Ok(children.iter().cloned().collect()),
            None => Err(FsError::NoData(path)),
        }
    }

    async fn read_inner(
        &self,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        end: u64,
        mode: FetchMode,
    ) -> Result<usize> {
        let path = normalize_path(path);

        let entry = match self.entries.get(&path) {
            Some(entry) => entry,
            None if self.directories.contains_key(&path) => {
                return Err(FsError::IsADirectory(path));
            }
            None => return Err(FsError::NoSuchFile(path)),
        };
        if entry.is_directory {
            return Err(FsError::IsADirectory(path));
        }

        let data = self.load_contents(&path, mode).await?;
        let end = end.min(data.len() as u64);
        if offset >= end {
            return Ok(0);
        }
        let slice = &data[offset as usize..end as usize];
        buf[..slice.len()].copy_from_slice(slice);
        Ok(slice.len())
    }
}

#[async_trait]
impl FileSystem for ZipFs {
    fn usage(&self) -> FsUsage {
        FsUsage {
            total_space: self.source.size(),
            free_space: 0,
        }
    }

    fn label(&self) -> Option<&str> {
        self.name.as_deref()
    }

    async fn stat(&self, path: &str) -> Result<Inode> {
        self.stat_inner(path)
    }

    fn stat_sync(&self, path: &str) -> Result<Inode> {
        self.stat_inner(path)
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        self.read_dir_inner(path)
    }

    fn read_dir_sync(&self, path: &str) -> Result<Vec<String>> {
        self.read_dir_inner(path)
    }

    async fn read(&self, path: &str, buf: &mut [u8], offset: u64, end: u64) -> Result<usize> {
        self.read_inner(path, buf, offset, end, FetchMode::Wait).await
    }

    fn read_sync(&self, path: &str, buf: &mut [u8], offset: u64, end: u64) -> Result<usize> {
        // In NoWait mode the future completes on its first poll.
        futures::executor::block_on(self.read_inner(path, buf, offset, end, FetchMode::NoWait))
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
