//! Read-only file system over an ISO 9660 volume.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use super::directory::{self, DirListing, WalkContext};
use super::record::DirRecord;
use super::susp::SuspEntry;
use super::volume;
use crate::error::{FsError, Result};
use crate::io::{fetch, FetchMode, ReadAt, SourceInput};
use crate::vfs::{
    normalize_path, FileSystem, FsUsage, Inode, READ_ONLY_PERMS, S_IFDIR, S_IFMT, S_IFREG,
};

/// Bound on symlink expansion during path resolution.
const MAX_LINK_DEPTH: usize = 32;

/// Case fold applied to directory-map keys and caller path components.
///
/// Plain ISO 9660 identifiers are traditionally uppercase while callers
/// write lowercase paths, so lookups fold by default; `/FOO/BAR` and
/// `/foo/bar` resolve identically either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseFold {
    #[default]
    Lower,
    Upper,
}

/// Mount options for [`IsoFs`].
pub struct IsoOptions {
    pub data: SourceInput,
    /// Mount label; falls back to the volume identifier.
    pub name: Option<String>,
    pub case_fold: CaseFold,
}

impl IsoOptions {
    pub fn new(data: impl Into<SourceInput>) -> Self {
        Self {
            data: data.into(),
            name: None,
            case_fold: CaseFold::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn case_fold(mut self, case_fold: CaseFold) -> Self {
        self.case_fold = case_fold;
        self
    }
}

/// A mounted ISO 9660 volume (with Joliet and Rock Ridge support).
pub struct IsoFs {
    source: Arc<dyn ReadAt>,
    name: Option<String>,
    volume_label: String,
    block_size: u16,
    joliet: bool,
    /// System-use skip from the root `SP` entry; `Some` iff Rock Ridge is
    /// active on this volume.
    rr_skip: Option<u8>,
    root: DirRecord,
    case_fold: CaseFold,
    /// Directory listings keyed by extent byte offset.
    listings: RwLock<HashMap<u64, Arc<DirListing>>>,
}

impl IsoFs {
    /// Backend name for registration with a host VFS.
    pub const NAME: &'static str = "iso9660";

    pub async fn mount(options: IsoOptions) -> Result<Self> {
        let source = options.data.into_source();

        let volume = volume::select_volume(source.as_ref(), FetchMode::Wait).await?;
        let mut root = DirRecord::new(volume.root_record.to_vec(), volume.joliet, None)?;

        let dot = Self::root_dot_entry(
            source.as_ref(),
            &root,
            volume.joliet,
            volume.logical_block_size,
        )
        .await?;
        let rr_skip = dot.as_ref().and_then(Self::rock_ridge_skip);
        root.set_rr_skip(rr_skip);
        if let Some(dot) = dot {
            if rr_skip.is_some() {
                // The root record embedded in the descriptor has no
                // system-use area; its PX/TF metadata lives on the extent's
                // `.` entry.
                root.set_susp(dot.into_susp());
            }
        }

        debug!(
            volume_id = %volume.volume_id,
            joliet = volume.joliet,
            rock_ridge = rr_skip.is_some(),
            "mounted iso volume"
        );

        Ok(Self {
            source,
            name: options.name,
            volume_label: volume.volume_id,
            block_size: volume.logical_block_size,
            joliet: volume.joliet,
            rr_skip,
            root,
            case_fold: options.case_fold,
            listings: RwLock::new(HashMap::new()),
        })
    }

    /// The root extent's `.` record, with its SUSP entries parsed.
    async fn root_dot_entry(
        source: &dyn ReadAt,
        root: &DirRecord,
        joliet: bool,
        block_size: u16,
    ) -> Result<Option<DirRecord>> {
        let ctx = WalkContext {
            source,
            mode: FetchMode::Wait,
            joliet,
            rr_skip: None,
            block_size,
        };
        let listing = directory::walk(
            &ctx,
            root.extent_offset(block_size),
            root.data_length(),
            |name| name.to_string(),
        )
        .await?;
        Ok(listing.dot)
    }

    /// Decide Rock Ridge once, on the root directory's `.` entry: a valid
    /// `SP` (magic `0xBE 0xEF`) followed by an `RR` marker or an `ER` that
    /// names the extension.
    fn rock_ridge_skip(dot: &DirRecord) -> Option<u8> {
        let entries = dot.susp_entries();
        let Some(SuspEntry::Sp {
            magic_ok: true,
            skip,
        }) = entries.first()
        else {
            return None;
        };

        let active = entries.iter().skip(1).any(|entry| match entry {
            SuspEntry::Rr => true,
            // mkisofs-family tools write RRIP_1991A rather than the IEEE name.
            SuspEntry::Er { identifier } => {
                identifier == "IEEE_P1282" || identifier == "RRIP_1991A"
            }
            _ => false,
        });
        active.then_some(*skip)
    }

    fn fold(&self, name: &str) -> String {
        match self.case_fold {
            CaseFold::Lower => name.to_lowercase(),
            CaseFold::Upper => name.to_uppercase(),
        }
    }

    /// The extent a directory record's children live in. A `CL`-redirected
    /// record describes a placeholder; the relocated directory's own `.`
    /// record carries the true extent length.
    async fn directory_extent(&self, record: &DirRecord, mode: FetchMode) -> Result<(u64, u32)> {
        if self.rr_skip.is_some() {
            if let Some(child_lba) = record.child_link_lba() {
                let offset = u64::from(child_lba) * u64::from(self.block_size);
                let mut header = [0u8; 14];
                fetch(self.source.as_ref(), mode, offset, &mut header).await?;
                let data_length =
                    u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
                return Ok((offset, data_length));
            }
        }
        Ok((record.extent_offset(self.block_size), record.data_length()))
    }

    async fn load_listing(&self, record: &DirRecord, mode: FetchMode) -> Result<Arc<DirListing>> {
        let (extent_offset, data_length) = self.directory_extent(record, mode).await?;
        if let Some(cached) = self.listings.read().unwrap().get(&extent_offset) {
            return Ok(Arc::clone(cached));
        }

        let ctx = WalkContext {
            source: self.source.as_ref(),
            mode,
            joliet: self.joliet,
            rr_skip: self.rr_skip,
            block_size: self.block_size,
        };
        let listing =
            directory::walk(&ctx, extent_offset, data_length, |name| self.fold(name)).await?;

        let mut cache = self.listings.write().unwrap();
        let listing = cache
            .entry(extent_offset)
            .or_insert_with(|| Arc::new(listing));
        Ok(Arc::clone(listing))
    }

    /// Walk `path` from the root, folding each caller component and
    /// expanding Rock Ridge symlinks relative to the directory they sit in.
    async fn resolve(&self, path: &str, mode: FetchMode) -> Result<DirRecord> {
        let normalized = normalize_path(path);
        let mut remaining: VecDeque<String> = normalized
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        let mut walked: Vec<String> = Vec::new();
        let mut current = self.root.clone();
        let mut link_depth = 0usize;

        while let Some(segment) = remaining.pop_front() {
            if !current.is_directory() {
                return Err(FsError::NotADirectory(normalized));
            }
            let listing = self.load_listing(&current, mode).await?;
            let child = listing
                .entries
                .get(&self.fold(&segment))
                .ok_or_else(|| FsError::NoSuchFile(normalized.clone()))?;

            if child.is_symlink() {
                link_depth += 1;
                if link_depth > MAX_LINK_DEPTH {
                    return Err(FsError::InvalidArgument(format!(
                        "{normalized}: too many levels of symbolic links"
                    )));
                }
                let target = child.symlink_path().unwrap_or_default();
                let mut segments = if target.starts_with('/') {
                    Vec::new()
                } else {
                    walked.clone()
                };
                for part in target.split('/') {
                    match part {
                        "" | "." => {}
                        ".." => {
                            segments.pop();
                        }
                        other => segments.push(other.to_string()),
                    }
                }
                // Restart from the root with the rewritten prefix.
                let mut rebuilt: VecDeque<String> = segments.into();
                rebuilt.extend(remaining.drain(..));
                remaining = rebuilt;
                walked.clear();
                current = self.root.clone();
                continue;
            }

            walked.push(segment);
            current = child.clone();
        }

        Ok(current)
    }

    fn inode_for(&self, record: &DirRecord) -> Inode {
        let default_kind = if record.is_directory() {
            S_IFDIR
        } else {
            S_IFREG
        };
        let mut mode = default_kind | READ_ONLY_PERMS;
        if let Some(px) = record.posix_attributes() {
            let kind = if px.mode & S_IFMT != 0 {
                px.mode & S_IFMT
            } else {
                default_kind
            };
            mode = kind | (px.mode & READ_ONLY_PERMS);
        }

        let recorded = record.recording_time_ms();
        let mut inode = Inode {
            mode,
            size: u64::from(record.data_length()),
            atime_ms: recorded,
            mtime_ms: recorded,
            ctime_ms: recorded,
            birthtime_ms: None,
        };
        if let Some(tf) = record.timestamps() {
            if let Some(ms) = tf.access_ms {
                inode.atime_ms = ms;
            }
            if let Some(ms) = tf.modify_ms {
                inode.mtime_ms = ms;
            }
            if let Some(ms) = tf.attributes_ms {
                inode.ctime_ms = ms;
            }
            inode.birthtime_ms = tf.creation_ms;
        }
        inode
    }

    async fn stat_inner(&self, path: &str, mode: FetchMode) -> Result<Inode> {
        let record = self.resolve(path, mode).await?;
        Ok(self.inode_for(&record))
    }

    async fn read_dir_inner(&self, path: &str, mode: FetchMode) -> Result<Vec<String>> {
        let record = self.resolve(path, mode).await?;
        if !record.is_directory() {
            return Err(FsError::NotADirectory(normalize_path(path)));
        }
        let listing = self.load_listing(&record, mode).await?;
        Ok(listing.entries.keys().cloned().collect())
    }

    async fn read_inner(
        &self,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        end: u64,
        mode: FetchMode,
    ) -> Result<usize> {
        let record = self.resolve(path, mode).await?;
        if record.is_directory() {
            return Err(FsError::IsADirectory(normalize_path(path)));
        }
        let end = end.min(u64::from(record.data_length()));
        if offset >= end {
            return Ok(0);
        }
        let len = (end - offset) as usize;
        fetch(
            self.source.as_ref(),
            mode,
            record.extent_offset(self.block_size) + offset,
            &mut buf[..len],
        )
        .await?;
        Ok(len)
    }
}

#[async_trait]
impl FileSystem for IsoFs {
    fn usage(&self) -> FsUsage {
        FsUsage {
            total_space: self.source.size(),
            free_space: 0,
        }
    }

    fn label(&self) -> Option<&str> {
        self.name.as_deref().or(Some(self.volume_label.as_str()))
    }

    async fn stat(&self, path: &str) -> Result<Inode> {
        self.stat_inner(path, FetchMode::Wait).await
    }

    fn stat_sync(&self, path: &str) -> Result<Inode> {
        // In NoWait mode the futures complete on their first poll.
        futures::executor::block_on(self.stat_inner(path, FetchMode::NoWait))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        self.read_dir_inner(path, FetchMode::Wait).await
    }

    fn read_dir_sync(&self, path: &str) -> Result<Vec<String>> {
        futures::executor::block_on(self.read_dir_inner(path, FetchMode::NoWait))
    }

    async fn read(&self, path: &str, buf: &mut [u8], offset: u64, end: u64) -> Result<usize> {
        self.read_inner(path, buf, offset, end, FetchMode::Wait).await
    }

    fn read_sync(&self, path: &str, buf: &mut [u8], offset: u64, end: u64) -> Result<usize> {
        futures::executor::block_on(self.read_inner(path, buf, offset, end, FetchMode::NoWait))
    }
}
