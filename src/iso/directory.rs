//! Directory extent enumeration.

use std::collections::BTreeMap;

use tracing::warn;

use super::record::DirRecord;
use super::susp;
use crate::error::Result;
use crate::io::{fetch, FetchMode, ReadAt};

/// The children of one directory extent, keyed by folded file name.
pub(crate) struct DirListing {
    pub entries: BTreeMap<String, DirRecord>,
    /// The `.` record; its system-use area is where `SP`/`ER` live.
    pub dot: Option<DirRecord>,
}

pub(crate) struct WalkContext<'a> {
    pub source: &'a dyn ReadAt,
    pub mode: FetchMode,
    pub joliet: bool,
    pub rr_skip: Option<u8>,
    pub block_size: u16,
}

/// Enumerate the records stored in the directory extent at `extent_offset`.
///
/// Records never straddle a sector boundary, so a zero length byte means
/// padding up to the next sector. `.` and `..` are skipped (the former is
/// captured aside), as is any record marking the old location of a
/// relocated directory. Duplicate names keep the first record.
pub(crate) async fn walk(
    ctx: &WalkContext<'_>,
    extent_offset: u64,
    data_length: u32,
    fold: impl Fn(&str) -> String,
) -> Result<DirListing> {
    let mut data = vec![0u8; data_length as usize];
    fetch(ctx.source, ctx.mode, extent_offset, &mut data).await?;

    let mut listing = DirListing {
        entries: BTreeMap::new(),
        dot: None,
    };

    let mut pos = 0usize;
    while pos < data.len() {
        if data[pos] == 0 {
            pos += 1;
            continue;
        }
        let len = data[pos] as usize;
        if pos + len > data.len() {
            warn!("directory record at offset {pos} overruns its extent");
            break;
        }
        let mut record = DirRecord::new(data[pos..pos + len].to_vec(), ctx.joliet, ctx.rr_skip)?;
        pos += len;

        let is_dot = matches!(record.identifier_bytes(), [0x00]);
        // The dot entry's SUSP area is inspected even before Rock Ridge is
        // known to be active: it is where `SP`/`ER` live.
        if ctx.rr_skip.is_some() || is_dot {
            let entries = susp::read_entries(
                ctx.source,
                ctx.mode,
                record.system_use_area(),
                ctx.block_size,
            )
            .await?;
            record.set_susp(entries);
        }

        if is_dot {
            listing.dot = Some(record);
            continue;
        }
        if matches!(record.identifier_bytes(), [0x01]) {
            continue;
        }
        if record.has_relocation_marker() {
            continue;
        }

        let name = record.file_name();
        listing.entries.entry(fold(&name)).or_insert(record);
    }

    Ok(listing)
}
