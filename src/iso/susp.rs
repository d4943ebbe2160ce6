//! System Use Sharing Protocol entries and the Rock Ridge vocabulary.
//!
//! Every directory record may carry a chain of SUSP entries in its trailing
//! system-use area. Each entry is `signature(2) | length(1) | version(1) |
//! payload`; a `CE` entry points at a continuation area elsewhere in the
//! image holding further entries. Rock Ridge (IEEE P1282) defines the
//! entries that give the volume POSIX semantics.

use std::collections::VecDeque;

use tracing::warn;

use crate::codec;
use crate::error::{FsError, Result};
use crate::io::{fetch, FetchMode, ReadAt};

/// `NM` flag bits.
pub const NM_CONTINUE: u8 = 1 << 0;
pub const NM_CURRENT: u8 = 1 << 1;
pub const NM_PARENT: u8 = 1 << 2;

/// `SL` component flag bits.
pub const SL_CONTINUE: u8 = 1 << 0;
pub const SL_CURRENT: u8 = 1 << 1;
pub const SL_PARENT: u8 = 1 << 2;
pub const SL_ROOT: u8 = 1 << 3;

/// `TF` flag bits gating which timestamps are recorded.
pub const TF_CREATION: u8 = 1 << 0;
pub const TF_MODIFY: u8 = 1 << 1;
pub const TF_ACCESS: u8 = 1 << 2;
pub const TF_ATTRIBUTES: u8 = 1 << 3;
pub const TF_BACKUP: u8 = 1 << 4;
pub const TF_EXPIRATION: u8 = 1 << 5;
pub const TF_EFFECTIVE: u8 = 1 << 6;
pub const TF_LONG_FORM: u8 = 1 << 7;

/// Bound on chained continuation areas; crafted images can loop them.
const MAX_CONTINUATION_AREAS: usize = 32;

#[derive(Debug, Clone)]
pub enum SuspEntry {
    /// SUSP presence marker, carried by the root `.` entry.
    Sp { magic_ok: bool, skip: u8 },
    /// Terminator; nothing follows in this area.
    St,
    /// Extension reference; Rock Ridge announces itself here.
    Er { identifier: String },
    Es,
    /// Legacy Rock Ridge marker.
    Rr,
    Px(PosixEntry),
    Pn { device_high: u32, device_low: u32 },
    Sl(SymlinkEntry),
    Nm(NameEntry),
    /// Relocated directory: the child's true extent.
    Cl { child_lba: u32 },
    Pl { parent_lba: u32 },
    /// Marks the original location of a relocated directory.
    Re,
    Tf(TimestampsEntry),
    Unknown { signature: [u8; 2] },
}

/// `PX`: POSIX mode, link count and ownership.
#[derive(Debug, Clone)]
pub struct PosixEntry {
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub inode: Option<u32>,
}

/// `NM`: one link of an alternate-name chain.
#[derive(Debug, Clone)]
pub struct NameEntry {
    pub flags: u8,
    pub name: String,
}

/// `SL`: one link of a symlink-target chain.
#[derive(Debug, Clone)]
pub struct SymlinkEntry {
    pub flags: u8,
    pub components: Vec<SlComponent>,
}

#[derive(Debug, Clone)]
pub struct SlComponent {
    pub flags: u8,
    pub content: String,
}

/// `TF`: the timestamps the file system surfaces.
#[derive(Debug, Clone, Default)]
pub struct TimestampsEntry {
    pub creation_ms: Option<i64>,
    pub modify_ms: Option<i64>,
    pub access_ms: Option<i64>,
    pub attributes_ms: Option<i64>,
}

/// Parse the SUSP entries of one system-use area, following `CE`
/// continuations through the byte source.
///
/// An unreadable continuation truncates the list to what was gathered so
/// far instead of failing the caller; real images occasionally over-reserve
/// these areas.
pub(crate) async fn read_entries(
    source: &dyn ReadAt,
    mode: FetchMode,
    area: &[u8],
    block_size: u16,
) -> Result<Vec<SuspEntry>> {
    let mut entries = Vec::new();
    let mut continuations = VecDeque::new();
    parse_area(area, block_size, &mut entries, &mut continuations);

    let mut followed = 0;
    while let Some((offset, len)) = continuations.pop_front() {
        followed += 1;
        if followed > MAX_CONTINUATION_AREAS {
            warn!("continuation chain exceeds {MAX_CONTINUATION_AREAS} areas, truncating");
            break;
        }
        let mut area = vec![0u8; len];
        match fetch(source, mode, offset, &mut area).await {
            Ok(()) => parse_area(&area, block_size, &mut entries, &mut continuations),
            Err(FsError::TryAgain) => return Err(FsError::TryAgain),
            Err(err) => {
                warn!("unreadable continuation area at offset {offset}: {err}");
                break;
            }
        }
    }

    Ok(entries)
}

fn parse_area(
    area: &[u8],
    block_size: u16,
    entries: &mut Vec<SuspEntry>,
    continuations: &mut VecDeque<(u64, usize)>,
) {
    let mut pos = 0usize;
    while area.len().saturating_sub(pos) >= 4 {
        let len = area[pos + 2] as usize;
        if len < 4 || pos + len > area.len() {
            // A short tail is padding, not an error.
            break;
        }
        let signature = [area[pos], area[pos + 1]];
        let body = &area[pos + 4..pos + len];
        pos += len;

        match &signature {
            b"ST" => {
                entries.push(SuspEntry::St);
                return;
            }
            b"CE" => {
                if body.len() >= 24 {
                    let extent = u32_le(body, 0);
                    let offset = u32_le(body, 8);
                    let size = u32_le(body, 16);
                    continuations.push_back((
                        u64::from(extent) * u64::from(block_size) + u64::from(offset),
                        size as usize,
                    ));
                }
            }
            b"SP" => entries.push(SuspEntry::Sp {
                magic_ok: body.len() >= 2 && body[0] == 0xBE && body[1] == 0xEF,
                skip: body.get(2).copied().unwrap_or(0),
            }),
            b"ER" => {
                let id_len = body.first().copied().unwrap_or(0) as usize;
                let identifier = body
                    .get(4..4 + id_len)
                    .map(codec::decode_utf8)
                    .unwrap_or_default();
                entries.push(SuspEntry::Er { identifier });
            }
            b"ES" => entries.push(SuspEntry::Es),
            b"RR" => entries.push(SuspEntry::Rr),
            b"PX" => {
                if body.len() >= 32 {
                    entries.push(SuspEntry::Px(PosixEntry {
                        mode: u32_le(body, 0),
                        nlink: u32_le(body, 8),
                        uid: u32_le(body, 16),
                        gid: u32_le(body, 24),
                        inode: (body.len() >= 40).then(|| u32_le(body, 32)),
                    }));
                }
            }
            b"PN" => {
                if body.len() >= 16 {
                    entries.push(SuspEntry::Pn {
                        device_high: u32_le(body, 0),
                        device_low: u32_le(body, 8),
                    });
                }
            }
            b"SL" => entries.push(SuspEntry::Sl(parse_sl(body))),
            b"NM" => entries.push(SuspEntry::Nm(NameEntry {
                flags: body.first().copied().unwrap_or(0),
                name: codec::decode_utf8(body.get(1..).unwrap_or_default()),
            })),
            b"CL" => {
                if body.len() >= 8 {
                    entries.push(SuspEntry::Cl {
                        child_lba: u32_le(body, 0),
                    });
                }
            }
            b"PL" => {
                if body.len() >= 8 {
                    entries.push(SuspEntry::Pl {
                        parent_lba: u32_le(body, 0),
                    });
                }
            }
            b"RE" => entries.push(SuspEntry::Re),
            b"TF" => entries.push(SuspEntry::Tf(parse_tf(body))),
            _ => entries.push(SuspEntry::Unknown { signature }),
        }
    }
}

fn parse_sl(body: &[u8]) -> SymlinkEntry {
    let flags = body.first().copied().unwrap_or(0);
    let mut components = Vec::new();
    let mut pos = 1usize;
    while body.len().saturating_sub(pos) >= 2 {
        let cflags = body[pos];
        let clen = body[pos + 1] as usize;
        if pos + 2 + clen > body.len() {
            break;
        }
        components.push(SlComponent {
            flags: cflags,
            content: codec::decode_utf8(&body[pos + 2..pos + 2 + clen]),
        });
        pos += 2 + clen;
    }
    SymlinkEntry { flags, components }
}

fn parse_tf(body: &[u8]) -> TimestampsEntry {
    let mut tf = TimestampsEntry::default();
    let Some(&flags) = body.first() else {
        return tf;
    };
    let long_form = flags & TF_LONG_FORM != 0;
    let stamp_len = if long_form { 17 } else { 7 };

    let mut pos = 1usize;
    for bit in [
        TF_CREATION,
        TF_MODIFY,
        TF_ACCESS,
        TF_ATTRIBUTES,
        TF_BACKUP,
        TF_EXPIRATION,
        TF_EFFECTIVE,
    ] {
        if flags & bit == 0 {
            continue;
        }
        if body.len() < pos + stamp_len {
            break;
        }
        let stamp = &body[pos..pos + stamp_len];
        pos += stamp_len;
        let ms = if long_form {
            codec::iso_long_datetime_ms(stamp)
        } else {
            codec::iso_short_datetime_ms(stamp)
        };
        match bit {
            TF_CREATION => tf.creation_ms = Some(ms),
            TF_MODIFY => tf.modify_ms = Some(ms),
            TF_ACCESS => tf.access_ms = Some(ms),
            TF_ATTRIBUTES => tf.attributes_ms = Some(ms),
            // Backup, expiration and effective times have no inode slot.
            _ => {}
        }
    }
    tf
}

/// Read the LE half of a both-endian 32-bit field.
fn u32_le(body: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        body[offset],
        body[offset + 1],
        body[offset + 2],
        body[offset + 3],
    ])
}
