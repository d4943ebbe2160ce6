//! Directory record views.
//!
//! A directory record is variable length: a 33-byte fixed part, the file
//! identifier, an alignment pad, and the system-use area where SUSP/Rock
//! Ridge entries live. Integer fields are both-endian; the little-endian
//! half is authoritative.

use crate::codec;
use crate::error::{FsError, Result};

use super::susp::{
    PosixEntry, SuspEntry, TimestampsEntry, NM_CONTINUE, NM_CURRENT, NM_PARENT, SL_CONTINUE,
    SL_CURRENT, SL_PARENT, SL_ROOT,
};

/// A parsed directory record with its SUSP entries attached.
#[derive(Debug, Clone)]
pub struct DirRecord {
    bytes: Vec<u8>,
    joliet: bool,
    /// System-use skip from the root `SP` entry; `None` when the volume has
    /// no Rock Ridge extensions.
    rr_skip: Option<u8>,
    susp: Vec<SuspEntry>,
}

impl DirRecord {
    pub const FLAG_HIDDEN: u8 = 1 << 0;
    pub const FLAG_DIRECTORY: u8 = 1 << 1;
    pub const FLAG_ASSOCIATED: u8 = 1 << 2;
    pub const FLAG_NOT_FINAL: u8 = 1 << 7;

    /// Minimum record length: 33 fixed bytes plus a one-byte identifier.
    pub const MIN_LEN: usize = 34;

    pub(crate) fn new(bytes: Vec<u8>, joliet: bool, rr_skip: Option<u8>) -> Result<Self> {
        if bytes.len() < Self::MIN_LEN {
            return Err(FsError::InvalidArgument(
                "directory record shorter than its fixed part".into(),
            ));
        }
        let id_len = bytes[32] as usize;
        if 33 + id_len > bytes.len() {
            return Err(FsError::InvalidArgument(
                "directory record identifier overruns the record".into(),
            ));
        }
        Ok(Self {
            bytes,
            joliet,
            rr_skip,
            susp: Vec::new(),
        })
    }

    pub(crate) fn set_susp(&mut self, entries: Vec<SuspEntry>) {
        self.susp = entries;
    }

    pub(crate) fn set_rr_skip(&mut self, rr_skip: Option<u8>) {
        self.rr_skip = rr_skip;
    }

    pub fn susp_entries(&self) -> &[SuspEntry] {
        &self.susp
    }

    pub(crate) fn into_susp(self) -> Vec<SuspEntry> {
        self.susp
    }

    /// Total record length as recorded in its first byte.
    pub fn record_len(&self) -> usize {
        self.bytes[0] as usize
    }

    pub fn extended_attr_len(&self) -> u8 {
        self.bytes[1]
    }

    /// Extent location as a logical block number.
    pub fn lba(&self) -> u32 {
        self.u32_at(2)
    }

    /// Extent location as a byte offset into the image.
    pub fn extent_offset(&self, block_size: u16) -> u64 {
        u64::from(self.lba()) * u64::from(block_size)
    }

    pub fn data_length(&self) -> u32 {
        self.u32_at(10)
    }

    pub fn recording_time_ms(&self) -> i64 {
        codec::iso_short_datetime_ms(&self.bytes[18..25])
    }

    pub fn file_flags(&self) -> u8 {
        self.bytes[25]
    }

    pub fn volume_sequence(&self) -> u16 {
        u16::from_le_bytes([self.bytes[28], self.bytes[29]])
    }

    pub fn identifier_bytes(&self) -> &[u8] {
        let id_len = self.bytes[32] as usize;
        &self.bytes[33..33 + id_len]
    }

    /// The raw on-disc identifier, decoded per the active name encoding.
    pub fn identifier(&self) -> String {
        if self.joliet {
            codec::decode_utf16be(self.identifier_bytes())
        } else {
            codec::decode_utf8(self.identifier_bytes())
        }
    }

    /// The system-use area: everything after the identifier and its
    /// even-alignment pad, minus the Rock Ridge skip.
    pub(crate) fn system_use_area(&self) -> &[u8] {
        let id_len = self.bytes[32] as usize;
        let mut start = 33 + id_len;
        if id_len % 2 == 0 {
            start += 1;
        }
        start += self.rr_skip.unwrap_or(0) as usize;
        self.bytes.get(start..self.record_len()).unwrap_or_default()
    }

    /// The name this record surfaces in listings and lookups.
    ///
    /// A Rock Ridge `NM` chain wins; directories keep their raw identifier;
    /// files lose the `;version` suffix and a trailing dot before it. An
    /// identifier without a separator (Joliet) passes through unchanged.
    pub fn file_name(&self) -> String {
        if self.rr_skip.is_some() {
            if let Some(name) = self.rock_ridge_name() {
                return name;
            }
        }
        let id = self.identifier();
        if self.is_directory() {
            return id;
        }
        match id.find(';') {
            None => id,
            Some(sep) if sep > 0 && id.as_bytes()[sep - 1] == b'.' => id[..sep - 1].to_string(),
            Some(sep) => id[..sep].to_string(),
        }
    }

    fn rock_ridge_name(&self) -> Option<String> {
        let mut name = String::new();
        let mut found = false;
        for entry in &self.susp {
            if let SuspEntry::Nm(nm) = entry {
                if !found && nm.flags & (NM_CURRENT | NM_PARENT) != 0 {
                    // The chain names `.` or `..`; keep the identifier.
                    return None;
                }
                found = true;
                name.push_str(&nm.name);
                if nm.flags & NM_CONTINUE == 0 {
                    break;
                }
            }
        }
        found.then_some(name)
    }

    pub fn is_directory(&self) -> bool {
        self.file_flags() & Self::FLAG_DIRECTORY != 0
            || (self.rr_skip.is_some() && self.child_link_lba().is_some())
    }

    pub fn is_hidden(&self) -> bool {
        self.file_flags() & Self::FLAG_HIDDEN != 0
    }

    pub fn is_symlink(&self) -> bool {
        self.rr_skip.is_some() && self.susp.iter().any(|e| matches!(e, SuspEntry::Sl(_)))
    }

    /// The relocated directory's true extent, from a `CL` entry.
    pub fn child_link_lba(&self) -> Option<u32> {
        self.susp.iter().find_map(|e| match e {
            SuspEntry::Cl { child_lba } => Some(*child_lba),
            _ => None,
        })
    }

    /// Whether this record marks the original location of a relocated
    /// directory (skipped in listings).
    pub fn has_relocation_marker(&self) -> bool {
        self.susp.iter().any(|e| matches!(e, SuspEntry::Re))
    }

    pub fn posix_attributes(&self) -> Option<&PosixEntry> {
        self.susp.iter().find_map(|e| match e {
            SuspEntry::Px(px) => Some(px),
            _ => None,
        })
    }

    pub fn timestamps(&self) -> Option<&TimestampsEntry> {
        self.susp.iter().find_map(|e| match e {
            SuspEntry::Tf(tf) => Some(tf),
            _ => None,
        })
    }

    /// Assemble the symlink target from the `SL` chain.
    pub fn symlink_path(&self) -> Option<String> {
        if !self.is_symlink() {
            return None;
        }
        let mut path = String::new();
        for entry in &self.susp {
            let SuspEntry::Sl(sl) = entry else { continue };
            for component in &sl.components {
                if component.flags & SL_ROOT != 0 {
                    path.push('/');
                } else if component.flags & SL_CURRENT != 0 {
                    path.push_str("./");
                } else if component.flags & SL_PARENT != 0 {
                    path.push_str("../");
                } else {
                    path.push_str(&component.content);
                    if component.flags & SL_CONTINUE == 0 {
                        path.push('/');
                    }
                }
            }
        }
        // One trailing separator comes from the assembly, not the target.
        if path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        Some(path)
    }

    fn u32_at(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.bytes[offset],
            self.bytes[offset + 1],
            self.bytes[offset + 2],
            self.bytes[offset + 3],
        ])
    }
}
