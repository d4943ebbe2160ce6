//! Fixture builders: a minimal ZIP writer and an ISO 9660 image writer with
//! optional Rock Ridge system-use entries and a Joliet supplementary
//! descriptor. Both produce tiny but structurally faithful archives.

#![allow(dead_code)]

use std::io::Read;

use flate2::read::DeflateEncoder;
use flate2::{Compression, Crc};

use arcfs::FileSystem;

/// A fixed MS-DOS timestamp used by every ZIP fixture:
/// 2020-06-15 12:30:10.
pub const DOS_DATE: u16 = ((2020 - 1980) << 9) | (6 << 5) | 15;
pub const DOS_TIME: u16 = (12 << 11) | (30 << 5) | 5;
pub const DOS_STAMP_MS: i64 = 1_592_224_210_000;

/// The same instant as a 7-byte ISO short-form date.
pub const ISO_STAMP: [u8; 7] = [120, 6, 15, 12, 30, 10, 0];
pub const ISO_STAMP_MS: i64 = 1_592_224_210_000;

pub async fn read_to_string(fs: &impl FileSystem, path: &str) -> String {
    let stat = fs.stat(path).await.unwrap();
    let mut buf = vec![0u8; stat.size as usize];
    let n = fs.read(path, &mut buf, 0, stat.size).await.unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

// ---------------------------------------------------------------------------
// ZIP
// ---------------------------------------------------------------------------

struct ZipEntrySpec {
    name: String,
    data: Vec<u8>,
    method: u16,
    flags: u16,
    external_attrs: u32,
}

/// Assembles a ZIP archive: local headers with data, then the central
/// directory, then the EOCD record.
pub struct ZipBuilder {
    entries: Vec<ZipEntrySpec>,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            comment: Vec::new(),
        }
    }

    /// Add a STORE-method file entry.
    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(ZipEntrySpec {
            name: name.to_string(),
            data: data.to_vec(),
            method: 0,
            flags: 0,
            external_attrs: 0,
        });
        self
    }

    /// Add a DEFLATE-method file entry.
    pub fn deflated_file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(ZipEntrySpec {
            name: name.to_string(),
            data: data.to_vec(),
            method: 8,
            flags: 0,
            external_attrs: 0,
        });
        self
    }

    /// Add an explicit directory entry (trailing slash, MS-DOS dir bit).
    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(ZipEntrySpec {
            name: format!("{}/", name.trim_end_matches('/')),
            data: Vec::new(),
            method: 0,
            flags: 0,
            external_attrs: 0x10,
        });
        self
    }

    /// Add an entry with explicit method and flag bits (for unsupported
    /// method and encryption tests).
    pub fn entry_with(mut self, name: &str, data: &[u8], method: u16, flags: u16) -> Self {
        self.entries.push(ZipEntrySpec {
            name: name.to_string(),
            data: data.to_vec(),
            method,
            flags,
            external_attrs: 0,
        });
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.comment = text.as_bytes().to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut header_offsets = Vec::with_capacity(self.entries.len());
        let mut compressed_sizes = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let compressed = if entry.method == 8 {
                let mut encoder = DeflateEncoder::new(&entry.data[..], Compression::default());
                let mut buf = Vec::new();
                encoder.read_to_end(&mut buf).unwrap();
                buf
            } else {
                entry.data.clone()
            };

            header_offsets.push(out.len() as u32);
            compressed_sizes.push(compressed.len() as u32);

            out.extend_from_slice(b"PK\x03\x04");
            push_u16(&mut out, 20); // version needed
            push_u16(&mut out, entry.flags);
            push_u16(&mut out, entry.method);
            push_u16(&mut out, DOS_TIME);
            push_u16(&mut out, DOS_DATE);
            push_u32(&mut out, crc32(&entry.data));
            push_u32(&mut out, compressed.len() as u32);
            push_u32(&mut out, entry.data.len() as u32);
            push_u16(&mut out, entry.name.len() as u16);
            push_u16(&mut out, 0); // extra length
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&compressed);
        }

        let cd_offset = out.len() as u32;
        for (i, entry) in self.entries.iter().enumerate() {
            out.extend_from_slice(b"PK\x01\x02");
            push_u16(&mut out, 20); // version made by
            push_u16(&mut out, 20); // version needed
            push_u16(&mut out, entry.flags);
            push_u16(&mut out, entry.method);
            push_u16(&mut out, DOS_TIME);
            push_u16(&mut out, DOS_DATE);
            push_u32(&mut out, crc32(&entry.data));
            push_u32(&mut out, compressed_sizes[i]);
            push_u32(&mut out, entry.data.len() as u32);
            push_u16(&mut out, entry.name.len() as u16);
            push_u16(&mut out, 0); // extra length
            push_u16(&mut out, 0); // comment length
            push_u16(&mut out, 0); // start disk
            push_u16(&mut out, 0); // internal attributes
            push_u32(&mut out, entry.external_attrs);
            push_u32(&mut out, header_offsets[i]);
            out.extend_from_slice(entry.name.as_bytes());
        }
        let cd_size = out.len() as u32 - cd_offset;

        out.extend_from_slice(b"PK\x05\x06");
        push_u16(&mut out, 0); // disk number
        push_u16(&mut out, 0); // disk with central directory
        push_u16(&mut out, self.entries.len() as u16);
        push_u16(&mut out, self.entries.len() as u16);
        push_u32(&mut out, cd_size);
        push_u32(&mut out, cd_offset);
        push_u16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);

        out
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

// ---------------------------------------------------------------------------
// ISO 9660
// ---------------------------------------------------------------------------

pub const SECTOR: usize = 2048;

/// A sector-addressed scratch image.
pub struct IsoImage {
    pub data: Vec<u8>,
}

impl IsoImage {
    pub fn new(total_sectors: usize) -> Self {
        Self {
            data: vec![0u8; total_sectors * SECTOR],
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Write a Primary Volume Descriptor at `sector`.
    pub fn write_pvd(&mut self, sector: usize, volume_id: &str, root_lba: u32, root_len: u32) {
        let total_sectors = (self.data.len() / SECTOR) as u32;
        let pvd = &mut self.data[sector * SECTOR..(sector + 1) * SECTOR];
        pvd[0] = 1;
        pvd[1..6].copy_from_slice(b"CD001");
        pvd[6] = 1;
        pvd[40..72].fill(b' ');
        pvd[40..40 + volume_id.len()].copy_from_slice(volume_id.as_bytes());
        put_u32_both(&mut pvd[80..88], total_sectors);
        put_u16_both(&mut pvd[120..124], 1);
        put_u16_both(&mut pvd[124..128], 1);
        put_u16_both(&mut pvd[128..132], SECTOR as u16);
        let root = dir_record(root_lba, root_len, b"\x00", 0x02, &[]);
        pvd[156..156 + root.len()].copy_from_slice(&root);
        pvd[881] = 1;
    }

    /// Write a Joliet Supplementary Volume Descriptor (UCS-2 level 3) at
    /// `sector`. The volume identifier is encoded UTF-16BE.
    pub fn write_joliet_svd(
        &mut self,
        sector: usize,
        volume_id: &str,
        root_lba: u32,
        root_len: u32,
    ) {
        let total_sectors = (self.data.len() / SECTOR) as u32;
        let svd = &mut self.data[sector * SECTOR..(sector + 1) * SECTOR];
        svd[0] = 2;
        svd[1..6].copy_from_slice(b"CD001");
        svd[6] = 1;
        // UCS-2 space padding for the identifier fields.
        for pair in svd[40..72].chunks_exact_mut(2) {
            pair.copy_from_slice(&[0x00, 0x20]);
        }
        let encoded = ucs2be(volume_id);
        svd[40..40 + encoded.len()].copy_from_slice(&encoded);
        svd[88] = 0x25;
        svd[89] = 0x2F;
        svd[90] = 0x45;
        put_u32_both(&mut svd[80..88], total_sectors);
        put_u16_both(&mut svd[120..124], 1);
        put_u16_both(&mut svd[124..128], 1);
        put_u16_both(&mut svd[128..132], SECTOR as u16);
        let root = dir_record(root_lba, root_len, b"\x00", 0x02, &[]);
        svd[156..156 + root.len()].copy_from_slice(&root);
        svd[881] = 1;
    }

    pub fn write_terminator(&mut self, sector: usize) {
        let term = &mut self.data[sector * SECTOR..(sector + 1) * SECTOR];
        term[0] = 255;
        term[1..6].copy_from_slice(b"CD001");
        term[6] = 1;
    }

    /// Lay out directory records in the extent at `lba`. Records that would
    /// straddle a sector boundary are pushed to the next sector.
    pub fn write_dir(&mut self, lba: u32, records: &[Vec<u8>]) {
        let mut pos = lba as usize * SECTOR;
        for record in records {
            if pos % SECTOR + record.len() > SECTOR {
                pos = (pos / SECTOR + 1) * SECTOR;
            }
            self.data[pos..pos + record.len()].copy_from_slice(record);
            pos += record.len();
        }
    }

    pub fn write_bytes(&mut self, lba: u32, bytes: &[u8]) {
        let offset = lba as usize * SECTOR;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

pub fn put_u16_both(dst: &mut [u8], value: u16) {
    dst[0..2].copy_from_slice(&value.to_le_bytes());
    dst[2..4].copy_from_slice(&value.to_be_bytes());
}

pub fn put_u32_both(dst: &mut [u8], value: u32) {
    dst[0..4].copy_from_slice(&value.to_le_bytes());
    dst[4..8].copy_from_slice(&value.to_be_bytes());
}

pub fn ucs2be(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Build a directory record: 33 fixed bytes, identifier, an even-alignment
/// pad, then the system-use area.
pub fn dir_record(lba: u32, size: u32, identifier: &[u8], flags: u8, system_use: &[u8]) -> Vec<u8> {
    let id_len = identifier.len();
    let padding = if id_len % 2 == 0 { 1 } else { 0 };
    let record_len = 33 + id_len + padding + system_use.len();
    let mut buf = vec![0u8; record_len];
    buf[0] = record_len as u8;
    put_u32_both(&mut buf[2..10], lba);
    put_u32_both(&mut buf[10..18], size);
    buf[18..25].copy_from_slice(&ISO_STAMP);
    buf[25] = flags;
    put_u16_both(&mut buf[28..32], 1);
    buf[32] = id_len as u8;
    buf[33..33 + id_len].copy_from_slice(identifier);
    let su_start = 33 + id_len + padding;
    buf[su_start..su_start + system_use.len()].copy_from_slice(system_use);
    buf
}

// SUSP / Rock Ridge entry builders. Layouts follow IEEE P1282; numeric
// fields are both-endian (4 bytes LE then 4 bytes BE).

pub fn susp_sp() -> Vec<u8> {
    vec![b'S', b'P', 7, 1, 0xBE, 0xEF, 0]
}

pub fn susp_ce(block: u32, offset: u32, length: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 28];
    buf[0] = b'C';
    buf[1] = b'E';
    buf[2] = 28;
    buf[3] = 1;
    put_u32_both(&mut buf[4..12], block);
    put_u32_both(&mut buf[12..20], offset);
    put_u32_both(&mut buf[20..28], length);
    buf
}

pub fn susp_er_rrip() -> Vec<u8> {
    let id = b"RRIP_1991A";
    let desc = b"THE ROCK RIDGE INTERCHANGE PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS";
    let src = b"PLEASE CONTACT DISC PUBLISHER FOR SPECIFICATION SOURCE.";
    let total = 8 + id.len() + desc.len() + src.len();
    let mut buf = vec![0u8; total];
    buf[0] = b'E';
    buf[1] = b'R';
    buf[2] = total as u8;
    buf[3] = 1;
    buf[4] = id.len() as u8;
    buf[5] = desc.len() as u8;
    buf[6] = src.len() as u8;
    buf[7] = 1;
    let mut pos = 8;
    buf[pos..pos + id.len()].copy_from_slice(id);
    pos += id.len();
    buf[pos..pos + desc.len()].copy_from_slice(desc);
    pos += desc.len();
    buf[pos..pos + src.len()].copy_from_slice(src);
    buf
}

pub fn rrip_rr() -> Vec<u8> {
    vec![b'R', b'R', 5, 1, 0x81]
}

pub fn rrip_nm(name: &str) -> Vec<u8> {
    rrip_nm_flags(0, name)
}

pub fn rrip_nm_flags(flags: u8, name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let mut buf = vec![b'N', b'M', (5 + bytes.len()) as u8, 1, flags];
    buf.extend_from_slice(bytes);
    buf
}

pub fn rrip_px(mode: u32, nlink: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 36];
    buf[0] = b'P';
    buf[1] = b'X';
    buf[2] = 36;
    buf[3] = 1;
    put_u32_both(&mut buf[4..12], mode);
    put_u32_both(&mut buf[12..20], nlink);
    buf
}

/// `SL` entry from `(component_flags, content)` pairs.
pub fn rrip_sl(components: &[(u8, &str)]) -> Vec<u8> {
    let mut buf = vec![b'S', b'L', 0, 1, 0];
    for (flags, content) in components {
        buf.push(*flags);
        buf.push(content.len() as u8);
        buf.extend_from_slice(content.as_bytes());
    }
    buf[2] = buf.len() as u8;
    buf
}

pub fn rrip_cl(child_lba: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 12];
    buf[0] = b'C';
    buf[1] = b'L';
    buf[2] = 12;
    buf[3] = 1;
    put_u32_both(&mut buf[4..12], child_lba);
    buf
}

pub fn rrip_re() -> Vec<u8> {
    vec![b'R', b'E', 4, 1]
}

/// `TF` entry carrying a single short-form modify timestamp.
pub fn rrip_tf_modify(stamp: &[u8; 7]) -> Vec<u8> {
    let mut buf = vec![b'T', b'F', 12, 1, 0x02];
    buf.extend_from_slice(stamp);
    buf
}
