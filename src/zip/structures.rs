//! Typed views over the three PKZIP on-disk records.
//!
//! ZIP archives are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) record at the file's tail
//! 2. Walk the Central Directory to get metadata for every entry
//! 3. For file data, resolve each entry's Local File Header
//!
//! This ordering is also what makes remote sources cheap to serve: listing
//! an archive only ever touches its tail. All multibyte fields are
//! little-endian.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::codec;
use crate::error::{FsError, Result};

/// General-purpose flag bit 0: the entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General-purpose flag bit 11: the entry name is UTF-8.
pub const FLAG_UTF8_NAME: u16 = 1 << 11;

/// MS-DOS directory bit in the external attributes.
const ATTR_DIRECTORY: u32 = 0x10;

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(FsError::InvalidArgument(
                "invalid end of central directory record".into(),
            ));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Reject the archive shapes this crate does not read.
    pub fn check(&self) -> Result<()> {
        if self.disk_number != self.disk_with_cd {
            return Err(FsError::InvalidArgument(
                "spanned archives are not supported".into(),
            ));
        }
        if self.cd_offset == 0xFFFF_FFFF {
            return Err(FsError::InvalidArgument(
                "ZIP64 archives are not supported".into(),
            ));
        }
        Ok(())
    }
}

/// One Central Directory File Header (fixed part 46 bytes), with the
/// variable-length name already decoded and normalized.
#[derive(Debug, Clone)]
pub struct CentralDirectoryEntry {
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_ms: i64,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub external_attrs: u32,
    /// Relative offset of the entry's local file header.
    pub header_offset: u32,
    /// Entry name, `/`-separated, without a leading or trailing slash.
    pub name: String,
    pub is_directory: bool,
    /// Total footprint in the central directory including variable fields.
    pub record_len: usize,
}

impl CentralDirectoryEntry {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const FIXED_SIZE: usize = 46;

    /// Parse the entry at the start of `data` (the remaining central
    /// directory slice).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::FIXED_SIZE {
            return Err(FsError::InvalidArgument(
                "truncated central directory".into(),
            ));
        }
        if &data[0..4] != Self::SIGNATURE {
            return Err(FsError::InvalidArgument(
                "invalid central directory file header".into(),
            ));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let mod_time = cursor.read_u16::<LittleEndian>()?;
        let mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let name_len = cursor.read_u16::<LittleEndian>()? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
        let comment_len = cursor.read_u16::<LittleEndian>()? as usize;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let header_offset = cursor.read_u32::<LittleEndian>()?;

        let record_len = Self::FIXED_SIZE + name_len + extra_len + comment_len;
        if data.len() < Self::FIXED_SIZE + name_len {
            return Err(FsError::InvalidArgument(
                "central directory entry name overruns the directory".into(),
            ));
        }

        let raw_name = &data[Self::FIXED_SIZE..Self::FIXED_SIZE + name_len];
        let name = if flags & FLAG_UTF8_NAME != 0 {
            codec::decode_utf8(raw_name)
        } else {
            codec::decode_cp437(raw_name)
        };
        let name = name.replace('\\', "/");
        if name.starts_with('/') {
            return Err(FsError::InvalidArgument(format!(
                "absolute entry name: {name}"
            )));
        }

        let trailing_slash = name.ends_with('/');
        let name = name.strip_suffix('/').unwrap_or(&name).to_string();
        if name.is_empty() {
            return Err(FsError::InvalidArgument("empty entry name".into()));
        }
        let is_directory = trailing_slash || external_attrs & ATTR_DIRECTORY != 0;

        let last_modified_ms =
            codec::msdos_datetime_ms(u32::from(mod_date) << 16 | u32::from(mod_time));

        Ok(Self {
            flags,
            compression_method,
            last_modified_ms,
            crc32,
            compressed_size,
            uncompressed_size,
            external_attrs,
            header_offset,
            name,
            is_directory,
            record_len,
        })
    }
}

/// Local File Header (30 bytes + name + extra). Only the variable-field
/// lengths matter: they place the start of the compressed bytes.
pub struct LocalFileHeader {
    pub name_len: u16,
    pub extra_len: u16,
}

impl LocalFileHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(FsError::InvalidArgument("invalid local file header".into()));
        }

        let mut cursor = Cursor::new(&data[26..]);
        Ok(Self {
            name_len: cursor.read_u16::<LittleEndian>()?,
            extra_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Offset of the compressed bytes relative to the header start.
    pub fn data_offset(&self) -> u64 {
        Self::SIZE as u64 + u64::from(self.name_len) + u64::from(self.extra_len)
    }
}
