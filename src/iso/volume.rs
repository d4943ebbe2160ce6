//! Volume descriptor scan and primary/Joliet selection.
//!
//! The descriptor area starts at sector 16 and runs one descriptor per
//! sector until the set terminator. A Joliet supplementary descriptor is
//! preferred over the plain primary because it carries full Unicode names;
//! it is recognized purely by its type and UCS-2 escape sequence.

use tracing::{debug, warn};

use crate::codec;
use crate::error::{FsError, Result};
use crate::io::{fetch, FetchMode, ReadAt};

/// ISO 9660 logical sector size; volume descriptors always occupy one.
pub const SECTOR_SIZE: u64 = 2048;

/// Volume descriptor type codes (ECMA-119 8.1.1).
pub const VD_BOOT_RECORD: u8 = 0;
pub const VD_PRIMARY: u8 = 1;
pub const VD_SUPPLEMENTARY: u8 = 2;
pub const VD_PARTITION: u8 = 3;
pub const VD_SET_TERMINATOR: u8 = 255;

/// A primary or supplementary volume descriptor, reduced to the fields the
/// file system needs.
pub struct VolumeDescriptor {
    pub joliet: bool,
    pub volume_id: String,
    pub volume_space_size: u32,
    pub logical_block_size: u16,
    /// The 34-byte root directory record embedded at offset 156.
    pub root_record: [u8; 34],
}

impl VolumeDescriptor {
    /// Parse one descriptor sector; `None` when the type is not one we can
    /// mount (boot records, partition descriptors, non-UCS-2 supplements).
    fn parse(sector: &[u8]) -> Result<Option<Self>> {
        let kind = sector[0];
        if kind != VD_PRIMARY && kind != VD_SUPPLEMENTARY {
            return Ok(None);
        }

        let joliet = kind == VD_SUPPLEMENTARY && is_ucs2_escape(&sector[88..120]);
        if kind == VD_SUPPLEMENTARY && !joliet {
            return Ok(None);
        }

        // Both-endian fields: the little-endian half is authoritative.
        let logical_block_size = u16::from_le_bytes([sector[128], sector[129]]);
        if !logical_block_size.is_power_of_two() || !(512..=2048).contains(&logical_block_size) {
            return Err(FsError::InvalidArgument(format!(
                "invalid logical block size {logical_block_size}"
            )));
        }
        let volume_space_size =
            u32::from_le_bytes([sector[80], sector[81], sector[82], sector[83]]);

        let volume_id = if joliet {
            codec::decode_utf16be(&sector[40..72])
        } else {
            codec::decode_utf8(&sector[40..72])
        };
        let volume_id = volume_id.trim_end_matches(' ').to_string();

        let mut root_record = [0u8; 34];
        root_record.copy_from_slice(&sector[156..190]);

        Ok(Some(Self {
            joliet,
            volume_id,
            volume_space_size,
            logical_block_size,
            root_record,
        }))
    }
}

/// Joliet marks its descriptor with an ISO 2022 escape selecting UCS-2
/// level 1, 2 or 3.
fn is_ucs2_escape(escapes: &[u8]) -> bool {
    escapes[0] == 0x25 && escapes[1] == 0x2F && matches!(escapes[2], 0x40 | 0x43 | 0x45)
}

/// Scan the descriptor area and pick the volume to mount.
pub(crate) async fn select_volume(
    source: &dyn ReadAt,
    mode: FetchMode,
) -> Result<VolumeDescriptor> {
    let mut offset = 16 * SECTOR_SIZE;
    let mut candidate: Option<VolumeDescriptor> = None;
    let mut sector = vec![0u8; SECTOR_SIZE as usize];

    while offset + SECTOR_SIZE <= source.size() {
        fetch(source, mode, offset, &mut sector).await?;
        offset += SECTOR_SIZE;

        if &sector[1..6] != b"CD001" {
            warn!("unterminated volume descriptor set");
            break;
        }
        if sector[0] == VD_SET_TERMINATOR {
            break;
        }

        if let Some(volume) = VolumeDescriptor::parse(&sector)? {
            let have_joliet = candidate.as_ref().is_some_and(|c| c.joliet);
            if volume.joliet && !have_joliet {
                debug!(volume_id = %volume.volume_id, "selected Joliet supplementary descriptor");
                candidate = Some(volume);
            } else if !volume.joliet && candidate.is_none() {
                debug!(volume_id = %volume.volume_id, "selected primary descriptor");
                candidate = Some(volume);
            }
        }
    }

    candidate.ok_or_else(|| FsError::Io("no usable volume descriptor".into()))
}
