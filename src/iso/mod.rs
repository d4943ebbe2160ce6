//! The ISO 9660 decoder and its file-tree projection.

mod directory;
mod fs;
mod record;
mod susp;
mod volume;

pub use fs::{CaseFold, IsoFs, IsoOptions};
pub use record::DirRecord;
pub use susp::{
    NameEntry, PosixEntry, SlComponent, SuspEntry, SymlinkEntry, TimestampsEntry,
};
pub use volume::{
    VolumeDescriptor, SECTOR_SIZE, VD_BOOT_RECORD, VD_PARTITION, VD_PRIMARY, VD_SET_TERMINATOR,
    VD_SUPPLEMENTARY,
};
