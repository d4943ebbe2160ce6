//! The PKZIP decoder and its file-tree projection.

mod decompress;
mod fs;
mod structures;

pub use decompress::{DecompressFn, DecompressorRegistry, METHOD_DEFLATE, METHOD_STORE};
pub use fs::{ZipFs, ZipOptions};
pub use structures::{
    CentralDirectoryEntry, EndOfCentralDirectory, LocalFileHeader, FLAG_ENCRYPTED, FLAG_UTF8_NAME,
};
