//! # arcfs
//!
//! Read-only, POSIX-like file systems over archive images.
//!
//! Two on-disk formats are exposed through one [`FileSystem`] contract:
//! ISO 9660 optical-disc images (including the Joliet and Rock Ridge
//! extensions) and PKZIP archives read through their central directory.
//! A mounted archive answers `stat`, `read_dir` and ranged `read` calls
//! against absolute paths; every mutating operation is denied.
//!
//! Archives are consumed through a random-access byte source, which may be
//! an in-memory buffer, a local file, an HTTP server answering Range
//! requests, or a progressively filled stream with a known total size.
//!
//! ## Example
//!
//! ```no_run
//! use arcfs::{FileSystem, ZipFs, ZipOptions};
//!
//! #[tokio::main]
//! async fn main() -> arcfs::Result<()> {
//!     let image = std::fs::read("archive.zip")?;
//!     let fs = ZipFs::mount(ZipOptions::new(image)).await?;
//!
//!     for name in fs.read_dir("/").await? {
//!         println!("{name}");
//!     }
//!
//!     let stat = fs.stat("/readme.txt").await?;
//!     let mut contents = vec![0u8; stat.size as usize];
//!     fs.read("/readme.txt", &mut contents, 0, stat.size).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod codec;
pub mod error;
pub mod io;
pub mod iso;
pub mod vfs;
pub mod zip;

pub use cli::Cli;
pub use error::{FsError, Result};
pub use io::{
    HttpRangeSource, LocalFileSource, MemorySource, ReadAt, SourceInput, StreamSource,
};
pub use iso::{CaseFold, IsoFs, IsoOptions};
pub use vfs::{FileSystem, FsUsage, Inode};
pub use zip::{DecompressorRegistry, ZipFs, ZipOptions};
