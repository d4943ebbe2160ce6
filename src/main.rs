//! Main entry point for the arcfs CLI.
//!
//! Mounts an archive (local file or HTTP URL), auto-detects its format, and
//! lists or prints paths inside it through the read-only file-system API.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use time::OffsetDateTime;
use tracing::Level;

use arcfs::vfs::{S_IFDIR, S_IFMT};
use arcfs::{
    CaseFold, Cli, FileSystem, HttpRangeSource, IsoFs, IsoOptions, LocalFileSource, ReadAt, ZipFs,
    ZipOptions,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::WARN).init();
    let cli = Cli::parse();

    if cli.is_http_url() {
        let source = Arc::new(HttpRangeSource::new(cli.archive.clone()).await?);
        let transferred_before = source.transferred_bytes();

        browse(source.clone(), &cli).await?;

        if !cli.is_quiet() {
            let transferred = source.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let source = Arc::new(LocalFileSource::open(Path::new(&cli.archive))?);
        browse(source, &cli).await?;
    }

    Ok(())
}

/// Mount the archive and serve the requested paths.
async fn browse(source: Arc<dyn ReadAt>, cli: &Cli) -> Result<()> {
    let fs = mount_auto(source, cli).await?;

    let paths = if cli.paths.is_empty() {
        vec!["/".to_string()]
    } else {
        cli.paths.clone()
    };

    for path in &paths {
        if cli.pipe {
            print_file(fs.as_ref(), path).await?;
        } else {
            list_path(fs.as_ref(), path, cli.verbose).await?;
        }
    }

    Ok(())
}

/// Detect the archive format by its magic bytes: an ISO image carries
/// `CD001` at sector 16, anything else is tried as ZIP.
async fn mount_auto(source: Arc<dyn ReadAt>, cli: &Cli) -> Result<Box<dyn FileSystem>> {
    let iso = if source.size() >= 17 * 2048 {
        let mut magic = [0u8; 6];
        source.read_at(16 * 2048, &mut magic).await?;
        &magic[1..6] == b"CD001"
    } else {
        false
    };

    if iso {
        let case_fold = if cli.upper {
            CaseFold::Upper
        } else {
            CaseFold::Lower
        };
        let options = IsoOptions::new(source).case_fold(case_fold);
        let fs = IsoFs::mount(options)
            .await
            .context("failed to mount ISO image")?;
        Ok(Box::new(fs))
    } else {
        let options = ZipOptions::new(source).lazy(cli.lazy);
        let fs = ZipFs::mount(options)
            .await
            .context("failed to mount ZIP archive")?;
        Ok(Box::new(fs))
    }
}

async fn list_path(fs: &dyn FileSystem, path: &str, verbose: bool) -> Result<()> {
    let stat = fs.stat(path).await?;
    if stat.mode & S_IFMT != S_IFDIR {
        print_entry(fs, path, path, verbose).await?;
        return Ok(());
    }

    for name in fs.read_dir(path).await? {
        let child = if path.ends_with('/') {
            format!("{path}{name}")
        } else {
            format!("{path}/{name}")
        };
        print_entry(fs, &child, &name, verbose).await?;
    }
    Ok(())
}

async fn print_entry(fs: &dyn FileSystem, path: &str, name: &str, verbose: bool) -> Result<()> {
    if !verbose {
        println!("{name}");
        return Ok(());
    }
    let stat = fs.stat(path).await?;
    let mtime = OffsetDateTime::from_unix_timestamp(stat.mtime_ms / 1000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    println!("{:06o} {:>10} {} {}", stat.mode, stat.size, mtime.date(), name);
    Ok(())
}

async fn print_file(fs: &dyn FileSystem, path: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let stat = fs.stat(path).await?;
    let mut contents = vec![0u8; stat.size as usize];
    let n = fs.read(path, &mut contents, 0, stat.size).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&contents[..n]).await?;
    stdout.flush().await?;
    Ok(())
}

/// Human-readable byte count.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
