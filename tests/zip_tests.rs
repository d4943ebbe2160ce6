//! ZIP file-system integration tests.

mod common;

use std::sync::Arc;

use arcfs::vfs::{S_IFDIR, S_IFMT, S_IFREG};
use arcfs::{FileSystem, FsError, LocalFileSource, StreamSource, ZipFs, ZipOptions};
use common::{read_to_string, ZipBuilder, DOS_STAMP_MS};

fn basic_archive() -> Vec<u8> {
    ZipBuilder::new()
        .file("one.txt", b"1")
        .deflated_file("two.txt", b"two")
        .deflated_file("nested/omg.txt", b"This is a nested file!")
        .build()
}

async fn assert_basic_contents(fs: &ZipFs) {
    let root = fs.read_dir("/").await.unwrap();
    assert_eq!(root, ["nested", "one.txt", "two.txt"]);

    assert_eq!(read_to_string(fs, "/one.txt").await, "1");
    assert_eq!(read_to_string(fs, "/two.txt").await, "two");

    assert_eq!(fs.read_dir("/nested").await.unwrap().len(), 1);
    assert_eq!(
        read_to_string(fs, "/nested/omg.txt").await,
        "This is a nested file!"
    );
}

#[tokio::test]
async fn mounts_a_basic_archive() {
    let archive = basic_archive();
    let total = archive.len() as u64;
    let fs = ZipFs::mount(ZipOptions::new(archive)).await.unwrap();

    assert_basic_contents(&fs).await;

    let usage = fs.usage();
    assert_eq!(usage.total_space, total);
    assert_eq!(usage.free_space, 0);
}

#[tokio::test]
async fn stat_reports_sizes_and_times() {
    let fs = ZipFs::mount(ZipOptions::new(basic_archive())).await.unwrap();

    let file = fs.stat("/nested/omg.txt").await.unwrap();
    assert_eq!(file.mode & S_IFMT, S_IFREG);
    assert_eq!(file.mode & 0o777, 0o555);
    assert_eq!(file.size, 22);
    assert_eq!(file.mtime_ms, DOS_STAMP_MS);

    // Size agrees with what read() returns.
    let mut buf = vec![0u8; file.size as usize];
    let n = fs
        .read("/nested/omg.txt", &mut buf, 0, file.size)
        .await
        .unwrap();
    assert_eq!(n as u64, file.size);

    // Synthesized directory inode.
    let dir = fs.stat("/nested").await.unwrap();
    assert_eq!(dir.mode & S_IFMT, S_IFDIR);
    assert_eq!(dir.size, 4096);
}

#[tokio::test]
async fn ranged_reads_clamp_to_the_file() {
    let fs = ZipFs::mount(ZipOptions::new(basic_archive())).await.unwrap();

    let mut buf = [0u8; 4];
    let n = fs.read("/two.txt", &mut buf, 1, 3).await.unwrap();
    assert_eq!(&buf[..n], b"wo");

    let n = fs.read("/two.txt", &mut buf, 0, 100).await.unwrap();
    assert_eq!(&buf[..n], b"two");

    let n = fs.read("/two.txt", &mut buf, 10, 100).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn sync_variants_serve_a_buffered_archive() {
    let fs = ZipFs::mount(ZipOptions::new(basic_archive())).await.unwrap();

    assert_eq!(fs.read_dir_sync("/").unwrap().len(), 3);
    assert!(fs.stat_sync("/one.txt").unwrap().size == 1);

    let mut buf = [0u8; 1];
    let n = fs.read_sync("/one.txt", &mut buf, 0, 1).unwrap();
    assert_eq!(&buf[..n], b"1");
}

#[tokio::test]
async fn surfaces_posix_flavored_errors() {
    let fs = ZipFs::mount(ZipOptions::new(basic_archive())).await.unwrap();

    assert!(matches!(
        fs.stat("/missing.txt").await,
        Err(FsError::NoSuchFile(_))
    ));
    let mut buf = [0u8; 1];
    assert!(matches!(
        fs.read("/nested", &mut buf, 0, 1).await,
        Err(FsError::IsADirectory(_))
    ));
    assert!(matches!(
        fs.read("/missing.txt", &mut buf, 0, 1).await,
        Err(FsError::NoSuchFile(_))
    ));
    assert!(matches!(
        fs.read_dir("/one.txt").await,
        Err(FsError::NotADirectory(_))
    ));
}

#[tokio::test]
async fn writes_are_denied() {
    let fs = ZipFs::mount(ZipOptions::new(basic_archive())).await.unwrap();
    assert!(matches!(
        fs.write("/one.txt", b"x", 0).await,
        Err(FsError::PermissionDenied)
    ));
    assert!(matches!(
        fs.mkdir("/new", 0o755).await,
        Err(FsError::PermissionDenied)
    ));
    assert!(matches!(
        fs.unlink("/one.txt").await,
        Err(FsError::PermissionDenied)
    ));
}

#[tokio::test]
async fn locates_the_eocd_behind_a_comment() {
    let archive = ZipBuilder::new()
        .file("a.txt", b"alpha")
        .comment("trailing archive comment, PK\x05\x06 inside it and all")
        .build();
    let fs = ZipFs::mount(ZipOptions::new(archive)).await.unwrap();
    assert_eq!(read_to_string(&fs, "/a.txt").await, "alpha");
}

#[tokio::test]
async fn normalizes_backslash_paths() {
    let archive = ZipBuilder::new().file("win\\path.txt", b"dos").build();
    let fs = ZipFs::mount(ZipOptions::new(archive)).await.unwrap();

    assert_eq!(fs.read_dir("/").await.unwrap(), ["win"]);
    assert_eq!(read_to_string(&fs, "/win/path.txt").await, "dos");
}

#[tokio::test]
async fn honors_explicit_directory_entries() {
    let archive = ZipBuilder::new()
        .dir("empty")
        .file("docs/readme.md", b"# hi")
        .build();
    let fs = ZipFs::mount(ZipOptions::new(archive)).await.unwrap();

    let root = fs.read_dir("/").await.unwrap();
    assert_eq!(root, ["docs", "empty"]);
    assert!(fs.stat("/empty").await.unwrap().is_directory());
    assert_eq!(fs.read_dir("/empty").await.unwrap().len(), 0);
}

#[tokio::test]
async fn rejects_zip64_and_spanned_archives() {
    // A bare EOCD whose central directory offset is the ZIP64 escape value.
    let mut zip64 = Vec::new();
    zip64.extend_from_slice(b"PK\x05\x06");
    zip64.extend_from_slice(&[0u8; 12]);
    zip64.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    zip64.extend_from_slice(&[0u8; 2]);
    assert!(matches!(
        ZipFs::mount(ZipOptions::new(zip64)).await,
        Err(FsError::InvalidArgument(_))
    ));

    // A bare EOCD claiming the central directory lives on another disk.
    let mut spanned = Vec::new();
    spanned.extend_from_slice(b"PK\x05\x06");
    spanned.extend_from_slice(&1u16.to_le_bytes());
    spanned.extend_from_slice(&[0u8; 16]);
    assert!(matches!(
        ZipFs::mount(ZipOptions::new(spanned)).await,
        Err(FsError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn missing_eocd_is_an_io_error() {
    assert!(matches!(
        ZipFs::mount(ZipOptions::new(vec![0u8; 1024])).await,
        Err(FsError::Io(_))
    ));
    assert!(matches!(
        ZipFs::mount(ZipOptions::new(vec![0u8; 4])).await,
        Err(FsError::Io(_))
    ));
}

#[tokio::test]
async fn unknown_compression_method_names_the_method() {
    let archive = ZipBuilder::new()
        .entry_with("weird.bin", b"data", 14, 0)
        .build();
    let fs = ZipFs::mount(ZipOptions::new(archive).lazy(true))
        .await
        .unwrap();

    let mut buf = [0u8; 4];
    let err = fs.read("/weird.bin", &mut buf, 0, 4).await.unwrap_err();
    match err {
        FsError::InvalidArgument(msg) => assert!(msg.contains("14"), "{msg}"),
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
}

#[tokio::test]
async fn encrypted_entries_are_rejected() {
    let archive = ZipBuilder::new()
        .entry_with("secret.txt", b"data", 0, 0x0001)
        .build();
    let fs = ZipFs::mount(ZipOptions::new(archive).lazy(true))
        .await
        .unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(
        fs.read("/secret.txt", &mut buf, 0, 4).await,
        Err(FsError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn lazy_mount_resolves_on_first_read() {
    let fs = ZipFs::mount(ZipOptions::new(basic_archive()).lazy(true))
        .await
        .unwrap();
    assert_basic_contents(&fs).await;
    // A second read is served from the cache and stays identical.
    assert_eq!(read_to_string(&fs, "/one.txt").await, "1");
}

#[tokio::test]
async fn mounts_over_a_progressive_stream() {
    let archive = basic_archive();
    let source = Arc::new(StreamSource::new(archive.len() as u64));

    let feeder = Arc::clone(&source);
    tokio::spawn(async move {
        for chunk in archive.chunks(64) {
            feeder.push(chunk);
            tokio::task::yield_now().await;
        }
        feeder.finish();
    });

    // Mount suspends until the tail (EOCD + central directory) has arrived.
    let fs = ZipFs::mount(ZipOptions::new(source)).await.unwrap();
    assert_basic_contents(&fs).await;
}

#[tokio::test]
async fn mounts_through_a_file_descriptor_source() {
    let path = std::env::temp_dir().join(format!("arcfs-zip-{}.zip", std::process::id()));
    std::fs::write(&path, basic_archive()).unwrap();

    let source = Arc::new(LocalFileSource::open(&path).unwrap());
    let fs = ZipFs::mount(ZipOptions::new(source)).await.unwrap();
    assert_basic_contents(&fs).await;

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn label_comes_from_the_mount_name() {
    let fs = ZipFs::mount(ZipOptions::new(basic_archive()).name("backup"))
        .await
        .unwrap();
    assert_eq!(fs.label(), Some("backup"));
}
