//! Driver-facing tests for the blocking adapter.
//!
//! The driver side is plain threads; the async side is a multi-thread tokio
//! runtime owned by each test.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::runtime::Runtime;
use tokio::sync::Notify;
use webfs_kernel::{AsyncFsOps, BlockingAdapter, DriverFileInfo, DriverOps, MemoryFs};
use webfs_types::{
    AsyncFileInfo, CreateFileReply, FileAccess, FileAttributes, FileInformation, FileMode,
    FileOptions, FileShare, FsResult, NtStatus, OpId,
};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn open(
    adapter: &BlockingAdapter,
    path: &str,
    mode: FileMode,
    info: &mut DriverFileInfo,
) -> FsResult<()> {
    adapter.create_file(
        path,
        FileAccess::GENERIC_READ | FileAccess::GENERIC_WRITE,
        FileShare::READ | FileShare::WRITE,
        mode,
        FileOptions::empty(),
        FileAttributes::NORMAL,
        info,
    )
}

#[test]
fn test_create_attaches_op_id_and_close_releases_it() {
    let rt = runtime();
    let fs = Arc::new(MemoryFs::new());
    let adapter = BlockingAdapter::new(fs.clone(), rt.handle().clone());

    let mut info = DriverFileInfo::new();
    open(&adapter, r"\notes.txt", FileMode::CreateNew, &mut info).unwrap();
    let op_id = info.context.expect("op id attached");
    assert!(!op_id.is_detached());
    assert_eq!(adapter.open_handles(), 1);

    assert_eq!(adapter.write_file(r"\notes.txt", b"abc", 0, &mut info), Ok(3));
    let mut buf = [0u8; 16];
    assert_eq!(adapter.read_file(r"\notes.txt", &mut buf, 0, &mut info), Ok(3));
    assert_eq!(&buf[..3], b"abc");

    adapter.cleanup(r"\notes.txt", &mut info);
    adapter.close_file(r"\notes.txt", &mut info);
    assert_eq!(info.context, None);
    assert_eq!(adapter.open_handles(), 0);
    assert!(fs.open_files().is_empty());
}

#[test]
fn test_failed_create_releases_op_id() {
    let rt = runtime();
    let adapter = BlockingAdapter::new(Arc::new(MemoryFs::new()), rt.handle().clone());

    let mut info = DriverFileInfo::new();
    assert_eq!(
        open(&adapter, r"\missing.txt", FileMode::Open, &mut info),
        Err(NtStatus::ObjectNameNotFound)
    );
    assert_eq!(info.context, None);
    assert_eq!(adapter.open_handles(), 0);
}

#[test]
fn test_create_reports_directory() {
    let rt = runtime();
    let fs = Arc::new(MemoryFs::new());
    fs.insert_dir("photos").unwrap();
    let adapter = BlockingAdapter::new(fs, rt.handle().clone());

    let mut info = DriverFileInfo::new();
    open(&adapter, r"\photos", FileMode::Open, &mut info).unwrap();
    assert!(info.is_directory);
}

#[test]
fn test_metadata_without_context_uses_defaults() {
    let rt = runtime();
    let fs = Arc::new(MemoryFs::new());
    fs.insert_file("a.txt", "1234").unwrap();
    let adapter = BlockingAdapter::new(fs, rt.handle().clone());

    let mut info = DriverFileInfo::new();
    let listing = adapter.find_files(r"\", &mut info).unwrap();
    assert_eq!(listing.len(), 1);
    let meta = adapter.get_file_information(r"\a.txt", &mut info).unwrap();
    assert_eq!(meta.length, 4);
    assert_eq!(info.context, None, "metadata calls must not allocate handles");
    assert_eq!(adapter.open_handles(), 0);
}

#[test]
fn test_read_without_context_fails_that_call() {
    let rt = runtime();
    let fs = Arc::new(MemoryFs::new());
    fs.insert_file("a.txt", "x").unwrap();
    let adapter = BlockingAdapter::new(fs, rt.handle().clone());

    let mut info = DriverFileInfo::new();
    let mut buf = [0u8; 4];
    assert_eq!(
        adapter.read_file(r"\a.txt", &mut buf, 0, &mut info),
        Err(NtStatus::Unsuccessful)
    );

    // A stale token is no better than none.
    info.context = Some(OpId::new(0, 7));
    assert_eq!(
        adapter.write_file(r"\a.txt", b"y", 0, &mut info),
        Err(NtStatus::Unsuccessful)
    );
}

#[test]
fn test_delete_on_close_through_adapter() {
    let rt = runtime();
    let fs = Arc::new(MemoryFs::new());
    fs.insert_file("old.log", "x").unwrap();
    let adapter = BlockingAdapter::new(fs.clone(), rt.handle().clone());

    let mut info = DriverFileInfo::new();
    open(&adapter, r"\old.log", FileMode::Open, &mut info).unwrap();
    info.delete_on_close = true;
    adapter.delete_file(r"\old.log", &mut info).unwrap();
    assert!(fs.exists("old.log"));
    adapter.cleanup(r"\old.log", &mut info);
    adapter.close_file(r"\old.log", &mut info);
    assert!(!fs.exists("old.log"));
}

#[test]
fn test_security_and_streams_not_implemented() {
    let rt = runtime();
    let adapter = BlockingAdapter::new(Arc::new(MemoryFs::new()), rt.handle().clone());
    let mut info = DriverFileInfo::new();
    assert_eq!(
        adapter.get_file_security(r"\", &mut info),
        Err(NtStatus::NotImplemented)
    );
    assert_eq!(
        adapter.set_file_security(r"\", &[], &mut info),
        Err(NtStatus::NotImplemented)
    );
    assert_eq!(adapter.find_streams(r"\", &mut info), Err(NtStatus::NotImplemented));
}

#[test]
fn test_volume_queries() {
    let rt = runtime();
    let adapter = BlockingAdapter::new(Arc::new(MemoryFs::new()), rt.handle().clone());
    let mut info = DriverFileInfo::new();
    let volume = adapter.get_volume_information(&mut info).unwrap();
    assert_eq!(volume.volume_label, "WebFS");
    let space = adapter.get_disk_free_space(&mut info).unwrap();
    assert!(space.total_bytes >= space.total_free_bytes);
    adapter.mounted("W:", &mut info).unwrap();
    adapter.unmounted(&mut info).unwrap();
}

// ============================================================================
// Gated filesystem: blocks reads of "slow" until released, panics on "boom"
// ============================================================================

struct GatedFs {
    inner: MemoryFs,
    gate: Notify,
}

#[async_trait]
impl AsyncFsOps for GatedFs {
    async fn create_file(
        &self,
        path: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        options: FileOptions,
        attributes: FileAttributes,
        info: &AsyncFileInfo,
    ) -> FsResult<CreateFileReply> {
        if path.contains("boom") {
            panic!("create exploded");
        }
        self.inner
            .create_file(path, access, share, mode, options, attributes, info)
            .await
    }

    async fn cleanup(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.inner.cleanup(path, info).await
    }

    async fn close_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.inner.close_file(path, info).await
    }

    async fn read_file(
        &self,
        path: &str,
        offset: u64,
        max_count: u32,
        info: &AsyncFileInfo,
    ) -> FsResult<Vec<u8>> {
        if path.contains("slow") {
            self.gate.notified().await;
        }
        self.inner.read_file(path, offset, max_count, info).await
    }

    async fn write_file(
        &self,
        path: &str,
        data: &[u8],
        offset: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<u32> {
        self.inner.write_file(path, data, offset, info).await
    }

    async fn flush_file_buffers(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.inner.flush_file_buffers(path, info).await
    }

    async fn set_end_of_file(&self, path: &str, length: u64, info: &AsyncFileInfo) -> FsResult<()> {
        self.inner.set_end_of_file(path, length, info).await
    }

    async fn set_allocation_size(
        &self,
        path: &str,
        length: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.inner.set_allocation_size(path, length, info).await
    }

    async fn get_file_information(
        &self,
        path: &str,
        info: &AsyncFileInfo,
    ) -> FsResult<FileInformation> {
        self.inner.get_file_information(path, info).await
    }

    async fn find_files(&self, path: &str, info: &AsyncFileInfo) -> FsResult<Vec<FileInformation>> {
        self.inner.find_files(path, info).await
    }

    async fn set_file_attributes(
        &self,
        path: &str,
        attributes: FileAttributes,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.inner.set_file_attributes(path, attributes, info).await
    }

    async fn set_file_time(
        &self,
        path: &str,
        creation: Option<SystemTime>,
        last_access: Option<SystemTime>,
        last_write: Option<SystemTime>,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.inner
            .set_file_time(path, creation, last_access, last_write, info)
            .await
    }

    async fn delete_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.inner.delete_file(path, info).await
    }

    async fn delete_directory(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.inner.delete_directory(path, info).await
    }

    async fn move_file(
        &self,
        old_path: &str,
        new_path: &str,
        replace: bool,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.inner.move_file(old_path, new_path, replace, info).await
    }
}

#[test]
fn test_panicking_operation_becomes_status() {
    let rt = runtime();
    let fs = Arc::new(GatedFs {
        inner: MemoryFs::new(),
        gate: Notify::new(),
    });
    let adapter = BlockingAdapter::new(fs, rt.handle().clone());

    let mut info = DriverFileInfo::new();
    assert_eq!(
        open(&adapter, r"\boom", FileMode::CreateNew, &mut info),
        Err(NtStatus::Unsuccessful)
    );
    assert_eq!(adapter.open_handles(), 0);
}

#[test]
fn test_slow_handle_does_not_block_other_handles() {
    let rt = runtime();
    let fs = Arc::new(GatedFs {
        inner: MemoryFs::new(),
        gate: Notify::new(),
    });
    fs.inner.insert_file("slow.bin", "zz").unwrap();
    fs.inner.insert_file("fast.bin", "ok").unwrap();
    let adapter = Arc::new(BlockingAdapter::new(fs.clone(), rt.handle().clone()));

    let mut slow_info = DriverFileInfo::new();
    open(&adapter, r"\slow.bin", FileMode::Open, &mut slow_info).unwrap();

    let slow_adapter = adapter.clone();
    let slow = thread::spawn(move || {
        let mut buf = [0u8; 2];
        slow_adapter.read_file(r"\slow.bin", &mut buf, 0, &mut slow_info)
    });

    // While the slow read is parked, another handle completes normally.
    thread::sleep(Duration::from_millis(50));
    let mut fast_info = DriverFileInfo::new();
    open(&adapter, r"\fast.bin", FileMode::Open, &mut fast_info).unwrap();
    let mut buf = [0u8; 2];
    assert_eq!(adapter.read_file(r"\fast.bin", &mut buf, 0, &mut fast_info), Ok(2));
    assert!(!slow.is_finished());

    fs.gate.notify_one();
    assert_eq!(slow.join().unwrap(), Ok(2));
}
