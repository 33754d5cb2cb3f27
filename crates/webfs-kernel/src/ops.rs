//! Asynchronous filesystem operations trait.
//!
//! This is the surface forwarded across the bridge. It mirrors the driver
//! callback set one-to-one, but every method is async and returns its
//! out-parameters in the `Ok` value instead of filling caller buffers.
//!
//! Paths are strings: drive paths (`\peer\a.txt`) at the router, peer-relative
//! paths (`a.txt`) at a peer.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use webfs_types::{
    AsyncFileInfo, CreateFileReply, DiskFreeSpace, FileAccess, FileAttributes, FileInformation,
    FileMode, FileOptions, FileShare, FsResult, NtStatus, VolumeInformation,
};

/// Shared trait object used by the adapter, the router, and the RPC service.
pub type SharedFsOps = Arc<dyn AsyncFsOps>;

/// Core asynchronous filesystem operations.
///
/// `info` carries the handle token ([`AsyncFileInfo::op_id`]) so an
/// implementation can find the context its `create_file` set up.
#[async_trait]
pub trait AsyncFsOps: Send + Sync {
    // ========================================================================
    // Handle lifecycle
    // ========================================================================

    /// Open or create a file or directory.
    ///
    /// On success the implementation owns a context for `info.op_id` until
    /// `close_file`. On failure it must not keep one.
    #[allow(clippy::too_many_arguments)]
    async fn create_file(
        &self,
        path: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        options: FileOptions,
        attributes: FileAttributes,
        info: &AsyncFileInfo,
    ) -> FsResult<CreateFileReply>;

    /// Last user handle closed. Pending delete-on-close happens here.
    async fn cleanup(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()>;

    /// Handle fully released; the context for `info.op_id` is dropped.
    async fn close_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()>;

    // ========================================================================
    // Data
    // ========================================================================

    /// Read up to `max_count` bytes at `offset`. Short reads at EOF.
    async fn read_file(
        &self,
        path: &str,
        offset: u64,
        max_count: u32,
        info: &AsyncFileInfo,
    ) -> FsResult<Vec<u8>>;

    /// Write `data` at `offset` (or at EOF when `info.write_to_end_of_file`).
    /// Returns bytes written.
    async fn write_file(
        &self,
        path: &str,
        data: &[u8],
        offset: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<u32>;

    async fn flush_file_buffers(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()>;

    async fn set_end_of_file(&self, path: &str, length: u64, info: &AsyncFileInfo)
    -> FsResult<()>;

    async fn set_allocation_size(
        &self,
        path: &str,
        length: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<()>;

    async fn lock_file(
        &self,
        _path: &str,
        _offset: u64,
        _length: u64,
        _info: &AsyncFileInfo,
    ) -> FsResult<()> {
        Err(NtStatus::NotImplemented)
    }

    async fn unlock_file(
        &self,
        _path: &str,
        _offset: u64,
        _length: u64,
        _info: &AsyncFileInfo,
    ) -> FsResult<()> {
        Err(NtStatus::NotImplemented)
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    async fn get_file_information(
        &self,
        path: &str,
        info: &AsyncFileInfo,
    ) -> FsResult<FileInformation>;

    /// List a directory. Names in the result are bare entry names.
    async fn find_files(&self, path: &str, info: &AsyncFileInfo)
    -> FsResult<Vec<FileInformation>>;

    /// Pattern search. `NotImplemented` makes the driver fall back to
    /// [`find_files`](Self::find_files) and filter itself.
    async fn find_files_with_pattern(
        &self,
        _path: &str,
        _pattern: &str,
        _info: &AsyncFileInfo,
    ) -> FsResult<Vec<FileInformation>> {
        Err(NtStatus::NotImplemented)
    }

    async fn set_file_attributes(
        &self,
        path: &str,
        attributes: FileAttributes,
        info: &AsyncFileInfo,
    ) -> FsResult<()>;

    /// Update times; `None` leaves a time unchanged.
    async fn set_file_time(
        &self,
        path: &str,
        creation: Option<SystemTime>,
        last_access: Option<SystemTime>,
        last_write: Option<SystemTime>,
        info: &AsyncFileInfo,
    ) -> FsResult<()>;

    // ========================================================================
    // Namespace
    // ========================================================================

    /// Check whether a file may be deleted and record the intent on the
    /// handle. The delete itself happens at cleanup.
    async fn delete_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()>;

    /// Directory counterpart of [`delete_file`](Self::delete_file).
    async fn delete_directory(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()>;

    async fn move_file(
        &self,
        old_path: &str,
        new_path: &str,
        replace: bool,
        info: &AsyncFileInfo,
    ) -> FsResult<()>;

    // ========================================================================
    // Volume
    // ========================================================================

    async fn get_disk_free_space(&self, _info: &AsyncFileInfo) -> FsResult<DiskFreeSpace> {
        Ok(DiskFreeSpace::default())
    }

    async fn get_volume_information(&self, _info: &AsyncFileInfo) -> FsResult<VolumeInformation> {
        Ok(VolumeInformation::default())
    }

    async fn mounted(&self, _mount_point: &str, _info: &AsyncFileInfo) -> FsResult<()> {
        Ok(())
    }

    async fn unmounted(&self, _info: &AsyncFileInfo) -> FsResult<()> {
        Ok(())
    }

    // ========================================================================
    // Unsupported: security descriptors and alternate streams
    // ========================================================================

    async fn get_file_security(&self, _path: &str, _info: &AsyncFileInfo) -> FsResult<Vec<u8>> {
        Err(NtStatus::NotImplemented)
    }

    async fn set_file_security(
        &self,
        _path: &str,
        _descriptor: &[u8],
        _info: &AsyncFileInfo,
    ) -> FsResult<()> {
        Err(NtStatus::NotImplemented)
    }

    async fn find_streams(
        &self,
        _path: &str,
        _info: &AsyncFileInfo,
    ) -> FsResult<Vec<FileInformation>> {
        Err(NtStatus::NotImplemented)
    }
}
