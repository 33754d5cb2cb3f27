//! Synchronous driver callback interface.
//!
//! This is the shape a user-mode filesystem driver binding (Dokan, WinFsp,
//! FUSE) calls into: blocking callbacks on driver-owned worker threads, each
//! returning a status immediately, with out-parameters filled in place.

use std::time::SystemTime;

use webfs_types::{
    DiskFreeSpace, FileAccess, FileAttributes, FileInformation, FileMode, FileOptions, FileShare,
    FsResult, OpId, VolumeInformation,
};

/// Per-handle state owned by the driver framework.
///
/// The framework hands the same logical slot to every callback for a handle
/// but does not promise the same object, so the only thing stored in it is
/// the [`OpId`] in `context`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverFileInfo {
    /// Handle token, attached on first use by the adapter.
    pub context: Option<OpId>,
    pub is_directory: bool,
    pub delete_on_close: bool,
    pub write_to_end_of_file: bool,
    /// Requesting process, for logging.
    pub process_id: u32,
}

impl DriverFileInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory() -> Self {
        Self {
            is_directory: true,
            ..Self::default()
        }
    }
}

/// Synchronous filesystem callbacks.
///
/// Every callback must return; none may panic across the driver boundary.
pub trait DriverOps: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn create_file(
        &self,
        path: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        options: FileOptions,
        attributes: FileAttributes,
        info: &mut DriverFileInfo,
    ) -> FsResult<()>;

    fn cleanup(&self, path: &str, info: &mut DriverFileInfo);

    fn close_file(&self, path: &str, info: &mut DriverFileInfo);

    /// Fill `buffer` from `offset`; returns bytes read.
    fn read_file(
        &self,
        path: &str,
        buffer: &mut [u8],
        offset: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<usize>;

    /// Returns bytes written.
    fn write_file(
        &self,
        path: &str,
        buffer: &[u8],
        offset: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<u32>;

    fn flush_file_buffers(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<()>;

    fn get_file_information(&self, path: &str, info: &mut DriverFileInfo)
    -> FsResult<FileInformation>;

    fn find_files(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<Vec<FileInformation>>;

    fn find_files_with_pattern(
        &self,
        path: &str,
        pattern: &str,
        info: &mut DriverFileInfo,
    ) -> FsResult<Vec<FileInformation>>;

    fn set_file_attributes(
        &self,
        path: &str,
        attributes: FileAttributes,
        info: &mut DriverFileInfo,
    ) -> FsResult<()>;

    fn set_file_time(
        &self,
        path: &str,
        creation: Option<SystemTime>,
        last_access: Option<SystemTime>,
        last_write: Option<SystemTime>,
        info: &mut DriverFileInfo,
    ) -> FsResult<()>;

    fn delete_file(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<()>;

    fn delete_directory(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<()>;

    fn move_file(
        &self,
        old_path: &str,
        new_path: &str,
        replace: bool,
        info: &mut DriverFileInfo,
    ) -> FsResult<()>;

    fn set_end_of_file(&self, path: &str, length: u64, info: &mut DriverFileInfo) -> FsResult<()>;

    fn set_allocation_size(
        &self,
        path: &str,
        length: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<()>;

    fn lock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<()>;

    fn unlock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<()>;

    fn get_disk_free_space(&self, info: &mut DriverFileInfo) -> FsResult<DiskFreeSpace>;

    fn get_volume_information(&self, info: &mut DriverFileInfo) -> FsResult<VolumeInformation>;

    fn get_file_security(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<Vec<u8>>;

    fn set_file_security(
        &self,
        path: &str,
        descriptor: &[u8],
        info: &mut DriverFileInfo,
    ) -> FsResult<()>;

    fn find_streams(&self, path: &str, info: &mut DriverFileInfo)
    -> FsResult<Vec<FileInformation>>;

    fn mounted(&self, mount_point: &str, info: &mut DriverFileInfo) -> FsResult<()>;

    fn unmounted(&self, info: &mut DriverFileInfo) -> FsResult<()>;
}
