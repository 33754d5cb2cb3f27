//! Blocking adapter from driver callbacks to async operations.
//!
//! The driver calls on its own worker threads and wants a status back before
//! the callback returns. Each callback here spawns the matching
//! [`AsyncFsOps`] call onto a tokio runtime and parks the calling thread on
//! the task's completion. Work for different handles runs on independent
//! tasks, so a slow peer only holds up the driver threads waiting on it.
//!
//! The adapter adds no timeout of its own; the async layer bounds its waits.

use std::future::Future;

use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};
use webfs_types::{
    AsyncFileInfo, DiskFreeSpace, FileAccess, FileAttributes, FileInformation, FileMode,
    FileOptions, FileShare, FsResult, NtStatus, OpId, VolumeInformation,
};

use crate::driver::{DriverFileInfo, DriverOps};
use crate::handles::HandleTable;
use crate::ops::SharedFsOps;

/// What the adapter remembers about a live handle.
#[derive(Debug, Clone)]
struct OpenHandle {
    path: String,
}

/// Implements [`DriverOps`] over any [`AsyncFsOps`](crate::AsyncFsOps).
pub struct BlockingAdapter {
    ops: SharedFsOps,
    runtime: Handle,
    handles: HandleTable<OpenHandle>,
}

impl BlockingAdapter {
    pub fn new(ops: SharedFsOps, runtime: Handle) -> Self {
        Self {
            ops,
            runtime,
            handles: HandleTable::new(),
        }
    }

    /// Number of handles between create and close.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Run `fut` on the runtime and block this thread until it finishes.
    ///
    /// A panicking or cancelled task becomes `Unsuccessful`.
    fn run<T, F>(&self, op: &'static str, fut: F) -> FsResult<T>
    where
        F: Future<Output = FsResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let task = self.runtime.spawn(fut);
        match futures::executor::block_on(task) {
            Ok(result) => {
                if let Err(status) = &result {
                    trace!(op, ?status, "operation failed");
                }
                result
            }
            Err(e) => {
                error!(op, "operation task failed: {e}");
                Err(NtStatus::Unsuccessful)
            }
        }
    }

    fn live_op_id(&self, info: &DriverFileInfo) -> Option<OpId> {
        info.context.filter(|id| self.handles.contains(*id))
    }

    fn async_info(op_id: OpId, info: &DriverFileInfo) -> AsyncFileInfo {
        AsyncFileInfo {
            op_id,
            is_directory: info.is_directory,
            delete_on_close: info.delete_on_close,
            write_to_end_of_file: info.write_to_end_of_file,
        }
    }

    /// Context for calls that tolerate a handle the adapter never saw.
    fn lenient(&self, info: &DriverFileInfo) -> AsyncFileInfo {
        let op_id = self.live_op_id(info).unwrap_or(OpId::DETACHED);
        Self::async_info(op_id, info)
    }

    /// Context for calls that need an open handle.
    fn strict(&self, op: &'static str, path: &str, info: &DriverFileInfo) -> FsResult<AsyncFileInfo> {
        match self.live_op_id(info) {
            Some(op_id) => Ok(Self::async_info(op_id, info)),
            None => {
                warn!(op, path, context = ?info.context, "no open handle for call");
                Err(NtStatus::Unsuccessful)
            }
        }
    }

    fn release(&self, info: &mut DriverFileInfo) {
        let Some(op_id) = info.context.take() else {
            return;
        };
        if let Some(handle) = self.handles.remove(op_id) {
            trace!(%op_id, path = %handle.path, "handle released");
        }
    }
}

impl DriverOps for BlockingAdapter {
    fn create_file(
        &self,
        path: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        options: FileOptions,
        attributes: FileAttributes,
        info: &mut DriverFileInfo,
    ) -> FsResult<()> {
        let op_id = match self.live_op_id(info) {
            Some(id) => id,
            None => {
                let id = self.handles.insert(OpenHandle {
                    path: path.to_string(),
                });
                info.context = Some(id);
                id
            }
        };
        let ainfo = Self::async_info(op_id, info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        let result = self.run("create_file", async move {
            ops.create_file(&owned, access, share, mode, options, attributes, &ainfo)
                .await
        });
        match result {
            Ok(reply) => {
                info.is_directory = reply.is_directory;
                debug!(%op_id, path, is_directory = reply.is_directory, "opened");
                Ok(())
            }
            Err(status) => {
                // The driver sends no cleanup or close after a failed create.
                self.release(info);
                Err(status)
            }
        }
    }

    fn cleanup(&self, path: &str, info: &mut DriverFileInfo) {
        let Some(op_id) = self.live_op_id(info) else {
            debug!(path, "cleanup without open handle");
            return;
        };
        let ainfo = Self::async_info(op_id, info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        if let Err(status) = self.run("cleanup", async move { ops.cleanup(&owned, &ainfo).await }) {
            warn!(%op_id, path, ?status, "cleanup failed");
        }
    }

    fn close_file(&self, path: &str, info: &mut DriverFileInfo) {
        let Some(op_id) = self.live_op_id(info) else {
            debug!(path, "close without open handle");
            info.context = None;
            return;
        };
        let ainfo = Self::async_info(op_id, info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        if let Err(status) = self.run("close_file", async move { ops.close_file(&owned, &ainfo).await }) {
            warn!(%op_id, path, ?status, "close failed");
        }
        self.release(info);
    }

    fn read_file(
        &self,
        path: &str,
        buffer: &mut [u8],
        offset: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<usize> {
        let ainfo = self.strict("read_file", path, info)?;
        let ops = self.ops.clone();
        let owned = path.to_string();
        let max_count = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
        let data = self.run("read_file", async move {
            ops.read_file(&owned, offset, max_count, &ainfo).await
        })?;
        let n = data.len().min(buffer.len());
        buffer[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn write_file(
        &self,
        path: &str,
        buffer: &[u8],
        offset: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<u32> {
        let ainfo = self.strict("write_file", path, info)?;
        let ops = self.ops.clone();
        let owned = path.to_string();
        let data = buffer.to_vec();
        self.run("write_file", async move {
            ops.write_file(&owned, &data, offset, &ainfo).await
        })
    }

    fn flush_file_buffers(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("flush_file_buffers", async move {
            ops.flush_file_buffers(&owned, &ainfo).await
        })
    }

    fn get_file_information(
        &self,
        path: &str,
        info: &mut DriverFileInfo,
    ) -> FsResult<FileInformation> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("get_file_information", async move {
            ops.get_file_information(&owned, &ainfo).await
        })
    }

    fn find_files(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<Vec<FileInformation>> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("find_files", async move { ops.find_files(&owned, &ainfo).await })
    }

    fn find_files_with_pattern(
        &self,
        path: &str,
        pattern: &str,
        info: &mut DriverFileInfo,
    ) -> FsResult<Vec<FileInformation>> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        let pattern = pattern.to_string();
        self.run("find_files_with_pattern", async move {
            ops.find_files_with_pattern(&owned, &pattern, &ainfo).await
        })
    }

    fn set_file_attributes(
        &self,
        path: &str,
        attributes: FileAttributes,
        info: &mut DriverFileInfo,
    ) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("set_file_attributes", async move {
            ops.set_file_attributes(&owned, attributes, &ainfo).await
        })
    }

    fn set_file_time(
        &self,
        path: &str,
        creation: Option<std::time::SystemTime>,
        last_access: Option<std::time::SystemTime>,
        last_write: Option<std::time::SystemTime>,
        info: &mut DriverFileInfo,
    ) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("set_file_time", async move {
            ops.set_file_time(&owned, creation, last_access, last_write, &ainfo)
                .await
        })
    }

    fn delete_file(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("delete_file", async move { ops.delete_file(&owned, &ainfo).await })
    }

    fn delete_directory(&self, path: &str, info: &mut DriverFileInfo) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("delete_directory", async move {
            ops.delete_directory(&owned, &ainfo).await
        })
    }

    fn move_file(
        &self,
        old_path: &str,
        new_path: &str,
        replace: bool,
        info: &mut DriverFileInfo,
    ) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let from = old_path.to_string();
        let to = new_path.to_string();
        self.run("move_file", async move {
            ops.move_file(&from, &to, replace, &ainfo).await
        })
    }

    fn set_end_of_file(&self, path: &str, length: u64, info: &mut DriverFileInfo) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("set_end_of_file", async move {
            ops.set_end_of_file(&owned, length, &ainfo).await
        })
    }

    fn set_allocation_size(
        &self,
        path: &str,
        length: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("set_allocation_size", async move {
            ops.set_allocation_size(&owned, length, &ainfo).await
        })
    }

    fn lock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("lock_file", async move {
            ops.lock_file(&owned, offset, length, &ainfo).await
        })
    }

    fn unlock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        info: &mut DriverFileInfo,
    ) -> FsResult<()> {
        let ainfo = self.lenient(info);
        let ops = self.ops.clone();
        let owned = path.to_string();
        self.run("unlock_file", async move {
            ops.unlock_file(&owned, offset, length, &ainfo).await
        })
    }

    fn get_disk_free_space(&self, info: &mut DriverFileInfo) -> FsResult<DiskFreeSpace> {
        let ainfo = Self::async_info(OpId::DETACHED, info);
        let ops = self.ops.clone();
        self.run("get_disk_free_space", async move {
            ops.get_disk_free_space(&ainfo).await
        })
    }

    fn get_volume_information(&self, info: &mut DriverFileInfo) -> FsResult<VolumeInformation> {
        let ainfo = Self::async_info(OpId::DETACHED, info);
        let ops = self.ops.clone();
        self.run("get_volume_information", async move {
            ops.get_volume_information(&ainfo).await
        })
    }

    fn get_file_security(&self, _path: &str, _info: &mut DriverFileInfo) -> FsResult<Vec<u8>> {
        Err(NtStatus::NotImplemented)
    }

    fn set_file_security(
        &self,
        _path: &str,
        _descriptor: &[u8],
        _info: &mut DriverFileInfo,
    ) -> FsResult<()> {
        Err(NtStatus::NotImplemented)
    }

    fn find_streams(
        &self,
        _path: &str,
        _info: &mut DriverFileInfo,
    ) -> FsResult<Vec<FileInformation>> {
        Err(NtStatus::NotImplemented)
    }

    fn mounted(&self, mount_point: &str, info: &mut DriverFileInfo) -> FsResult<()> {
        let ainfo = Self::async_info(OpId::DETACHED, info);
        let ops = self.ops.clone();
        let owned = mount_point.to_string();
        self.run("mounted", async move { ops.mounted(&owned, &ainfo).await })
    }

    fn unmounted(&self, info: &mut DriverFileInfo) -> FsResult<()> {
        let ainfo = Self::async_info(OpId::DETACHED, info);
        let ops = self.ops.clone();
        self.run("unmounted", async move { ops.unmounted(&ainfo).await })
    }
}
