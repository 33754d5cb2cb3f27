//! Filesystem calls over a peer connection.
//!
//! Both directions use the same argument layout: the operation's parameters
//! in declaration order, with the [`AsyncFileInfo`] context last. Byte
//! buffers travel as MessagePack `bin`. Results with a value come back as the
//! reply payload; unit results carry none.

use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_bytes::{ByteBuf, Bytes};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use tracing::{debug, trace};
use webfs_kernel::{AsyncFsOps, SharedFsOps};
use webfs_types::{
    AsyncFileInfo, CreateFileReply, DiskFreeSpace, FileAccess, FileAttributes, FileInformation,
    FileMode, FileOptions, FileShare, FsResult, NtStatus, VolumeInformation,
};

use crate::codec::{ArgList, Element, LazyElementList};
use crate::connection::{CallHandler, PeerConnection};
use crate::error::{ProtocolError, RpcError};

/// Method names on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, IntoStaticStr, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum FsMethod {
    CreateFile,
    Cleanup,
    CloseFile,
    ReadFile,
    WriteFile,
    FlushFileBuffers,
    SetEndOfFile,
    SetAllocationSize,
    LockFile,
    UnlockFile,
    GetFileInformation,
    FindFiles,
    FindFilesWithPattern,
    SetFileAttributes,
    SetFileTime,
    DeleteFile,
    DeleteDirectory,
    MoveFile,
    GetDiskFreeSpace,
    GetVolumeInformation,
    Mounted,
    Unmounted,
    GetFileSecurity,
    SetFileSecurity,
    FindStreams,
}

// ============================================================================
// Serving side
// ============================================================================

/// Answers filesystem calls from a local [`AsyncFsOps`].
pub struct FsService {
    ops: SharedFsOps,
}

impl FsService {
    pub fn new(ops: SharedFsOps) -> Self {
        Self { ops }
    }
}

fn arg<T: DeserializeOwned>(args: &mut LazyElementList, method: FsMethod) -> Result<T, NtStatus> {
    args.take_first_as().map_err(|e| {
        debug!(%method, "bad argument: {e}");
        NtStatus::from(e)
    })
}

fn payload<T: Serialize + ?Sized>(value: &T) -> Result<Option<Element>, NtStatus> {
    Element::encode(value).map(Some).map_err(|e| {
        debug!("could not encode reply payload: {e}");
        NtStatus::Unsuccessful
    })
}

fn unit(result: FsResult<()>) -> Result<Option<Element>, NtStatus> {
    result.map(|()| None)
}

#[async_trait]
impl CallHandler for FsService {
    async fn handle_call(&self, method: &str, mut args: LazyElementList) -> Result<Option<Element>, NtStatus> {
        let Ok(method) = FsMethod::from_str(method) else {
            debug!(method, "unknown method");
            return Err(NtStatus::NotImplemented);
        };
        trace!(%method, args = args.len(), "serving");
        let a = &mut args;
        let ops = &self.ops;

        match method {
            FsMethod::CreateFile => {
                let path: String = arg(a, method)?;
                let access: FileAccess = arg(a, method)?;
                let share: FileShare = arg(a, method)?;
                let mode: FileMode = arg(a, method)?;
                let options: FileOptions = arg(a, method)?;
                let attributes: FileAttributes = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                let reply = ops
                    .create_file(&path, access, share, mode, options, attributes, &info)
                    .await?;
                payload(&reply)
            }
            FsMethod::Cleanup => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                unit(ops.cleanup(&path, &info).await)
            }
            FsMethod::CloseFile => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                unit(ops.close_file(&path, &info).await)
            }
            FsMethod::ReadFile => {
                let path: String = arg(a, method)?;
                let offset: u64 = arg(a, method)?;
                let max_count: u32 = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                let data = ops.read_file(&path, offset, max_count, &info).await?;
                payload(Bytes::new(&data))
            }
            FsMethod::WriteFile => {
                let path: String = arg(a, method)?;
                let data: ByteBuf = arg(a, method)?;
                let offset: u64 = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                let written = ops.write_file(&path, &data, offset, &info).await?;
                payload(&written)
            }
            FsMethod::FlushFileBuffers => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                unit(ops.flush_file_buffers(&path, &info).await)
            }
            FsMethod::SetEndOfFile | FsMethod::SetAllocationSize => {
                let path: String = arg(a, method)?;
                let length: u64 = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                if method == FsMethod::SetEndOfFile {
                    unit(ops.set_end_of_file(&path, length, &info).await)
                } else {
                    unit(ops.set_allocation_size(&path, length, &info).await)
                }
            }
            FsMethod::LockFile | FsMethod::UnlockFile => {
                let path: String = arg(a, method)?;
                let offset: u64 = arg(a, method)?;
                let length: u64 = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                if method == FsMethod::LockFile {
                    unit(ops.lock_file(&path, offset, length, &info).await)
                } else {
                    unit(ops.unlock_file(&path, offset, length, &info).await)
                }
            }
            FsMethod::GetFileInformation => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                payload(&ops.get_file_information(&path, &info).await?)
            }
            FsMethod::FindFiles => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                payload(&ops.find_files(&path, &info).await?)
            }
            FsMethod::FindFilesWithPattern => {
                let path: String = arg(a, method)?;
                let pattern: String = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                payload(&ops.find_files_with_pattern(&path, &pattern, &info).await?)
            }
            FsMethod::SetFileAttributes => {
                let path: String = arg(a, method)?;
                let attributes: FileAttributes = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                unit(ops.set_file_attributes(&path, attributes, &info).await)
            }
            FsMethod::SetFileTime => {
                let path: String = arg(a, method)?;
                let creation: Option<SystemTime> = arg(a, method)?;
                let last_access: Option<SystemTime> = arg(a, method)?;
                let last_write: Option<SystemTime> = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                unit(
                    ops.set_file_time(&path, creation, last_access, last_write, &info)
                        .await,
                )
            }
            FsMethod::DeleteFile => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                unit(ops.delete_file(&path, &info).await)
            }
            FsMethod::DeleteDirectory => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                unit(ops.delete_directory(&path, &info).await)
            }
            FsMethod::MoveFile => {
                let old_path: String = arg(a, method)?;
                let new_path: String = arg(a, method)?;
                let replace: bool = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                unit(ops.move_file(&old_path, &new_path, replace, &info).await)
            }
            FsMethod::GetDiskFreeSpace => {
                let info: AsyncFileInfo = arg(a, method)?;
                payload(&ops.get_disk_free_space(&info).await?)
            }
            FsMethod::GetVolumeInformation => {
                let info: AsyncFileInfo = arg(a, method)?;
                payload(&ops.get_volume_information(&info).await?)
            }
            FsMethod::Mounted => {
                let (mount_point, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                unit(ops.mounted(&mount_point, &info).await)
            }
            FsMethod::Unmounted => {
                let info: AsyncFileInfo = arg(a, method)?;
                unit(ops.unmounted(&info).await)
            }
            FsMethod::GetFileSecurity => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                let descriptor = ops.get_file_security(&path, &info).await?;
                payload(Bytes::new(&descriptor))
            }
            FsMethod::SetFileSecurity => {
                let path: String = arg(a, method)?;
                let descriptor: ByteBuf = arg(a, method)?;
                let info: AsyncFileInfo = arg(a, method)?;
                unit(ops.set_file_security(&path, &descriptor, &info).await)
            }
            FsMethod::FindStreams => {
                let (path, info): (String, AsyncFileInfo) = (arg(a, method)?, arg(a, method)?);
                payload(&ops.find_streams(&path, &info).await?)
            }
        }
    }
}

// ============================================================================
// Calling side
// ============================================================================

/// Builds an argument list, stopping at the first value that fails to encode.
macro_rules! args {
    ($($value:expr),* $(,)?) => {
        (|| -> Result<ArgList, ProtocolError> { Ok(ArgList::new()$(.arg($value)?)*) })()
    };
}

/// [`AsyncFsOps`] that forwards every call to the peer on the other end of a
/// connection.
#[derive(Clone)]
pub struct RemoteFs {
    conn: Arc<PeerConnection>,
}

impl RemoteFs {
    pub fn new(conn: Arc<PeerConnection>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Arc<PeerConnection> {
        &self.conn
    }

    async fn invoke(
        &self,
        method: FsMethod,
        args: Result<ArgList, ProtocolError>,
    ) -> FsResult<Option<Element>> {
        let args = args.map_err(|e| {
            debug!(%method, "could not encode arguments: {e}");
            NtStatus::InvalidParameter
        })?;
        self.conn.call(method.as_ref(), args).await.map_err(|e| {
            match &e {
                RpcError::Remote(status) => trace!(%method, ?status, "remote failure"),
                other => debug!(%method, conn = %self.conn.id(), "call failed: {other}"),
            }
            NtStatus::from(e)
        })
    }

    async fn invoke_unit(&self, method: FsMethod, args: Result<ArgList, ProtocolError>) -> FsResult<()> {
        self.invoke(method, args).await.map(|_| ())
    }

    async fn invoke_as<T: DeserializeOwned>(
        &self,
        method: FsMethod,
        args: Result<ArgList, ProtocolError>,
    ) -> FsResult<T> {
        let element = self.invoke(method, args).await?.ok_or_else(|| {
            debug!(%method, "{}", ProtocolError::MissingPayload);
            NtStatus::Unsuccessful
        })?;
        element.decode().map_err(|e| {
            debug!(%method, "bad reply payload: {e}");
            NtStatus::Unsuccessful
        })
    }
}

#[async_trait]
impl AsyncFsOps for RemoteFs {
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
        self.invoke_as(
            FsMethod::CreateFile,
            args![path, &access, &share, &mode, &options, &attributes, info],
        )
        .await
    }

    async fn cleanup(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.invoke_unit(FsMethod::Cleanup, args![path, info]).await
    }

    async fn close_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.invoke_unit(FsMethod::CloseFile, args![path, info]).await
    }

    async fn read_file(
        &self,
        path: &str,
        offset: u64,
        max_count: u32,
        info: &AsyncFileInfo,
    ) -> FsResult<Vec<u8>> {
        let data: ByteBuf = self
            .invoke_as(FsMethod::ReadFile, args![path, &offset, &max_count, info])
            .await?;
        Ok(data.into_vec())
    }

    async fn write_file(
        &self,
        path: &str,
        data: &[u8],
        offset: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<u32> {
        self.invoke_as(FsMethod::WriteFile, args![path, Bytes::new(data), &offset, info])
            .await
    }

    async fn flush_file_buffers(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.invoke_unit(FsMethod::FlushFileBuffers, args![path, info]).await
    }

    async fn set_end_of_file(&self, path: &str, length: u64, info: &AsyncFileInfo) -> FsResult<()> {
        self.invoke_unit(FsMethod::SetEndOfFile, args![path, &length, info])
            .await
    }

    async fn set_allocation_size(
        &self,
        path: &str,
        length: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.invoke_unit(FsMethod::SetAllocationSize, args![path, &length, info])
            .await
    }

    async fn lock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.invoke_unit(FsMethod::LockFile, args![path, &offset, &length, info])
            .await
    }

    async fn unlock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.invoke_unit(FsMethod::UnlockFile, args![path, &offset, &length, info])
            .await
    }

    async fn get_file_information(
        &self,
        path: &str,
        info: &AsyncFileInfo,
    ) -> FsResult<FileInformation> {
        self.invoke_as(FsMethod::GetFileInformation, args![path, info])
            .await
    }

    async fn find_files(&self, path: &str, info: &AsyncFileInfo) -> FsResult<Vec<FileInformation>> {
        self.invoke_as(FsMethod::FindFiles, args![path, info]).await
    }

    async fn find_files_with_pattern(
        &self,
        path: &str,
        pattern: &str,
        info: &AsyncFileInfo,
    ) -> FsResult<Vec<FileInformation>> {
        self.invoke_as(FsMethod::FindFilesWithPattern, args![path, pattern, info])
            .await
    }

    async fn set_file_attributes(
        &self,
        path: &str,
        attributes: FileAttributes,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.invoke_unit(FsMethod::SetFileAttributes, args![path, &attributes, info])
            .await
    }

    async fn set_file_time(
        &self,
        path: &str,
        creation: Option<SystemTime>,
        last_access: Option<SystemTime>,
        last_write: Option<SystemTime>,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.invoke_unit(
            FsMethod::SetFileTime,
            args![path, &creation, &last_access, &last_write, info],
        )
        .await
    }

    async fn delete_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.invoke_unit(FsMethod::DeleteFile, args![path, info]).await
    }

    async fn delete_directory(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.invoke_unit(FsMethod::DeleteDirectory, args![path, info])
            .await
    }

    async fn move_file(
        &self,
        old_path: &str,
        new_path: &str,
        replace: bool,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.invoke_unit(FsMethod::MoveFile, args![old_path, new_path, &replace, info])
            .await
    }

    async fn get_disk_free_space(&self, info: &AsyncFileInfo) -> FsResult<DiskFreeSpace> {
        self.invoke_as(FsMethod::GetDiskFreeSpace, args![info]).await
    }

    async fn get_volume_information(&self, info: &AsyncFileInfo) -> FsResult<VolumeInformation> {
        self.invoke_as(FsMethod::GetVolumeInformation, args![info])
            .await
    }

    async fn mounted(&self, mount_point: &str, info: &AsyncFileInfo) -> FsResult<()> {
        self.invoke_unit(FsMethod::Mounted, args![mount_point, info]).await
    }

    async fn unmounted(&self, info: &AsyncFileInfo) -> FsResult<()> {
        self.invoke_unit(FsMethod::Unmounted, args![info]).await
    }

    async fn get_file_security(&self, path: &str, info: &AsyncFileInfo) -> FsResult<Vec<u8>> {
        let descriptor: ByteBuf = self
            .invoke_as(FsMethod::GetFileSecurity, args![path, info])
            .await?;
        Ok(descriptor.into_vec())
    }

    async fn set_file_security(
        &self,
        path: &str,
        descriptor: &[u8],
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        self.invoke_unit(
            FsMethod::SetFileSecurity,
            args![path, Bytes::new(descriptor), info],
        )
        .await
    }

    async fn find_streams(&self, path: &str, info: &AsyncFileInfo) -> FsResult<Vec<FileInformation>> {
        self.invoke_as(FsMethod::FindStreams, args![path, info]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use webfs_kernel::MemoryFs;
    use webfs_types::OpId;

    #[test]
    fn test_method_names_are_snake_case() {
        assert_eq!(FsMethod::CreateFile.as_ref(), "create_file");
        assert_eq!(FsMethod::FindFilesWithPattern.as_ref(), "find_files_with_pattern");
        for method in FsMethod::iter() {
            assert_eq!(FsMethod::from_str(method.as_ref()).unwrap(), method);
        }
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_implemented() {
        let service = FsService::new(Arc::new(MemoryFs::new()));
        let args = LazyElementList::decode(&ArgList::new().encode()).unwrap();
        assert_eq!(
            service.handle_call("format_drive", args).await,
            Err(NtStatus::NotImplemented)
        );
    }

    #[tokio::test]
    async fn test_missing_argument_is_invalid_parameter() {
        let service = FsService::new(Arc::new(MemoryFs::new()));
        let encoded = ArgList::new().arg("a.txt").unwrap().encode();
        let args = LazyElementList::decode(&encoded).unwrap();
        assert_eq!(
            service.handle_call("get_file_information", args).await,
            Err(NtStatus::InvalidParameter)
        );
    }

    #[tokio::test]
    async fn test_read_reply_is_binary() {
        let fs = MemoryFs::new();
        fs.insert_file("a.txt", "hello").unwrap();
        let service = FsService::new(Arc::new(fs));
        let info = AsyncFileInfo::new(OpId::new(1, 1));
        let open = ArgList::new()
            .arg("a.txt")
            .unwrap()
            .arg(&FileAccess::GENERIC_READ)
            .unwrap()
            .arg(&FileShare::READ)
            .unwrap()
            .arg(&FileMode::Open)
            .unwrap()
            .arg(&FileOptions::empty())
            .unwrap()
            .arg(&FileAttributes::NORMAL)
            .unwrap()
            .arg(&info)
            .unwrap()
            .encode();
        let reply = service
            .handle_call("create_file", LazyElementList::decode(&open).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(!reply.decode::<CreateFileReply>().unwrap().is_directory);

        let read = args!["a.txt", &0u64, &16u32, &info].unwrap().encode();
        let reply = service
            .handle_call("read_file", LazyElementList::decode(&read).unwrap())
            .await
            .unwrap()
            .unwrap();
        // bin8 marker
        assert_eq!(reply.raw()[0], 0xc4);
        assert_eq!(reply.decode::<ByteBuf>().unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_unit_results_have_no_payload() {
        let fs = MemoryFs::new();
        fs.insert_dir("docs").unwrap();
        let service = FsService::new(Arc::new(fs));
        let encoded = args!["", &AsyncFileInfo::new(OpId::DETACHED)].unwrap().encode();
        let listing = service
            .handle_call("find_files", LazyElementList::decode(&encoded).unwrap())
            .await
            .unwrap()
            .unwrap()
            .decode::<Vec<FileInformation>>()
            .unwrap();
        assert_eq!(listing.len(), 1);

        let encoded = args![&AsyncFileInfo::new(OpId::DETACHED)].unwrap().encode();
        assert_eq!(
            service
                .handle_call("unmounted", LazyElementList::decode(&encoded).unwrap())
                .await,
            Ok(None)
        );
    }
}
