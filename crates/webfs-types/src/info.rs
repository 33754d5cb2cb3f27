//! File metadata and per-call result payloads.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::flags::{FileAttributes, FileSystemFeatures};
use crate::ids::OpId;

/// Metadata for one file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInformation {
    /// Name relative to the directory being listed, or the full
    /// drive-relative path for `get_file_information`.
    pub file_name: String,
    pub attributes: FileAttributes,
    pub creation_time: Option<SystemTime>,
    pub last_access_time: Option<SystemTime>,
    pub last_write_time: Option<SystemTime>,
    pub length: u64,
}

impl FileInformation {
    /// A directory entry stamped with one time for creation and last write.
    pub fn directory(name: impl Into<String>, stamp: SystemTime) -> Self {
        Self {
            file_name: name.into(),
            attributes: FileAttributes::DIRECTORY,
            creation_time: Some(stamp),
            last_access_time: Some(stamp),
            last_write_time: Some(stamp),
            length: 0,
        }
    }

    /// A regular file entry.
    pub fn file(name: impl Into<String>, length: u64, modified: Option<SystemTime>) -> Self {
        Self {
            file_name: name.into(),
            attributes: FileAttributes::NORMAL,
            creation_time: modified,
            last_access_time: modified,
            last_write_time: modified,
            length,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }
}

/// Per-handle context passed with every operation.
///
/// The driver owns the slot this lives in; the adapter fills `op_id` the
/// first time it sees a handle and every later call carries it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncFileInfo {
    pub op_id: OpId,
    pub is_directory: bool,
    pub delete_on_close: bool,
    pub write_to_end_of_file: bool,
}

impl AsyncFileInfo {
    pub fn new(op_id: OpId) -> Self {
        Self {
            op_id,
            is_directory: false,
            delete_on_close: false,
            write_to_end_of_file: false,
        }
    }
}

/// Successful `create_file` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateFileReply {
    /// Whether the opened object turned out to be a directory.
    pub is_directory: bool,
}

/// Successful `get_disk_free_space` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskFreeSpace {
    pub free_bytes_available: u64,
    pub total_bytes: u64,
    pub total_free_bytes: u64,
}

impl Default for DiskFreeSpace {
    fn default() -> Self {
        const GIB: u64 = 1024 * 1024 * 1024;
        Self {
            free_bytes_available: GIB / 2,
            total_bytes: GIB,
            total_free_bytes: GIB / 2,
        }
    }
}

/// Successful `get_volume_information` outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInformation {
    pub volume_label: String,
    pub features: FileSystemFeatures,
    pub file_system_name: String,
    pub maximum_component_length: u32,
}

impl Default for VolumeInformation {
    fn default() -> Self {
        Self {
            volume_label: "WebFS".into(),
            features: FileSystemFeatures::CASE_PRESERVED_NAMES
                | FileSystemFeatures::UNICODE_ON_DISK,
            file_system_name: "WebFS".into(),
            maximum_component_length: 256,
        }
    }
}
