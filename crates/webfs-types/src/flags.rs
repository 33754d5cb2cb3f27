//! Access masks, share modes, options and attributes passed to `create_file`.
//!
//! Bit values follow the Windows definitions so a native driver binding can
//! pass its raw masks straight through.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Requested access rights for an open.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileAccess: u32 {
        const READ_DATA = 0x0000_0001;
        const WRITE_DATA = 0x0000_0002;
        const APPEND_DATA = 0x0000_0004;
        const READ_EXTENDED_ATTRIBUTES = 0x0000_0008;
        const WRITE_EXTENDED_ATTRIBUTES = 0x0000_0010;
        const EXECUTE = 0x0000_0020;
        const DELETE_CHILD = 0x0000_0040;
        const READ_ATTRIBUTES = 0x0000_0080;
        const WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const READ_PERMISSIONS = 0x0002_0000;
        const CHANGE_PERMISSIONS = 0x0004_0000;
        const SET_OWNERSHIP = 0x0008_0000;
        const SYNCHRONIZE = 0x0010_0000;
        const ACCESS_SYSTEM_SECURITY = 0x0100_0000;
        const MAXIMUM_ALLOWED = 0x0200_0000;
        const GENERIC_ALL = 0x1000_0000;
        const GENERIC_EXECUTE = 0x2000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;
    }
}

impl FileAccess {
    /// Rights that touch file content (as opposed to metadata only).
    pub const DATA_ACCESS: FileAccess = FileAccess::READ_DATA
        .union(FileAccess::WRITE_DATA)
        .union(FileAccess::APPEND_DATA)
        .union(FileAccess::EXECUTE)
        .union(FileAccess::GENERIC_EXECUTE)
        .union(FileAccess::GENERIC_WRITE)
        .union(FileAccess::GENERIC_READ);

    /// Rights that modify content or the entry itself.
    pub const DATA_WRITE_ACCESS: FileAccess = FileAccess::WRITE_DATA
        .union(FileAccess::APPEND_DATA)
        .union(FileAccess::DELETE)
        .union(FileAccess::GENERIC_WRITE);

    /// True when the open only wants attributes, security info, or a directory handle.
    pub fn is_metadata_only(self) -> bool {
        !self.intersects(Self::DATA_ACCESS)
    }

    /// True when no write-class right was requested.
    pub fn is_read_only(self) -> bool {
        !self.intersects(Self::DATA_WRITE_ACCESS)
    }
}

bitflags! {
    /// Share mode granted to other openers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileShare: u32 {
        const READ = 0x0000_0001;
        const WRITE = 0x0000_0002;
        const DELETE = 0x0000_0004;
        const INHERITABLE = 0x0000_0010;
    }
}

bitflags! {
    /// Advanced open options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileOptions: u32 {
        const ENCRYPTED = 0x0000_4000;
        const DELETE_ON_CLOSE = 0x0400_0000;
        const SEQUENTIAL_SCAN = 0x0800_0000;
        const RANDOM_ACCESS = 0x1000_0000;
        const ASYNCHRONOUS = 0x4000_0000;
        const WRITE_THROUGH = 0x8000_0000;
    }
}

bitflags! {
    /// File and directory attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const DEVICE = 0x0000_0040;
        const NORMAL = 0x0000_0080;
        const TEMPORARY = 0x0000_0100;
        const SPARSE_FILE = 0x0000_0200;
        const REPARSE_POINT = 0x0000_0400;
        const COMPRESSED = 0x0000_0800;
        const OFFLINE = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED = 0x0000_4000;
    }
}

impl FileAttributes {
    pub fn is_directory(self) -> bool {
        self.contains(FileAttributes::DIRECTORY)
    }
}

bitflags! {
    /// Volume capability flags reported by `get_volume_information`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FileSystemFeatures: u32 {
        const CASE_SENSITIVE_SEARCH = 0x0000_0001;
        const CASE_PRESERVED_NAMES = 0x0000_0002;
        const UNICODE_ON_DISK = 0x0000_0004;
        const PERSISTENT_ACLS = 0x0000_0008;
        const SUPPORTS_REMOTE_STORAGE = 0x0000_0100;
        const NAMED_STREAMS = 0x0004_0000;
        const READ_ONLY_VOLUME = 0x0008_0000;
    }
}

/// How an open should treat an existing or missing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileMode {
    /// Create; fail if it exists.
    CreateNew = 1,
    /// Create, truncating any existing file.
    Create = 2,
    /// Open; fail if missing.
    Open = 3,
    /// Open, creating if missing.
    OpenOrCreate = 4,
    /// Open and truncate; fail if missing.
    Truncate = 5,
    /// Open for appending, creating if missing.
    Append = 6,
}
