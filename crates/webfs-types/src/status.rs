//! NT status codes.
//!
//! Every driver callback resolves to one of these. On the wire a status is
//! its raw `u32`; unknown codes collapse to [`NtStatus::Unsuccessful`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status returned by every filesystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(into = "u32", from = "u32")]
#[repr(u32)]
pub enum NtStatus {
    #[error("success")]
    Success = 0x0000_0000,

    /// Generic I/O failure. Timeouts and transport losses surface as this.
    #[error("unsuccessful")]
    Unsuccessful = 0xC000_0001,

    #[error("not implemented")]
    NotImplemented = 0xC000_0002,

    #[error("invalid parameter")]
    InvalidParameter = 0xC000_000D,

    #[error("access denied")]
    AccessDenied = 0xC000_0022,

    #[error("object name not found")]
    ObjectNameNotFound = 0xC000_0034,

    #[error("object name collision")]
    ObjectNameCollision = 0xC000_0035,

    #[error("object path not found")]
    ObjectPathNotFound = 0xC000_003A,

    #[error("sharing violation")]
    SharingViolation = 0xC000_0043,

    #[error("disk full")]
    DiskFull = 0xC000_007F,

    #[error("file is a directory")]
    FileIsADirectory = 0xC000_00BA,

    #[error("directory not empty")]
    DirectoryNotEmpty = 0xC000_0101,

    #[error("not a directory")]
    NotADirectory = 0xC000_0103,
}

impl NtStatus {
    pub const ALL: [NtStatus; 13] = [
        NtStatus::Success,
        NtStatus::Unsuccessful,
        NtStatus::NotImplemented,
        NtStatus::InvalidParameter,
        NtStatus::AccessDenied,
        NtStatus::ObjectNameNotFound,
        NtStatus::ObjectNameCollision,
        NtStatus::ObjectPathNotFound,
        NtStatus::SharingViolation,
        NtStatus::DiskFull,
        NtStatus::FileIsADirectory,
        NtStatus::DirectoryNotEmpty,
        NtStatus::NotADirectory,
    ];

    /// Raw numeric code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Decode a raw code. Unknown codes map to `Unsuccessful`.
    pub fn from_code(code: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .unwrap_or(NtStatus::Unsuccessful)
    }

    pub fn is_success(self) -> bool {
        self == NtStatus::Success
    }

    /// Turn a status into a `Result`, treating `Success` as `Ok(())`.
    pub fn into_result(self) -> FsResult<()> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }
}

impl From<NtStatus> for u32 {
    fn from(s: NtStatus) -> u32 {
        s.code()
    }
}

impl From<u32> for NtStatus {
    fn from(code: u32) -> Self {
        NtStatus::from_code(code)
    }
}

/// Result of a filesystem operation: a value or a failure status.
pub type FsResult<T> = Result<T, NtStatus>;

/// Collapse an `FsResult` back to the status the driver reports.
pub fn status_of<T>(result: &FsResult<T>) -> NtStatus {
    match result {
        Ok(_) => NtStatus::Success,
        Err(s) => *s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for s in NtStatus::ALL {
            assert_eq!(NtStatus::from_code(s.code()), s);
        }
    }

    #[test]
    fn test_unknown_code_is_unsuccessful() {
        assert_eq!(NtStatus::from_code(0xDEAD_BEEF), NtStatus::Unsuccessful);
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&NtStatus::AccessDenied).unwrap();
        assert_eq!(json, 0xC000_0022u32.to_string());
        let back: NtStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NtStatus::AccessDenied);
    }

    #[test]
    fn test_into_result() {
        assert!(NtStatus::Success.into_result().is_ok());
        assert_eq!(
            NtStatus::NotImplemented.into_result(),
            Err(NtStatus::NotImplemented)
        );
        assert_eq!(status_of(&Ok::<_, NtStatus>(3)), NtStatus::Success);
    }
}
