//! Shared types for WebFS.
//!
//! This crate is the leaf of the workspace: status codes, flag sets, file
//! metadata, handle tokens, and peer identity. It has **no internal webfs
//! dependencies**; the RPC layer, the driver adapter, the router and the
//! reconnecting client all speak in these types.
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`NtStatus`]      | Status code every driver callback resolves to|
//! | [`FileInformation`]| Metadata for one file or directory          |
//! | [`AsyncFileInfo`] | Per-handle context threaded through calls    |
//! | [`OpId`]          | Generational token for one open handle       |
//! | [`PeerIdentity`]  | Routing/trust key (origin host)              |
//! | [`TrustRecord`]   | Persisted trust state for one peer           |
//! |-------------------|----------------------------------------------|

pub mod flags;
pub mod ids;
pub mod info;
pub mod peer;
pub mod status;

pub use flags::{FileAccess, FileAttributes, FileMode, FileOptions, FileShare, FileSystemFeatures};
pub use ids::OpId;
pub use info::{
    AsyncFileInfo, CreateFileReply, DiskFreeSpace, FileInformation, VolumeInformation,
};
pub use peer::{PeerIdentity, TrustRecord, TrustState};
pub use status::{FsResult, NtStatus, status_of};
