//! # webfs-kernel
//!
//! The filesystem contract shared by every layer of WebFS.
//!
//! - [`AsyncFsOps`] is the asynchronous operation surface. The router
//!   implements it by forwarding to peers, peers implement it over their
//!   storage, and [`MemoryFs`] implements it in process.
//! - [`DriverOps`] is the synchronous callback surface an OS filesystem
//!   driver calls on its own worker threads.
//! - [`BlockingAdapter`] bridges the two: each driver callback spawns the
//!   async operation on a tokio runtime and parks the driver thread until
//!   the result is ready.
//! - [`HandleTable`] issues the generational [`OpId`](webfs_types::OpId)
//!   tokens that correlate the callbacks of one open handle.

pub mod adapter;
pub mod driver;
pub mod error;
pub mod handles;
pub mod memory;
pub mod ops;
pub mod path;

pub use adapter::BlockingAdapter;
pub use driver::{DriverFileInfo, DriverOps};
pub use error::{FsError, FsErrorResult};
pub use handles::HandleTable;
pub use memory::{MemoryFs, OpenFileContext};
pub use ops::{AsyncFsOps, SharedFsOps};
