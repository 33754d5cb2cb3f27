//! # webfs-server
//!
//! Host side of WebFS: accepts peer connections over WebSocket and presents
//! every trusted peer as one top-level directory of a single drive.
//!
//! - [`listener`]: the WebSocket accept loop with the `Origin` check.
//! - [`router`]: [`Router`], the [`AsyncFsOps`](webfs_kernel::AsyncFsOps)
//!   the driver adapter calls, which synthesises the drive root and forwards
//!   everything else to the right peer.
//! - [`registry`]: the live connection set.
//! - [`db`]: SQLite settings and peer trust.
//! - [`config`]: [`ServerConfig`].

pub mod config;
pub mod constants;
pub mod db;
pub mod listener;
pub mod registry;
pub mod router;

pub use config::ServerConfig;
pub use db::{AppDb, DbError, DbResult, SettingsStore, TrustStore};
pub use listener::{PeerOrigin, WebFsServer, parse_origin};
pub use registry::ConnectionRegistry;
pub use router::{Router, RouterEvent, ServerStatus};
