//! # webfs-rpc
//!
//! Call/response plumbing between the WebFS server and its peers.
//!
//! - [`codec`]: lazy MessagePack element lists. A message is one array; each
//!   element can be sliced out and decoded on demand, so a receiver can read
//!   the frame header before deciding how to read the rest.
//! - [`frame`]: the three frame kinds (`Ready`, `Call`, `Reply`).
//! - [`transport`]: the message transport seam, with WebSocket and
//!   in-memory implementations.
//! - [`connection`]: [`PeerConnection`], which owns a transport, runs the
//!   receive loop, gates sends, performs the readiness handshake, and
//!   correlates replies.
//! - [`dispatch`]: [`FsService`] answers filesystem calls from a local
//!   [`AsyncFsOps`](webfs_kernel::AsyncFsOps); [`RemoteFs`] makes them.

pub mod codec;
pub mod connection;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod transport;

pub use codec::{ArgList, Element, LazyElementList};
pub use connection::{CallHandler, ConnectionId, ConnectionOptions, ConnectionState, PeerConnection, RejectCalls};
pub use dispatch::{FsMethod, FsService, RemoteFs};
pub use error::{ProtocolError, RpcError, RpcResult};
pub use frame::Frame;
pub use transport::{Chunk, MessageSink, MessageSource, Transport};
