//! # webfs-client
//!
//! The peer side of WebFS. A [`WebFsClient`] probes a small range of local
//! server ports, connects with its origin, and answers the server's
//! filesystem calls from any [`AsyncFsOps`](webfs_kernel::AsyncFsOps)
//! implementation. Dropped connections are retried with backoff until the
//! client is disabled.

pub mod client;
pub mod config;
pub mod constants;
pub mod endpoint;
pub mod error;

pub use client::{ClientStatus, WebFsClient};
pub use config::{ClientConfig, RetryTiming};
pub use endpoint::{Attempt, Endpoint, EndpointResult, EndpointSet, next_delay};
pub use error::{ClientError, ClientResult};
