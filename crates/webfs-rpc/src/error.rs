//! RPC error types.

use std::time::Duration;

use thiserror::Error;
use webfs_types::NtStatus;

/// A message could not be framed or an element could not be decoded.
///
/// Always local to one message: the message is dropped and the connection
/// keeps going.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("element list is empty")]
    EmptyList,

    #[error("element index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("message is not an array")]
    NotAnArray,

    #[error("message truncated")]
    Truncated,

    #[error("reserved marker byte")]
    InvalidMarker,

    #[error("nesting deeper than {0}")]
    TooDeep(usize),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("message of {0} bytes exceeds limit")]
    TooLarge(usize),

    #[error("decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("unknown frame kind {0}")]
    UnknownFrameKind(u8),

    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    #[error("reply carried no payload")]
    MissingPayload,
}

/// Errors from connection-level operations.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Send, receive, or connect failed. Treated as a disconnect.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    #[error("connection closed")]
    ConnectionClosed,

    /// The transport was not open when the connection was started.
    #[error("transport not open")]
    NotOpen,

    /// The remote side answered with a failure status.
    #[error("remote returned {0}")]
    Remote(NtStatus),
}

impl RpcError {
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    pub fn timeout(what: &'static str, after: Duration) -> Self {
        Self::Timeout { what, after }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RpcError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RpcError::Transport(e.to_string())
    }
}

/// A remote failure keeps its status; everything else is a generic I/O error.
impl From<RpcError> for NtStatus {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Remote(status) => status,
            _ => NtStatus::Unsuccessful,
        }
    }
}

/// Bad arguments from a caller are the caller's fault.
impl From<ProtocolError> for NtStatus {
    fn from(_: ProtocolError) -> Self {
        NtStatus::InvalidParameter
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
