//! Timeouts and limits for peer connections.

use std::time::Duration;

/// How long after opening a connection the remote `Ready` frame may take.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a call waits for its reply.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Consecutive undecodable messages tolerated before closing.
pub const MAX_PROTOCOL_ERRORS: u32 = 3;

/// Largest reassembled message accepted (64 MiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Deepest array/map nesting the element scanner follows.
pub const MAX_NESTING_DEPTH: usize = 64;

/// How long one outbound message may take, including the wait for the
/// send gate.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);
