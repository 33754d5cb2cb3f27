//! Client configuration constants.

use std::time::Duration;

/// First port probed; the server's default.
pub const DEFAULT_BASE_PORT: u16 = 6565;

/// Number of consecutive ports probed from the base.
pub const DEFAULT_PORT_SPREAD: u16 = 4;

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Origin sent when none is configured.
pub const DEFAULT_ORIGIN: &str = "http://localhost";

/// Bound on the WebSocket connect, including the HTTP upgrade.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait before reconnecting after a verified connection drops.
pub const RETRY_AFTER_DROP: Duration = Duration::from_secs(5);

/// Wait after a failed attempt.
pub const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(1);

/// Wait once every endpoint has failed in a row.
pub const RETRY_AFTER_SWEEP: Duration = Duration::from_secs(5);
