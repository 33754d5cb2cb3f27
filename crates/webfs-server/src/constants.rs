//! Server configuration constants.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Base port the server listens on. Clients probe this port and the few
/// after it.
pub const DEFAULT_PORT: u16 = 6565;

/// Loopback only: peers are pages in the local browser.
pub const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Directory under the platform data dir holding the database.
pub const DATA_DIR_NAME: &str = "webfs";

pub const DB_FILE_NAME: &str = "webfs.db";

/// Settings key for the last chosen drive mount point.
pub const MOUNT_POINT_KEY: &str = "mount_point";

pub const DEFAULT_MOUNT_POINT: &str = "W:";

/// Capacity of the router event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Upper bound on an HTTP upgrade request before the socket is dropped.
pub const UPGRADE_TIMEOUT: Duration = Duration::from_secs(5);
