//! Server configuration.
//!
//! Built with [`ServerConfig::production`] or [`ServerConfig::ephemeral`],
//! optionally overlaid from a TOML file:
//!
//! ```toml
//! port = 6565
//! bind_address = "127.0.0.1"
//! db_path = "webfs.db"          # relative to the config file
//! handshake_timeout_secs = 5
//! call_timeout_secs = 30
//! ```

use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use webfs_rpc::ConnectionOptions;
use webfs_rpc::constants::{CALL_TIMEOUT, HANDSHAKE_TIMEOUT};

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_PORT};
use crate::db::{AppDb, DbResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// `None` keeps all state in memory.
    pub db_path: Option<PathBuf>,
    pub handshake_timeout: Duration,
    pub call_timeout: Duration,
}

/// On-disk form; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    bind_address: Option<IpAddr>,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    handshake_timeout_secs: Option<u64>,
    call_timeout_secs: Option<u64>,
}

impl ServerConfig {
    /// Loopback on `port`, database in the platform data directory.
    pub fn production(port: u16) -> Self {
        Self {
            db_path: Some(AppDb::default_path()),
            ..Self::ephemeral(port)
        }
    }

    /// Loopback on `port` (0 picks a free one), in-memory database.
    pub fn ephemeral(port: u16) -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS,
            port,
            db_path: None,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            call_timeout: CALL_TIMEOUT,
        }
    }

    /// Overlay values from a TOML file. Relative paths in the file are
    /// resolved against the file's directory.
    pub fn merge_file(mut self, path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let file: ConfigFile =
            toml::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        if let Some(addr) = file.bind_address {
            self.bind_address = addr;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(db) = file.db_path {
            self.db_path = Some(if db.is_absolute() { db } else { base.join(db) });
        }
        if let Some(secs) = file.handshake_timeout_secs {
            self.handshake_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.call_timeout_secs {
            self.call_timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            handshake_timeout: self.handshake_timeout,
            call_timeout: self.call_timeout,
            ..ConnectionOptions::default()
        }
    }

    pub fn open_db(&self) -> DbResult<AppDb> {
        match &self.db_path {
            Some(path) => AppDb::open(path),
            None => AppDb::in_memory(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::production(DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let prod = ServerConfig::production(7000);
        assert_eq!(prod.bind_addr().to_string(), "127.0.0.1:7000");
        assert!(prod.db_path.unwrap().ends_with("webfs/webfs.db"));

        let eph = ServerConfig::ephemeral(0);
        assert_eq!(eph.db_path, None);
        assert_eq!(eph.connection_options().call_timeout, CALL_TIMEOUT);
    }

    #[test]
    fn test_merge_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webfs.toml");
        fs::write(
            &path,
            "port = 7100\ndb_path = \"state/webfs.db\"\ncall_timeout_secs = 3\n",
        )
        .unwrap();

        let config = ServerConfig::ephemeral(0).merge_file(&path).unwrap();
        assert_eq!(config.port, 7100);
        assert_eq!(config.db_path, Some(dir.path().join("state/webfs.db")));
        assert_eq!(config.call_timeout, Duration::from_secs(3));
        assert_eq!(config.handshake_timeout, HANDSHAKE_TIMEOUT);
    }

    #[test]
    fn test_merge_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "prot = 1\n").unwrap();
        let err = ServerConfig::ephemeral(0).merge_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
