//! Client configuration.

use std::time::Duration;

use webfs_rpc::ConnectionOptions;
use webfs_rpc::constants::{CALL_TIMEOUT, HANDSHAKE_TIMEOUT};

use crate::constants::{
    CONNECT_TIMEOUT, DEFAULT_BASE_PORT, DEFAULT_HOST, DEFAULT_ORIGIN, DEFAULT_PORT_SPREAD,
    RETRY_AFTER_DROP, RETRY_AFTER_FAILURE, RETRY_AFTER_SWEEP,
};

/// Delays between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTiming {
    pub after_drop: Duration,
    pub after_failure: Duration,
    pub after_sweep: Duration,
}

impl Default for RetryTiming {
    fn default() -> Self {
        Self {
            after_drop: RETRY_AFTER_DROP,
            after_failure: RETRY_AFTER_FAILURE,
            after_sweep: RETRY_AFTER_SWEEP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub base_port: u16,
    /// Ports `base_port .. base_port + port_spread` are candidates.
    pub port_spread: u16,
    /// Sent as the `Origin` header; the server derives our identity from it.
    pub origin: String,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub call_timeout: Duration,
    pub retry: RetryTiming,
}

impl ClientConfig {
    /// Default endpoints on loopback, identifying as `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Candidate endpoint URLs in port order. Ports past `u16::MAX` are
    /// dropped.
    pub fn endpoint_urls(&self) -> Vec<String> {
        (0..self.port_spread)
            .filter_map(|i| self.base_port.checked_add(i))
            .map(|port| format!("ws://{}:{}/", self.host, port))
            .collect()
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            handshake_timeout: self.handshake_timeout,
            call_timeout: self.call_timeout,
            ..ConnectionOptions::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            base_port: DEFAULT_BASE_PORT,
            port_spread: DEFAULT_PORT_SPREAD,
            origin: DEFAULT_ORIGIN.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            call_timeout: CALL_TIMEOUT,
            retry: RetryTiming::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let config = ClientConfig::default();
        assert_eq!(
            config.endpoint_urls(),
            [
                "ws://127.0.0.1:6565/",
                "ws://127.0.0.1:6566/",
                "ws://127.0.0.1:6567/",
                "ws://127.0.0.1:6568/",
            ]
        );
    }

    #[test]
    fn test_spread_stops_at_port_limit() {
        let config = ClientConfig {
            base_port: u16::MAX - 1,
            ..ClientConfig::default()
        };
        assert_eq!(config.endpoint_urls().len(), 2);
    }
}
