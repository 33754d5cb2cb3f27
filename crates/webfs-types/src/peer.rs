//! Peer identity and trust.
//!
//! A peer is a remote origin that owns one top-level directory of the drive.
//! Its identity comes from transport metadata (the WebSocket `Origin` host),
//! never from message payloads.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Routing and trust key for a peer: the origin host, lowercased.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Build an identity from a host name. Host names compare
    /// case-insensitively, so the stored form is lowercase.
    pub fn new(host: impl AsRef<str>) -> Self {
        Self(host.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerIdentity({})", self.0)
    }
}

impl From<&str> for PeerIdentity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Tri-state trust flag. Only an explicit user action moves it off `Unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrustState {
    #[default]
    Unset,
    Allowed,
    Blocked,
}

impl TrustState {
    pub fn is_allowed(self) -> bool {
        self == TrustState::Allowed
    }

    /// Nullable boolean form used by the store.
    pub fn as_option(self) -> Option<bool> {
        match self {
            TrustState::Unset => None,
            TrustState::Allowed => Some(true),
            TrustState::Blocked => Some(false),
        }
    }

    pub fn from_option(value: Option<bool>) -> Self {
        match value {
            None => TrustState::Unset,
            Some(true) => TrustState::Allowed,
            Some(false) => TrustState::Blocked,
        }
    }
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrustState::Unset => "undecided",
            TrustState::Allowed => "allowed",
            TrustState::Blocked => "blocked",
        })
    }
}

/// Persisted trust state for one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub host: PeerIdentity,
    pub trust: TrustState,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
    /// Full origin URL last seen for this host, for display.
    pub url: String,
}

impl TrustRecord {
    /// Record for a peer seen for the first time.
    pub fn first_contact(host: PeerIdentity, url: impl Into<String>, now: SystemTime) -> Self {
        Self {
            host,
            trust: TrustState::Unset,
            first_seen: now,
            last_seen: now,
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_case_insensitive() {
        assert_eq!(PeerIdentity::new("Shop.Example"), PeerIdentity::new("shop.example"));
        assert_eq!(PeerIdentity::new(" a.test ").as_str(), "a.test");
    }

    #[test]
    fn test_trust_option_mapping() {
        for t in [TrustState::Unset, TrustState::Allowed, TrustState::Blocked] {
            assert_eq!(TrustState::from_option(t.as_option()), t);
        }
        assert!(TrustState::Allowed.is_allowed());
        assert!(!TrustState::Unset.is_allowed());
    }

    #[test]
    fn test_first_contact_is_unset() {
        let now = SystemTime::now();
        let r = TrustRecord::first_contact("x.test".into(), "https://x.test", now);
        assert_eq!(r.trust, TrustState::Unset);
        assert_eq!(r.first_seen, r.last_seen);
    }
}
