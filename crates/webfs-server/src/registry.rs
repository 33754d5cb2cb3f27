//! Live connection set.
//!
//! Mutated only by connect/disconnect; every read takes the same lock.
//! Insertion order is kept so that ties on connect time resolve to the
//! connection registered first.

use std::sync::Arc;

use parking_lot::Mutex;
use webfs_rpc::{ConnectionId, PeerConnection};
use webfs_types::PeerIdentity;

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<Vec<Arc<PeerConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns how many connections that identity
    /// now has.
    pub fn insert(&self, conn: Arc<PeerConnection>) -> usize {
        let mut connections = self.connections.lock();
        connections.push(conn.clone());
        connections
            .iter()
            .filter(|c| c.identity() == conn.identity())
            .count()
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<PeerConnection>> {
        let mut connections = self.connections.lock();
        let index = connections.iter().position(|c| c.id() == id)?;
        Some(connections.remove(index))
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<PeerConnection>> {
        self.connections.lock().iter().find(|c| c.id() == id).cloned()
    }

    /// The authoritative connection for `identity`: the oldest one that is
    /// Ready.
    pub fn primary(&self, identity: &PeerIdentity) -> Option<Arc<PeerConnection>> {
        self.connections
            .lock()
            .iter()
            .filter(|c| c.identity() == identity && c.is_ready())
            .min_by_key(|c| c.when_connected())
            .cloned()
    }

    /// Distinct identities with at least one Ready connection, each with its
    /// primary connection, in order of first registration.
    pub fn ready_peers(&self) -> Vec<(PeerIdentity, Arc<PeerConnection>)> {
        let connections = self.connections.lock();
        let mut out: Vec<(PeerIdentity, Arc<PeerConnection>)> = Vec::new();
        for conn in connections.iter().filter(|c| c.is_ready()) {
            match out.iter_mut().find(|(id, _)| id == conn.identity()) {
                Some((_, primary)) => {
                    if conn.when_connected() < primary.when_connected() {
                        *primary = conn.clone();
                    }
                }
                None => out.push((conn.identity().clone(), conn.clone())),
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Arc<PeerConnection>> {
        self.connections.lock().clone()
    }
}
