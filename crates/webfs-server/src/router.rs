//! Routing filesystem.
//!
//! The [`Router`] is the single [`AsyncFsOps`] the driver adapter calls. The
//! first path segment names a peer; the rest is forwarded to that peer's
//! authoritative connection. The drive root itself is synthesised: it lists
//! every peer that has a Ready connection and is trusted.
//!
//! | situation                                   | result              |
//! |---------------------------------------------|---------------------|
//! | drive root                                  | synthesised         |
//! | no Ready connection for the peer            | `ObjectNameNotFound`|
//! | peer trust undecided or blocked             | `AccessDenied`      |
//! | remote call times out or transport fails    | `Unsuccessful`      |
//! | move across two peers                       | `NotImplemented`    |
//! | security, streams, pattern search           | `NotImplemented`    |
//!
//! A handle opened through `create_file` stays pinned to the connection that
//! served it until `close_file`, even if a newer connection for the same
//! peer appears.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use webfs_kernel::AsyncFsOps;
use webfs_kernel::path::{components, split_peer};
use webfs_rpc::{ConnectionId, PeerConnection, RemoteFs};
use webfs_types::{
    AsyncFileInfo, CreateFileReply, FileAccess, FileAttributes, FileInformation, FileMode,
    FileOptions, FileShare, FsResult, NtStatus, OpId, PeerIdentity, TrustRecord, TrustState,
};

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::db::{DbResult, TrustStore};
use crate::registry::ConnectionRegistry;

// ============================================================================
// Events and status
// ============================================================================

/// Peer lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// An identity connected for the first time ever.
    NewPeer { host: PeerIdentity, url: String },
    PeerConnected {
        host: PeerIdentity,
        connection: ConnectionId,
        url: String,
    },
    PeerDisconnected {
        host: PeerIdentity,
        connection: ConnectionId,
    },
    TrustChanged { host: PeerIdentity, trust: TrustState },
}

/// Counts computed from the live connection set and the trust store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub known_peers: usize,
    pub connected_peers: usize,
    pub connected_allowed: usize,
    pub connected_undecided: usize,
    pub connected_blocked: usize,
    /// Handles opened on a peer and not yet closed.
    pub pinned_handles: usize,
}

// ============================================================================
// Router
// ============================================================================

struct Pinned {
    connection: ConnectionId,
    host: PeerIdentity,
}

/// Where a path lands.
enum Target {
    Root,
    Peer {
        host: PeerIdentity,
        remote: RemoteFs,
        /// Peer-relative path.
        rest: String,
    },
}

pub struct Router {
    registry: ConnectionRegistry,
    trust: Arc<dyn TrustStore>,
    pins: Mutex<HashMap<OpId, Pinned>>,
    events: broadcast::Sender<RouterEvent>,
    started: SystemTime,
}

/// Drive-relative form of a path: `\a\b`.
fn drive_path(path: &str) -> String {
    let mut out = String::new();
    for c in components(path) {
        out.push('\\');
        out.push_str(c);
    }
    if out.is_empty() {
        out.push('\\');
    }
    out
}

impl Router {
    pub fn new(trust: Arc<dyn TrustStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            registry: ConnectionRegistry::new(),
            trust,
            pins: Mutex::new(HashMap::new()),
            events,
            started: SystemTime::now(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn emit(&self, event: RouterEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Take ownership of a started connection.
    ///
    /// Records the sighting in the trust store and registers the connection;
    /// it is removed again once it closes.
    pub fn attach(self: &Arc<Self>, conn: Arc<PeerConnection>) {
        let host = conn.identity().clone();
        let url = conn.display_url().to_string();
        match self.trust.observe(&host, &url, SystemTime::now()) {
            Ok((record, true)) => {
                info!(peer = %host, url = %record.url, "new peer, trust undecided");
                self.emit(RouterEvent::NewPeer {
                    host: host.clone(),
                    url: url.clone(),
                });
            }
            Ok((record, false)) => debug!(peer = %host, trust = %record.trust, "known peer"),
            Err(e) => warn!(peer = %host, "could not record peer: {e}"),
        }

        let count = self.registry.insert(conn.clone());
        info!(peer = %host, conn = %conn.id(), count, "peer connected");
        self.emit(RouterEvent::PeerConnected {
            host: host.clone(),
            connection: conn.id(),
            url,
        });

        let router: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            conn.closed().await;
            if let Some(router) = router.upgrade() {
                router.detach(conn.id(), &host);
            }
        });
    }

    fn detach(&self, id: ConnectionId, host: &PeerIdentity) {
        if self.registry.remove(id).is_some() {
            info!(peer = %host, conn = %id, "peer disconnected");
            self.emit(RouterEvent::PeerDisconnected {
                host: host.clone(),
                connection: id,
            });
        }
    }

    /// Record a trust decision. Applies from the next routing decision on.
    pub fn set_trust(&self, host: &PeerIdentity, trust: TrustState) -> DbResult<TrustRecord> {
        let record = self.trust.set_trust(host, trust)?;
        info!(peer = %host, %trust, "trust changed");
        self.emit(RouterEvent::TrustChanged {
            host: host.clone(),
            trust,
        });
        Ok(record)
    }

    pub fn status(&self) -> DbResult<ServerStatus> {
        let records = self.trust.list()?;
        let mut status = ServerStatus {
            known_peers: records.len(),
            pinned_handles: self.pins.lock().len(),
            ..Default::default()
        };
        for (host, _) in self.registry.ready_peers() {
            status.connected_peers += 1;
            let trust = records
                .iter()
                .find(|r| r.host == host)
                .map(|r| r.trust)
                .unwrap_or_default();
            match trust {
                TrustState::Allowed => status.connected_allowed += 1,
                TrustState::Unset => status.connected_undecided += 1,
                TrustState::Blocked => status.connected_blocked += 1,
            }
        }
        Ok(status)
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    fn trust_of(&self, host: &PeerIdentity) -> FsResult<TrustState> {
        match self.trust.lookup(host) {
            Ok(record) => Ok(record.map(|r| r.trust).unwrap_or_default()),
            Err(e) => {
                warn!(peer = %host, "trust lookup failed: {e}");
                Err(NtStatus::Unsuccessful)
            }
        }
    }

    fn require_allowed(&self, host: &PeerIdentity) -> FsResult<()> {
        match self.trust_of(host)? {
            TrustState::Allowed => Ok(()),
            other => {
                debug!(peer = %host, trust = %other, "refusing untrusted peer");
                Err(NtStatus::AccessDenied)
            }
        }
    }

    /// The primary connection for a trusted peer.
    fn primary(&self, host: &PeerIdentity) -> FsResult<Arc<PeerConnection>> {
        let conn = self
            .registry
            .primary(host)
            .ok_or(NtStatus::ObjectNameNotFound)?;
        self.require_allowed(host)?;
        Ok(conn)
    }

    fn resolve(&self, path: &str, info: &AsyncFileInfo) -> FsResult<Target> {
        let Some((peer, rest)) = split_peer(path) else {
            return Ok(Target::Root);
        };
        let pinned = self
            .pins
            .lock()
            .get(&info.op_id)
            .map(|p| (p.connection, p.host.clone()));
        let (host, conn) = match pinned {
            // An open handle stays with the peer it was opened on.
            Some((id, host)) => {
                let conn = self.registry.get(id).filter(|c| c.is_ready()).ok_or_else(|| {
                    debug!(op_id = %info.op_id, conn = %id, "pinned connection is gone");
                    NtStatus::Unsuccessful
                })?;
                self.require_allowed(&host)?;
                (host, conn)
            }
            None => {
                let host = PeerIdentity::new(peer);
                let conn = self.primary(&host)?;
                (host, conn)
            }
        };
        Ok(Target::Peer {
            host,
            remote: RemoteFs::new(conn),
            rest,
        })
    }

    fn pin(&self, op_id: OpId, remote: &RemoteFs, host: &PeerIdentity) {
        if op_id.is_detached() {
            return;
        }
        self.pins.lock().insert(
            op_id,
            Pinned {
                connection: remote.connection().id(),
                host: host.clone(),
            },
        );
    }

    fn unpin(&self, op_id: OpId) {
        if let Some(p) = self.pins.lock().remove(&op_id) {
            debug!(%op_id, peer = %p.host, "handle closed");
        }
    }

    /// Peers visible at the drive root.
    fn root_listing(&self) -> Vec<FileInformation> {
        self.registry
            .ready_peers()
            .into_iter()
            .filter(|(host, _)| matches!(self.trust_of(host), Ok(TrustState::Allowed)))
            .map(|(host, conn)| FileInformation::directory(host.as_str(), conn.when_connected()))
            .collect()
    }
}

#[async_trait]
impl AsyncFsOps for Router {
    async fn create_file(
        &self,
        path: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        options: FileOptions,
        attributes: FileAttributes,
        info: &AsyncFileInfo,
    ) -> FsResult<CreateFileReply> {
        match self.resolve(path, info)? {
            Target::Root => match mode {
                FileMode::Open | FileMode::OpenOrCreate => Ok(CreateFileReply { is_directory: true }),
                _ => Err(NtStatus::AccessDenied),
            },
            Target::Peer { host, remote, rest } => {
                let reply = remote
                    .create_file(&rest, access, share, mode, options, attributes, info)
                    .await?;
                self.pin(info.op_id, &remote, &host);
                Ok(reply)
            }
        }
    }

    async fn cleanup(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Ok(()),
            Target::Peer { remote, rest, .. } => remote.cleanup(&rest, info).await,
        }
    }

    async fn close_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        let result = match self.resolve(path, info) {
            Ok(Target::Root) => Ok(()),
            Ok(Target::Peer { remote, rest, .. }) => remote.close_file(&rest, info).await,
            Err(status) => Err(status),
        };
        self.unpin(info.op_id);
        result
    }

    async fn read_file(
        &self,
        path: &str,
        offset: u64,
        max_count: u32,
        info: &AsyncFileInfo,
    ) -> FsResult<Vec<u8>> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::FileIsADirectory),
            Target::Peer { remote, rest, .. } => remote.read_file(&rest, offset, max_count, info).await,
        }
    }

    async fn write_file(
        &self,
        path: &str,
        data: &[u8],
        offset: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<u32> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::FileIsADirectory),
            Target::Peer { remote, rest, .. } => remote.write_file(&rest, data, offset, info).await,
        }
    }

    async fn flush_file_buffers(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Ok(()),
            Target::Peer { remote, rest, .. } => remote.flush_file_buffers(&rest, info).await,
        }
    }

    async fn set_end_of_file(&self, path: &str, length: u64, info: &AsyncFileInfo) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::AccessDenied),
            Target::Peer { remote, rest, .. } => remote.set_end_of_file(&rest, length, info).await,
        }
    }

    async fn set_allocation_size(
        &self,
        path: &str,
        length: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::AccessDenied),
            Target::Peer { remote, rest, .. } => remote.set_allocation_size(&rest, length, info).await,
        }
    }

    async fn lock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::NotImplemented),
            Target::Peer { remote, rest, .. } => remote.lock_file(&rest, offset, length, info).await,
        }
    }

    async fn unlock_file(
        &self,
        path: &str,
        offset: u64,
        length: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::NotImplemented),
            Target::Peer { remote, rest, .. } => remote.unlock_file(&rest, offset, length, info).await,
        }
    }

    async fn get_file_information(
        &self,
        path: &str,
        info: &AsyncFileInfo,
    ) -> FsResult<FileInformation> {
        match self.resolve(path, info)? {
            Target::Root => Ok(FileInformation::directory("\\", self.started)),
            Target::Peer { remote, rest, .. } if rest.is_empty() => Ok(FileInformation::directory(
                drive_path(path),
                remote.connection().when_connected(),
            )),
            Target::Peer { remote, rest, .. } => {
                let mut meta = remote.get_file_information(&rest, info).await?;
                meta.file_name = drive_path(path);
                Ok(meta)
            }
        }
    }

    async fn find_files(&self, path: &str, info: &AsyncFileInfo) -> FsResult<Vec<FileInformation>> {
        match self.resolve(path, info)? {
            Target::Root => Ok(self.root_listing()),
            Target::Peer { remote, rest, .. } => remote.find_files(&rest, info).await,
        }
    }

    async fn set_file_attributes(
        &self,
        path: &str,
        attributes: FileAttributes,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::AccessDenied),
            Target::Peer { remote, rest, .. } => remote.set_file_attributes(&rest, attributes, info).await,
        }
    }

    async fn set_file_time(
        &self,
        path: &str,
        creation: Option<SystemTime>,
        last_access: Option<SystemTime>,
        last_write: Option<SystemTime>,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::AccessDenied),
            Target::Peer { remote, rest, .. } => {
                remote
                    .set_file_time(&rest, creation, last_access, last_write, info)
                    .await
            }
        }
    }

    async fn delete_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::AccessDenied),
            Target::Peer { rest, .. } if rest.is_empty() => Err(NtStatus::AccessDenied),
            Target::Peer { remote, rest, .. } => remote.delete_file(&rest, info).await,
        }
    }

    async fn delete_directory(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        match self.resolve(path, info)? {
            Target::Root => Err(NtStatus::AccessDenied),
            Target::Peer { rest, .. } if rest.is_empty() => Err(NtStatus::AccessDenied),
            Target::Peer { remote, rest, .. } => remote.delete_directory(&rest, info).await,
        }
    }

    async fn move_file(
        &self,
        old_path: &str,
        new_path: &str,
        replace: bool,
        info: &AsyncFileInfo,
    ) -> FsResult<()> {
        let Some((new_peer, new_rest)) = split_peer(new_path) else {
            return Err(NtStatus::AccessDenied);
        };
        match self.resolve(old_path, info)? {
            Target::Root => Err(NtStatus::AccessDenied),
            Target::Peer { rest, .. } if rest.is_empty() || new_rest.is_empty() => {
                Err(NtStatus::AccessDenied)
            }
            Target::Peer { host, .. } if host != PeerIdentity::new(new_peer) => {
                debug!(from = %host, to = new_peer, "cross-peer move");
                Err(NtStatus::NotImplemented)
            }
            Target::Peer { remote, rest, .. } => remote.move_file(&rest, &new_rest, replace, info).await,
        }
    }

    async fn mounted(&self, mount_point: &str, _info: &AsyncFileInfo) -> FsResult<()> {
        info!(mount_point, "drive mounted");
        Ok(())
    }

    async fn unmounted(&self, _info: &AsyncFileInfo) -> FsResult<()> {
        info!("drive unmounted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use webfs_kernel::MemoryFs;
    use webfs_rpc::{
        CallHandler, ConnectionOptions, Element, FsService, LazyElementList, RejectCalls, Transport,
    };

    use crate::db::AppDb;

    fn router() -> Arc<Router> {
        Router::new(Arc::new(AppDb::in_memory().unwrap()))
    }

    /// Serves `fs` and counts every call that reaches the peer.
    struct CountingService {
        inner: FsService,
        calls: AtomicUsize,
    }

    impl CountingService {
        fn new(fs: Arc<MemoryFs>) -> Arc<Self> {
            Arc::new(Self {
                inner: FsService::new(fs),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CallHandler for CountingService {
        async fn handle_call(&self, method: &str, args: LazyElementList) -> Result<Option<Element>, NtStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.handle_call(method, args).await
        }
    }

    /// Connect a peer serving `fs` and wait for both ends to be ready.
    async fn connect(router: &Arc<Router>, host: &str, fs: Arc<MemoryFs>) -> Arc<PeerConnection> {
        connect_with(router, host, Arc::new(FsService::new(fs))).await
    }

    async fn connect_with(
        router: &Arc<Router>,
        host: &str,
        handler: Arc<dyn CallHandler>,
    ) -> Arc<PeerConnection> {
        let (a, b) = Transport::memory_pair(None);
        let server_side = PeerConnection::start(
            a,
            PeerIdentity::new(host),
            format!("https://{host}"),
            Arc::new(RejectCalls),
            ConnectionOptions::default(),
        )
        .unwrap();
        let peer_side = PeerConnection::start(
            b,
            PeerIdentity::new("server"),
            "ws://127.0.0.1",
            handler,
            ConnectionOptions::default(),
        )
        .unwrap();
        assert!(server_side.when_ready().await);
        assert!(peer_side.when_ready().await);
        router.attach(server_side.clone());
        server_side
    }

    fn detached() -> AsyncFileInfo {
        AsyncFileInfo::new(OpId::DETACHED)
    }

    fn names(listing: &[FileInformation]) -> Vec<&str> {
        listing.iter().map(|f| f.file_name.as_str()).collect()
    }

    #[test]
    fn test_drive_path() {
        assert_eq!(drive_path(""), "\\");
        assert_eq!(drive_path("\\a/b\\c"), "\\a\\b\\c");
    }

    #[tokio::test]
    async fn test_root_lists_only_ready_allowed_peers() {
        let router = router();
        let a = connect(&router, "a.test", Arc::new(MemoryFs::new())).await;
        let _b = connect(&router, "b.test", Arc::new(MemoryFs::new())).await;
        let c = connect(&router, "c.test", Arc::new(MemoryFs::new())).await;
        router.set_trust(&PeerIdentity::new("a.test"), TrustState::Allowed).unwrap();
        router.set_trust(&PeerIdentity::new("c.test"), TrustState::Allowed).unwrap();
        c.close();
        c.closed().await;

        let listing = router.find_files("\\", &detached()).await.unwrap();
        assert_eq!(names(&listing), ["a.test"]);
        assert!(listing[0].is_directory());
        assert_eq!(listing[0].creation_time, Some(a.when_connected()));
    }

    #[tokio::test]
    async fn test_unknown_and_untrusted_peers() {
        let router = router();
        let fs = Arc::new(MemoryFs::new());
        fs.insert_file("sub/file.txt", "x").unwrap();
        connect(&router, "x.test", fs).await;

        assert_eq!(
            router.get_file_information("\\nobody\\a", &detached()).await,
            Err(NtStatus::ObjectNameNotFound)
        );
        assert_eq!(
            router.get_file_information("\\x.test\\sub\\file.txt", &detached()).await,
            Err(NtStatus::AccessDenied)
        );
        router.set_trust(&PeerIdentity::new("x.test"), TrustState::Blocked).unwrap();
        assert_eq!(
            router.find_files("\\x.test", &detached()).await,
            Err(NtStatus::AccessDenied)
        );
        router.set_trust(&PeerIdentity::new("x.test"), TrustState::Allowed).unwrap();
        let meta = router
            .get_file_information("\\X.TEST\\sub\\file.txt", &detached())
            .await
            .unwrap();
        assert_eq!(meta.file_name, "\\X.TEST\\sub\\file.txt");
        assert_eq!(meta.length, 1);
    }

    #[tokio::test]
    async fn test_oldest_ready_connection_is_primary() {
        let router = router();
        let first_fs = Arc::new(MemoryFs::new());
        first_fs.insert_file("who", "first").unwrap();
        let second_fs = Arc::new(MemoryFs::new());
        second_fs.insert_file("who", "second").unwrap();

        let first = connect(&router, "dup.test", first_fs).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _second = connect(&router, "dup.test", second_fs).await;
        router.set_trust(&PeerIdentity::new("dup.test"), TrustState::Allowed).unwrap();

        let primary = router.registry().primary(&PeerIdentity::new("dup.test")).unwrap();
        assert_eq!(primary.id(), first.id());
        let meta = router.get_file_information("\\dup.test\\who", &detached()).await.unwrap();
        assert_eq!(meta.length, 5);

        first.close();
        first.closed().await;
        let meta = router.get_file_information("\\dup.test\\who", &detached()).await.unwrap();
        assert_eq!(meta.length, 6);
    }

    #[tokio::test]
    async fn test_handles_stay_pinned() {
        let router = router();
        let fs = Arc::new(MemoryFs::new());
        fs.insert_file("a.txt", "hello").unwrap();
        let conn = connect(&router, "p.test", fs.clone()).await;
        router.set_trust(&PeerIdentity::new("p.test"), TrustState::Allowed).unwrap();

        let info = AsyncFileInfo::new(OpId::new(4, 1));
        router
            .create_file(
                "\\p.test\\a.txt",
                FileAccess::GENERIC_READ,
                FileShare::READ,
                FileMode::Open,
                FileOptions::empty(),
                FileAttributes::NORMAL,
                &info,
            )
            .await
            .unwrap();
        assert_eq!(router.status().unwrap().pinned_handles, 1);
        assert_eq!(router.read_file("\\p.test\\a.txt", 0, 10, &info).await.unwrap(), b"hello");

        // A newer connection for the same peer does not steal the handle,
        // and losing the pinned one fails the handle instead of rerouting.
        let _newer = connect(&router, "p.test", fs).await;
        conn.close();
        conn.closed().await;
        assert_eq!(
            router.read_file("\\p.test\\a.txt", 0, 10, &info).await,
            Err(NtStatus::Unsuccessful)
        );
        let _ = router.close_file("\\p.test\\a.txt", &info).await;
        assert_eq!(router.status().unwrap().pinned_handles, 0);
    }

    fn open_info(n: u32) -> AsyncFileInfo {
        AsyncFileInfo::new(OpId::new(n, 1))
    }

    async fn open_file(router: &Router, path: &str, info: &AsyncFileInfo) -> FsResult<CreateFileReply> {
        router
            .create_file(
                path,
                FileAccess::GENERIC_READ,
                FileShare::READ,
                FileMode::Open,
                FileOptions::empty(),
                FileAttributes::NORMAL,
                info,
            )
            .await
    }

    #[tokio::test]
    async fn test_untrusted_peer_receives_no_calls() {
        let router = router();
        let fs = Arc::new(MemoryFs::new());
        fs.insert_file("a.txt", "hello").unwrap();
        let service = CountingService::new(fs);
        connect_with(&router, "u.test", service.clone()).await;
        let host = PeerIdentity::new("u.test");

        for trust in [TrustState::Unset, TrustState::Blocked] {
            if trust == TrustState::Blocked {
                router.set_trust(&host, trust).unwrap();
            }
            let info = open_info(7);
            assert_eq!(
                open_file(&router, "\\u.test\\a.txt", &info).await,
                Err(NtStatus::AccessDenied)
            );
            assert_eq!(
                router.get_file_information("\\u.test\\a.txt", &detached()).await,
                Err(NtStatus::AccessDenied)
            );
            assert_eq!(
                router.find_files("\\u.test", &detached()).await,
                Err(NtStatus::AccessDenied)
            );
            assert_eq!(
                router.read_file("\\u.test\\a.txt", 0, 5, &info).await,
                Err(NtStatus::AccessDenied)
            );
            assert_eq!(
                router.delete_file("\\u.test\\a.txt", &info).await,
                Err(NtStatus::AccessDenied)
            );
            assert_eq!(service.calls(), 0, "{trust:?} peer was called");
        }
        assert_eq!(router.status().unwrap().pinned_handles, 0);

        router.set_trust(&host, TrustState::Allowed).unwrap();
        router.get_file_information("\\u.test\\a.txt", &detached()).await.unwrap();
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_pinned_handle_checks_its_own_peer() {
        let router = router();
        let p_fs = Arc::new(MemoryFs::new());
        p_fs.insert_file("a.txt", "from p").unwrap();
        let q_fs = Arc::new(MemoryFs::new());
        q_fs.insert_file("a.txt", "from q").unwrap();
        let p = CountingService::new(p_fs);
        connect_with(&router, "p.test", p.clone()).await;
        connect(&router, "q.test", q_fs).await;
        let p_host = PeerIdentity::new("p.test");
        router.set_trust(&p_host, TrustState::Allowed).unwrap();
        router.set_trust(&PeerIdentity::new("q.test"), TrustState::Allowed).unwrap();

        let info = open_info(9);
        open_file(&router, "\\p.test\\a.txt", &info).await.unwrap();
        assert_eq!(router.read_file("\\p.test\\a.txt", 0, 10, &info).await.unwrap(), b"from p");
        let served = p.calls();

        // Revoking the pinned peer fails the handle even when the call
        // names a peer that is still allowed.
        router.set_trust(&p_host, TrustState::Blocked).unwrap();
        assert_eq!(
            router.read_file("\\p.test\\a.txt", 0, 10, &info).await,
            Err(NtStatus::AccessDenied)
        );
        assert_eq!(
            router.read_file("\\q.test\\a.txt", 0, 10, &info).await,
            Err(NtStatus::AccessDenied)
        );
        assert_eq!(p.calls(), served);
    }

    #[tokio::test]
    async fn test_root_synthesis() {
        let router = router();
        let root = router.get_file_information("\\", &detached()).await.unwrap();
        assert!(root.is_directory());
        assert_eq!(root.file_name, "\\");

        let info = AsyncFileInfo::new(OpId::new(1, 1));
        let reply = router
            .create_file(
                "\\",
                FileAccess::GENERIC_READ,
                FileShare::READ,
                FileMode::Open,
                FileOptions::empty(),
                FileAttributes::empty(),
                &info,
            )
            .await
            .unwrap();
        assert!(reply.is_directory);
        assert_eq!(
            router.delete_directory("\\", &info).await,
            Err(NtStatus::AccessDenied)
        );
        assert_eq!(router.find_files("\\", &detached()).await.unwrap(), vec![]);
        assert_eq!(
            router.find_files_with_pattern("\\", "*", &detached()).await,
            Err(NtStatus::NotImplemented)
        );
        assert_eq!(
            router.get_file_security("\\", &detached()).await,
            Err(NtStatus::NotImplemented)
        );
    }

    #[tokio::test]
    async fn test_cross_peer_move_not_implemented() {
        let router = router();
        let a_fs = Arc::new(MemoryFs::new());
        a_fs.insert_file("f", "1").unwrap();
        connect(&router, "a.test", a_fs.clone()).await;
        connect(&router, "b.test", Arc::new(MemoryFs::new())).await;
        for host in ["a.test", "b.test"] {
            router.set_trust(&PeerIdentity::new(host), TrustState::Allowed).unwrap();
        }

        assert_eq!(
            router.move_file("\\a.test\\f", "\\b.test\\f", false, &detached()).await,
            Err(NtStatus::NotImplemented)
        );
        router
            .move_file("\\a.test\\f", "\\A.test\\g", false, &detached())
            .await
            .unwrap();
        assert!(a_fs.exists("g"));
        assert!(!a_fs.exists("f"));
    }

    #[tokio::test]
    async fn test_status_and_events() {
        let router = router();
        let mut events = router.subscribe();
        connect(&router, "a.test", Arc::new(MemoryFs::new())).await;
        connect(&router, "b.test", Arc::new(MemoryFs::new())).await;
        router.set_trust(&PeerIdentity::new("a.test"), TrustState::Allowed).unwrap();
        router.set_trust(&PeerIdentity::new("gone.test"), TrustState::Blocked).unwrap();

        let status = router.status().unwrap();
        assert_eq!(
            status,
            ServerStatus {
                known_peers: 3,
                connected_peers: 2,
                connected_allowed: 1,
                connected_undecided: 1,
                connected_blocked: 0,
                pinned_handles: 0,
            }
        );

        assert!(matches!(events.recv().await.unwrap(), RouterEvent::NewPeer { host, .. } if host.as_str() == "a.test"));
        assert!(matches!(events.recv().await.unwrap(), RouterEvent::PeerConnected { .. }));
    }
}
