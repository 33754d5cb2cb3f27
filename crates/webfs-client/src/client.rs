//! Reconnecting peer client.
//!
//! ```text
//!   enable()                                         disable()
//!      │                                                 │
//!      ▼                                                 ▼
//!   ┌────────┐  select   ┌────────────┐  ready   ┌───────────┐
//!   │ sleep  │ ───────▶  │ Connecting │ ───────▶ │ Connected │
//!   └────────┘           └────────────┘          └───────────┘
//!      ▲                      │ fail                   │ drop
//!      └──────────────────────┴────────────────────────┘
//!              next_delay(attempt, failures, endpoints)
//! ```
//!
//! While connected the client answers the server's filesystem calls from
//! the [`SharedFsOps`] it was built with.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webfs_kernel::SharedFsOps;
use webfs_rpc::{FsService, PeerConnection, Transport};
use webfs_types::PeerIdentity;

use crate::config::ClientConfig;
use crate::endpoint::{Attempt, EndpointSet, next_delay};
use crate::error::{ClientError, ClientResult};

/// What the client is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    /// Not trying to connect.
    Disabled,
    /// Attempt in progress.
    Connecting { url: String, attempt: u32 },
    Connected { url: String },
    /// Between attempts.
    Disconnected,
}

struct Shared {
    config: ClientConfig,
    service: Arc<FsService>,
    endpoints: Mutex<EndpointSet>,
    status: watch::Sender<ClientStatus>,
    current: Mutex<Option<Arc<PeerConnection>>>,
}

pub struct WebFsClient {
    shared: Arc<Shared>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl WebFsClient {
    pub fn new(config: ClientConfig, ops: SharedFsOps) -> Self {
        let endpoints = EndpointSet::new(config.endpoint_urls());
        let (status, _) = watch::channel(ClientStatus::Disabled);
        Self {
            shared: Arc::new(Shared {
                config,
                service: Arc::new(FsService::new(ops)),
                endpoints: Mutex::new(endpoints),
                status,
                current: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Start connecting. No-op if already enabled. Must be called inside a
    /// tokio runtime.
    pub fn enable(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(probe_loop(self.shared.clone(), cancel.clone()));
        *task = Some((cancel, handle));
        info!(origin = %self.shared.config.origin, "client enabled");
    }

    /// Stop connecting and close any live connection. Returns once the
    /// probe task has finished.
    pub async fn disable(&self) {
        let task = self.task.lock().take();
        let Some((cancel, handle)) = task else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!("probe task ended abnormally: {e}");
        }
        self.shared.status.send_replace(ClientStatus::Disabled);
        info!("client disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.shared.status.borrow(), ClientStatus::Connected { .. })
    }

    pub fn status(&self) -> ClientStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientStatus> {
        self.shared.status.subscribe()
    }

    /// The live connection, if any.
    pub fn connection(&self) -> Option<Arc<PeerConnection>> {
        self.shared.current.lock().clone()
    }

    /// Snapshot of endpoint bookkeeping.
    pub fn endpoints(&self) -> EndpointSet {
        self.shared.endpoints.lock().clone()
    }
}

impl Drop for WebFsClient {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.task.lock().take() {
            cancel.cancel();
        }
    }
}

// ============================================================================
// Probe loop
// ============================================================================

async fn probe_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let endpoint_count = shared.endpoints.lock().len();
    let mut failures_in_row = 0usize;
    let mut attempt_no = 0u32;

    while !cancel.is_cancelled() {
        let selected = {
            let mut endpoints = shared.endpoints.lock();
            endpoints.select().and_then(|index| {
                endpoints.begin(index, SystemTime::now());
                endpoints.get(index).map(|e| (index, e.url.clone()))
            })
        };
        let Some((index, url)) = selected else {
            warn!("no endpoints configured");
            break;
        };

        attempt_no = attempt_no.wrapping_add(1);
        shared.status.send_replace(ClientStatus::Connecting {
            url: url.clone(),
            attempt: attempt_no,
        });
        debug!(%url, attempt = attempt_no, "connecting");

        let outcome = match connect(&shared, &url, &cancel).await {
            Ok(conn) => {
                failures_in_row = 0;
                attempt_no = 0;
                shared.endpoints.lock().verified(index, SystemTime::now());
                info!(%url, connection = %conn.id(), "connected");
                *shared.current.lock() = Some(conn.clone());
                shared.status.send_replace(ClientStatus::Connected { url: url.clone() });

                let cancelled = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = conn.closed() => false,
                };
                if cancelled {
                    conn.close();
                    conn.closed().await;
                }
                shared.current.lock().take();
                // Still the last verified endpoint; retry it first.
                shared.endpoints.lock().verified(index, SystemTime::now());
                info!(%url, "disconnected");
                Attempt::Dropped
            }
            Err(ClientError::Cancelled) => break,
            Err(e) => {
                failures_in_row += 1;
                shared.endpoints.lock().invalid(index);
                debug!(%url, failures_in_row, "attempt failed: {e}");
                Attempt::Failed
            }
        };
        if cancel.is_cancelled() {
            break;
        }
        shared.status.send_replace(ClientStatus::Disconnected);

        let delay = next_delay(outcome, failures_in_row, endpoint_count, &shared.config.retry);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!("probe loop stopped");
}

/// One attempt: WebSocket upgrade with our origin, then the readiness
/// handshake.
async fn connect(
    shared: &Shared,
    url: &str,
    cancel: &CancellationToken,
) -> ClientResult<Arc<PeerConnection>> {
    let config = &shared.config;
    let mut request = url.into_client_request()?;
    let origin = HeaderValue::from_str(&config.origin)
        .map_err(|_| ClientError::InvalidOrigin(config.origin.clone()))?;
    request.headers_mut().insert(header::ORIGIN, origin);

    let upgrade = tokio::time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(request),
    );
    let (ws, _response) = tokio::select! {
        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        result = upgrade => result.map_err(|_| ClientError::Timeout)??,
    };

    let conn = PeerConnection::start(
        Transport::websocket(ws),
        PeerIdentity::new(&config.host),
        url,
        shared.service.clone(),
        config.connection_options(),
    )?;
    let ready = tokio::select! {
        _ = cancel.cancelled() => {
            conn.close();
            return Err(ClientError::Cancelled);
        }
        ready = conn.when_ready() => ready,
    };
    if !ready {
        conn.close();
        return Err(ClientError::Handshake);
    }
    Ok(conn)
}
