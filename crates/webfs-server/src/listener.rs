//! WebSocket listener.
//!
//! Each accepted socket goes through the HTTP upgrade with an `Origin`
//! check. The origin host becomes the peer identity; upgrades without a
//! parseable origin are refused with 403 before any connection starts.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri, header};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webfs_rpc::{ConnectionOptions, PeerConnection, RejectCalls, Transport};
use webfs_types::PeerIdentity;

use crate::config::ServerConfig;
use crate::constants::UPGRADE_TIMEOUT;
use crate::router::Router;

/// Who is on the other end of an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOrigin {
    pub identity: PeerIdentity,
    /// The full `Origin` header value.
    pub url: String,
}

/// Parse an `Origin` header value into a peer origin. `None` for opaque
/// origins (`null`) and values without a host.
pub fn parse_origin(value: &str) -> Option<PeerOrigin> {
    let value = value.trim();
    let uri: Uri = value.parse().ok()?;
    uri.scheme()?;
    let host = uri.host().filter(|h| !h.is_empty())?;
    Some(PeerOrigin {
        identity: PeerIdentity::new(host),
        url: value.to_string(),
    })
}

fn forbidden(reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}

pub struct WebFsServer {
    listener: TcpListener,
    router: Arc<Router>,
    options: ConnectionOptions,
}

impl WebFsServer {
    /// Bind the listening socket.
    pub async fn bind(config: &ServerConfig, router: Arc<Router>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self {
            listener,
            router,
            options: config.connection_options(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Accept connections until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "listening for peers");
        loop {
            let (stream, remote) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                },
            };
            let router = self.router.clone();
            let options = self.options.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_socket(stream, remote, router, options).await {
                    debug!(%remote, "socket ended: {e}");
                }
            });
        }
        info!("listener stopped");
        Ok(())
    }
}

async fn serve_socket(
    stream: TcpStream,
    remote: SocketAddr,
    router: Arc<Router>,
    options: ConnectionOptions,
) -> io::Result<()> {
    let mut origin: Option<PeerOrigin> = None;
    let check_origin = |request: &Request, response: Response| {
        let header = request
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok());
        match header.and_then(parse_origin) {
            Some(parsed) => {
                origin = Some(parsed);
                Ok(response)
            }
            None => {
                warn!(%remote, origin = ?header, "refusing upgrade without a usable origin");
                Err(forbidden("an Origin header with a host is required"))
            }
        }
    };

    let upgrade = tokio_tungstenite::accept_hdr_async(stream, check_origin);
    let ws = match tokio::time::timeout(UPGRADE_TIMEOUT, upgrade).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => return Err(io::Error::other(e)),
        Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "upgrade timed out")),
    };
    let Some(origin) = origin else {
        return Err(io::Error::other("upgrade completed without an origin"));
    };

    let conn = PeerConnection::start(
        Transport::websocket(ws),
        origin.identity,
        origin.url,
        Arc::new(RejectCalls),
        options,
    )
    .map_err(io::Error::other)?;
    router.attach(conn);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin() {
        let o = parse_origin("https://Shop.Example:8443").unwrap();
        assert_eq!(o.identity.as_str(), "shop.example");
        assert_eq!(o.url, "https://Shop.Example:8443");

        assert_eq!(
            parse_origin("http://localhost:5000").unwrap().identity.as_str(),
            "localhost"
        );
        assert_eq!(parse_origin("null"), None);
        assert_eq!(parse_origin(""), None);
        assert_eq!(parse_origin("/relative"), None);
    }
}
