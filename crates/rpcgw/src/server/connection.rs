//! Per-connection TLS termination and HTTP serving.

use std::{net::SocketAddr, time::Duration};

use axum::body::Body;
use hyper::{body::Incoming, Request};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::debug;

use crate::HttpService;

/// Tokens the accept loop uses to wind connections down.
#[derive(Debug, Clone, Default)]
pub(crate) struct Shutdown {
    /// Finish in-flight requests, accept no new ones, then close.
    pub(crate) drain: CancellationToken,
    /// Close now.
    pub(crate) force: CancellationToken,
}

/// Longest a peer may take to finish the TLS handshake.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminate TLS on `stream` and serve HTTP/1.1 or HTTP/2 (by ALPN and
/// preface) with `handler` until the peer goes away or `shutdown` says stop.
pub(crate) async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
    handler: HttpService,
    shutdown: Shutdown,
) {
    let tls = tokio::select! {
        accepted = timeout(handshake_timeout, acceptor.accept(stream)) => match accepted {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "TLS handshake failed");
                return;
            }
            Err(_) => {
                debug!(%peer, "TLS handshake timed out");
                return;
            }
        },
        _ = shutdown.drain.cancelled() => return,
    };

    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
        handler.clone().oneshot(req.map(Body::new))
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(tls), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.drain.cancelled() => {
            conn.as_mut().graceful_shutdown();
            tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.force.cancelled() => {
                    debug!(%peer, "connection closed at drain deadline");
                    return;
                }
            }
        }
    };

    if let Err(e) = result {
        debug!(%peer, error = %e, "connection ended with error");
    }
}
