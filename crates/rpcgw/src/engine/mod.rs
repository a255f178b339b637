//! The binary RPC engine.
//!
//! [`RpcEngine`] collects tonic services while the server starts up. Once
//! every service is attached it is frozen into an [`RpcHandle`], which hands
//! out the request handler used by the protocol router and owns the graceful
//! stop: after [`RpcHandle::graceful_stop`] new calls are answered with gRPC
//! `UNAVAILABLE` and the stop resolves when the calls already running finish.

pub mod gateway;

use std::convert::Infallible;

use axum::{
    body::Body,
    error_handling::HandleError,
    http::{header, HeaderValue, Request, Response as HttpResponse},
    response::Response,
    BoxError,
};
use bytes::Bytes;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tonic::{
    body::BoxBody,
    server::NamedService,
    service::{Routes, RoutesBuilder},
    Code,
};
use tower::{util::BoxCloneService, Service, ServiceExt};
use tracing::debug;

use crate::{handlers, HttpService};

/// Media type token that marks a request as a gRPC call.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Services registered so far. Consumed by [`RpcEngine::start`].
#[derive(Debug, Default)]
pub struct RpcEngine {
    builder: RoutesBuilder,
    services: Vec<&'static str>,
}

impl RpcEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tonic service under its fully qualified name.
    pub fn add_service<S>(&mut self, svc: S) -> &mut Self
    where
        S: Service<Request<BoxBody>, Response = HttpResponse<BoxBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        debug!(service = S::NAME, "rpc service registered");
        self.services.push(S::NAME);
        self.builder.add_service(svc);
        self
    }

    /// Names of the registered services, in registration order.
    pub fn services(&self) -> &[&'static str] {
        &self.services
    }

    /// Freeze the registrations and start accepting calls.
    pub fn start(self) -> RpcHandle {
        RpcHandle {
            routes: self.builder.routes(),
            inflight: TaskTracker::new(),
            stopping: CancellationToken::new(),
        }
    }
}

/// A running RPC engine.
#[derive(Debug, Clone)]
pub struct RpcHandle {
    routes: Routes,
    inflight: TaskTracker,
    stopping: CancellationToken,
}

impl RpcHandle {
    /// Request handler for the protocol router's RPC branch.
    ///
    /// A call counts as in flight until its response head is produced, which
    /// covers the whole handler for unary methods.
    pub fn service(&self) -> HttpService {
        let inner = infallible(
            self.routes
                .clone()
                .map_request(|req: Request<Body>| req.map(tonic::body::boxed)),
        );
        let inflight = self.inflight.clone();
        let stopping = self.stopping.clone();

        BoxCloneService::new(tower::service_fn(move |req: Request<Body>| {
            let inner = inner.clone();
            let token = inflight.token();
            let stopping = stopping.clone();
            async move {
                let _call = token;
                if stopping.is_cancelled() {
                    return Ok(draining_response());
                }
                inner.oneshot(req).await
            }
        }))
    }

    /// Refuse new calls and wait for the running ones. Safe to call more
    /// than once; later calls wait on the same set of calls.
    pub async fn graceful_stop(&self) {
        self.stopping.cancel();
        self.inflight.close();
        self.inflight.wait().await;
    }
}

/// Box `svc`, turning its errors into 500 responses.
fn infallible<S, B>(svc: S) -> HttpService
where
    S: Service<Request<Body>, Response = HttpResponse<B>> + Clone + Send + 'static,
    S::Error: Into<BoxError> + Send + 'static,
    S::Future: Send + 'static,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    BoxCloneService::new(HandleError::new(svc, |err: S::Error| async move {
        let err: BoxError = err.into();
        handlers::engine_failure(err)
    }))
}

/// Trailers-only gRPC response with status `UNAVAILABLE`.
fn draining_response() -> Response {
    let mut resp = Response::new(Body::empty());
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(GRPC_CONTENT_TYPE));
    headers.insert("grpc-status", HeaderValue::from(Code::Unavailable as i32));
    headers.insert("grpc-message", HeaderValue::from_static("server%20is%20draining"));
    resp
}
