//! Protocol routing.
//!
//! Every request is sent either to the RPC engine or to the HTTP mux. A
//! request goes to the RPC engine iff it arrived over HTTP/2 and its
//! `content-type` contains the RPC media type token; everything else is
//! plain HTTP. The HTTP mux then picks between the static content and the
//! gateway routes by path prefix.

use std::{
    convert::Infallible,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Version},
    response::Response,
    Router,
};
use tower::{util::Oneshot, Service, ServiceExt};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    engine::GRPC_CONTENT_TYPE, handlers, middleware, middleware::Chain,
    static_files::StaticContent, HttpService,
};

/// Where a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Rpc,
    Http,
}

/// Pure routing decision for one request.
pub fn select(version: Version, content_type: Option<&HeaderValue>, token: &str) -> Route {
    let rpc = version == Version::HTTP_2
        && content_type
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains(token));
    if rpc {
        Route::Rpc
    } else {
        Route::Http
    }
}

/// Dispatches each request according to [`select`].
#[derive(Clone)]
pub struct ProtocolRouter {
    rpc: HttpService,
    http: HttpService,
}

impl ProtocolRouter {
    /// Router sending gRPC calls to `rpc` and the rest to `http`.
    pub fn new(rpc: HttpService, http: HttpService) -> Self {
        Self { rpc, http }
    }
}

impl Service<Request<Body>> for ProtocolRouter {
    type Response = Response;
    type Error = Infallible;
    type Future = Oneshot<HttpService, Request<Body>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        // Each branch is readied by `oneshot` on its own clone.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let route = select(req.version(), req.headers().get(header::CONTENT_TYPE), GRPC_CONTENT_TYPE);
        match route {
            Route::Rpc => self.rpc.clone().oneshot(req),
            Route::Http => self.http.clone().oneshot(req),
        }
    }
}

/// The HTTP mux: static content under its prefixes, gateway routes
/// everywhere else, unmatched paths as JSON 404s.
pub fn http_mux(content: &StaticContent, gateway: Router) -> Router {
    let statics = content.router();
    let gateway = gateway.fallback(handlers::not_found);

    let dispatch = tower::service_fn(move |req: Request<Body>| {
        let target = if StaticContent::owns(req.uri().path()) {
            statics.clone()
        } else {
            gateway.clone()
        };
        target.oneshot(req)
    });

    Router::new()
        .fallback_service(dispatch)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
}

/// The complete handler: `chain` around a [`ProtocolRouter`].
pub fn build(chain: &Chain, rpc: HttpService, http: HttpService) -> HttpService {
    chain.then(ProtocolRouter::new(rpc, http))
}
