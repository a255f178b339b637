//! `rpcgw`: serve one service as gRPC and as a JSON/HTTP gateway on a single
//! TLS port.
//!
//! Startup sequence (see [`Server::serve`]):
//! 1. Validate [`ServerConfig`] and load the TLS key pair.
//! 2. Attach the [`RegisteredService`] to a fresh [`RpcEngine`] and to a
//!    [`GatewayMux`] that dials back into the RPC engine over TLS.
//! 3. Compose the middleware [`Chain`] around the protocol router.
//! 4. Bind the listener and serve until the shutdown token fires.
//! 5. Drain: stop the RPC engine, close the listener, finish open connections.

pub mod config;
pub mod credentials;
pub mod engine;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;
pub mod service;
pub mod static_files;
pub mod telemetry;

use std::convert::Infallible;

use axum::{body::Body, http::Request, response::Response};
use tower::util::BoxCloneService;

pub use config::ServerConfig;
pub use engine::{
    gateway::{DialCredentials, GatewayMux},
    RpcEngine,
};
pub use middleware::Chain;
pub use server::{state::LifecycleState, Server};
pub use service::RegisteredService;
pub use static_files::AssetBundle;

/// Type-erased request handler shared by the middleware chain, the protocol
/// router and both engines.
pub type HttpService = BoxCloneService<Request<Body>, Response, Infallible>;
