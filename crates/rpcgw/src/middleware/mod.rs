//! Composable request middleware applied in front of the protocol router.
//!
//! A [`Chain`] is an ordered list of transforms, each wrapping an
//! [`HttpService`] in another one. The last transform appended is the
//! outermost: it sees the request first and the response last. Every
//! request passes through the chain whether it ends up at the RPC engine or
//! at the HTTP mux.

pub mod api_log;

use std::{convert::Infallible, fmt, sync::Arc, time::Duration};

use axum::{body::Body, http::Request, response::Response};
use tower::{util::BoxCloneService, Layer, Service};

use crate::HttpService;

pub use api_log::{ApiLog, ApiLogLayer};

/// Default per-request timeout applied to the HTTP mux.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One chain entry: takes a handler and returns a handler wrapping it.
pub type Transform = Arc<dyn Fn(HttpService) -> HttpService + Send + Sync>;

/// Ordered, immutable middleware chain.
///
/// [`Chain::append`] never mutates the receiver; it returns a new chain that
/// shares the existing entries.
#[derive(Clone, Default)]
pub struct Chain {
    transforms: Vec<Transform>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.transforms.len())
            .finish()
    }
}

impl Chain {
    /// An empty chain. [`Chain::then`] on it returns the inner handler as is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new chain with `transform` wrapped around everything already
    /// in this one.
    pub fn append<F>(&self, transform: F) -> Chain
    where
        F: Fn(HttpService) -> HttpService + Send + Sync + 'static,
    {
        let mut transforms = self.transforms.clone();
        transforms.push(Arc::new(transform));
        Chain { transforms }
    }

    /// [`Chain::append`] for a `tower` layer.
    pub fn append_layer<L>(&self, layer: L) -> Chain
    where
        L: Layer<HttpService> + Send + Sync + 'static,
        L::Service: Service<Request<Body>, Response = Response, Error = Infallible>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<Request<Body>>>::Future: Send + 'static,
    {
        self.append(move |inner| BoxCloneService::new(layer.layer(inner)))
    }

    /// Number of transforms in the chain.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether the chain has no transforms.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Materialise the chain around `inner`.
    pub fn then<S>(&self, inner: S) -> HttpService
    where
        S: Service<Request<Body>, Response = Response, Error = Infallible>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.transforms
            .iter()
            .fold(BoxCloneService::new(inner), |svc, transform| transform(svc))
    }
}
