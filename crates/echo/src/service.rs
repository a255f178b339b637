//! `example.EchoService` over gRPC: the handler, its tonic server adapter and
//! a typed client.

use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};

use tonic::{
    body::{empty_body, BoxBody},
    codec::ProstCodec,
    codegen::{BoxFuture, StdError},
    server::{NamedService, UnaryService},
    transport::Channel,
    Code, IntoRequest, Request, Response, Status,
};
use tracing::info;

use crate::proto::EchoMessage;

/// Fully qualified service name.
pub const SERVICE_NAME: &str = "example.EchoService";
/// Path of the `Echo` method.
pub const ECHO_PATH: &str = "/example.EchoService/Echo";

/// Echo handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoService;

impl EchoService {
    /// Return the request message unchanged.
    pub async fn echo(&self, request: Request<EchoMessage>) -> Result<Response<EchoMessage>, Status> {
        let msg = request.into_inner();
        info!(value = %msg.value, "rpc request Echo");
        Ok(Response::new(msg))
    }
}

/// tonic server adapter for [`EchoService`].
#[derive(Debug, Clone)]
pub struct EchoServer {
    inner: Arc<EchoService>,
}

impl EchoServer {
    pub fn new(inner: EchoService) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<EchoService>) -> Self {
        Self { inner }
    }
}

impl NamedService for EchoServer {
    const NAME: &'static str = SERVICE_NAME;
}

impl<B> tower::Service<http::Request<B>> for EchoServer
where
    B: http_body::Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            ECHO_PATH => {
                let method = EchoMethod(Arc::clone(&self.inner));
                Box::pin(async move {
                    let mut grpc =
                        tonic::server::Grpc::new(ProstCodec::<EchoMessage, EchoMessage>::default());
                    Ok(grpc.unary(method, req).await)
                })
            }
            _ => Box::pin(async { Ok(unimplemented_response()) }),
        }
    }
}

/// Trailers-only `UNIMPLEMENTED` for methods this service does not have.
fn unimplemented_response() -> http::Response<BoxBody> {
    let mut resp = http::Response::new(empty_body());
    let headers = resp.headers_mut();
    headers.insert(Status::GRPC_STATUS, (Code::Unimplemented as i32).into());
    headers.insert(http::header::CONTENT_TYPE, tonic::metadata::GRPC_CONTENT_TYPE);
    resp
}

struct EchoMethod(Arc<EchoService>);

impl UnaryService<EchoMessage> for EchoMethod {
    type Response = EchoMessage;
    type Future = BoxFuture<Response<EchoMessage>, Status>;

    fn call(&mut self, request: Request<EchoMessage>) -> Self::Future {
        let inner = Arc::clone(&self.0);
        Box::pin(async move { inner.echo(request).await })
    }
}

/// Typed client for `example.EchoService`.
#[derive(Debug, Clone)]
pub struct EchoClient {
    inner: tonic::client::Grpc<Channel>,
}

impl EchoClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Call `Echo`.
    pub async fn echo(
        &mut self,
        request: impl IntoRequest<EchoMessage>,
    ) -> Result<Response<EchoMessage>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unavailable(format!("service was not ready: {e}")))?;
        let codec = ProstCodec::<EchoMessage, EchoMessage>::default();
        let path = http::uri::PathAndQuery::from_static(ECHO_PATH);
        self.inner.unary(request.into_request(), path, codec).await
    }
}
