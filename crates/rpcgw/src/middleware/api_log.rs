//! API call logging.
//!
//! [`ApiLogLayer`] wraps a handler so that every call produces exactly one
//! `"API called"` event carrying the response status, the number of body
//! bytes written, the request method and the request path. The event fires
//! once the response body has been fully written (or dropped), not when the
//! headers go out.
//!
//! A response that carries `500 Internal Server Error` must not leak a body.
//! Its `Content-Length` is dropped, the first body write is refused with
//! [`WriteAfterFaultError`] and the refused bytes are logged server-side. The
//! client still receives a complete 500 with an empty body.

use std::{
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
};

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    BoxError,
};
use bytes::Bytes;
use common::WriteAfterFaultError;
use http_body::{Frame, SizeHint};
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use tracing::{info, warn};

/// Longest prefix of a refused body that is copied into the log.
const MAX_LOGGED_FAULT_BODY: usize = 1024;

/// `tower` layer producing [`ApiLog`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiLogLayer;

impl<S> Layer<S> for ApiLogLayer {
    type Service = ApiLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiLog { inner }
    }
}

/// Service wrapper that logs each call; see the module docs.
#[derive(Debug, Clone)]
pub struct ApiLog<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ApiLog<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut resp = fut.await?;
            let record = ApiCall {
                status: resp.status(),
                method,
                path,
                length: 0,
            };
            if record.is_fault() {
                resp.headers_mut().remove(header::CONTENT_LENGTH);
            }
            Ok(resp.map(|body| Body::new(LoggedBody::new(body, record))))
        })
    }
}

/// What gets logged for one call.
#[derive(Debug, Clone)]
struct ApiCall {
    status: StatusCode,
    method: Method,
    path: String,
    length: usize,
}

impl ApiCall {
    fn emit(&self) {
        info!(
            status = self.status.as_u16(),
            verb = %self.method,
            length = self.length,
            path = %self.path,
            "API called"
        );
    }

    fn is_fault(&self) -> bool {
        self.status == StatusCode::INTERNAL_SERVER_ERROR
    }
}

pin_project! {
    /// Response body that counts bytes and emits the call record on drop.
    struct LoggedBody<B> {
        #[pin]
        inner: B,
        record: ApiCall,
        refused: bool,
    }

    impl<B> PinnedDrop for LoggedBody<B> {
        fn drop(this: Pin<&mut Self>) {
            this.project().record.emit();
        }
    }
}

impl<B> LoggedBody<B> {
    fn new(inner: B, record: ApiCall) -> Self {
        Self {
            inner,
            record,
            refused: false,
        }
    }
}

impl<B> http_body::Body for LoggedBody<B>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.project();
        if *this.refused {
            return Poll::Ready(None);
        }

        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    if this.record.is_fault() {
                        let shown = &data[..data.len().min(MAX_LOGGED_FAULT_BODY)];
                        warn!(
                            path = %this.record.path,
                            error = %WriteAfterFaultError,
                            body = %String::from_utf8_lossy(shown),
                            "internal server error"
                        );
                        *this.refused = true;
                        return Poll::Ready(None);
                    }
                    this.record.length += data.len();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => Poll::Ready(Some(Err(e.into()))),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.refused || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        if self.record.is_fault() {
            // Whatever the handler meant to send will be refused.
            SizeHint::default()
        } else {
            self.inner.size_hint()
        }
    }
}
