//! Server lifecycle: startup sequencing, the accept loop and the drain.
//!
//! # Responsibilities
//! - Load credentials and build both engines before anything is bound.
//! - Terminate TLS once and serve HTTP/1.1 and HTTP/2 on the same port.
//! - On cancellation, stop the RPC engine, close the listener and drain open
//!   connections within the configured deadline.

mod connection;
pub mod state;

use std::sync::Arc;

use common::ServeError;
use tokio::{net::TcpListener, sync::watch, time::timeout_at};
use tokio_rustls::TlsAcceptor;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower::util::BoxCloneService;
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    credentials,
    engine::{
        gateway::{DialCredentials, DialTarget, GatewayMux},
        RpcEngine,
    },
    middleware::{ApiLogLayer, Chain},
    router,
    service::RegisteredService,
    static_files::StaticContent,
};

use connection::Shutdown;
use state::{LifecycleState, StateCell};

/// One service, exposed over gRPC and the JSON gateway on one TLS port.
pub struct Server {
    config: ServerConfig,
    service: Arc<dyn RegisteredService>,
    middleware: Chain,
    state: StateCell,
}

impl Server {
    pub fn new(config: ServerConfig, service: Arc<dyn RegisteredService>) -> Self {
        Self {
            config,
            service,
            middleware: Chain::new(),
            state: StateCell::new(),
        }
    }

    /// Install extra middleware. It runs inside the API logger, so logged
    /// statuses are the ones the client actually receives.
    pub fn middleware(mut self, chain: Chain) -> Self {
        self.middleware = chain;
        self
    }

    /// Watch the lifecycle. The receiver keeps the last phase after
    /// [`Server::serve`] returns.
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` is cancelled, then drain and return.
    ///
    /// # Errors
    ///
    /// Every error is raised before the listener starts accepting; once
    /// serving, the run always ends in `Ok(())`.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ServeError> {
        credentials::install_crypto_provider();

        // -------------------------------------------------------------------
        // 1. Credentials
        // -------------------------------------------------------------------
        self.config.validate()?;
        let credentials = credentials::load(&self.config.cert_file, &self.config.key_file)?;
        let content = StaticContent::new(self.config.assets, &self.config.swagger_dir)?;
        self.state.advance(LifecycleState::CredentialsLoaded);

        // -------------------------------------------------------------------
        // 2. Engines
        // -------------------------------------------------------------------
        let mut engine = RpcEngine::new();
        self.service.attach_rpc(&mut engine);
        let services = engine.services().to_vec();
        let rpc = engine.start();

        let target = DialTarget::from_listen_address(&self.config.address)?;
        let dial = DialCredentials::new(&credentials, target.domain.clone());
        let mut gateway = GatewayMux::new();
        self.service
            .attach_gateway(&shutdown, &mut gateway, &target.authority, &dial)
            .await?;

        let http = BoxCloneService::new(router::http_mux(&content, gateway.into_router()));
        let chain = if self.config.no_api_log {
            self.middleware.clone()
        } else {
            self.middleware.append_layer(ApiLogLayer)
        };
        let handler = router::build(&chain, rpc.service(), http);
        self.state.advance(LifecycleState::EnginesBuilt);

        // -------------------------------------------------------------------
        // 3. Listen
        // -------------------------------------------------------------------
        let listener = TcpListener::bind(&self.config.address)
            .await
            .map_err(|source| ServeError::Bind {
                address: self.config.address.clone(),
                source,
            })?;
        let acceptor = TlsAcceptor::from(credentials.server_config());
        info!(
            address = %self.config.address,
            rpc_services = ?services,
            docs = %content.docs_dir().display(),
            "listening"
        );
        self.state.advance(LifecycleState::Listening);

        let connections = TaskTracker::new();
        let conn_shutdown = Shutdown::default();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(connection::serve(
                            stream,
                            peer,
                            acceptor.clone(),
                            connection::HANDSHAKE_TIMEOUT,
                            handler.clone(),
                            conn_shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
            }
        }

        // -------------------------------------------------------------------
        // 4. Drain
        // -------------------------------------------------------------------
        self.state.advance(LifecycleState::Draining);
        let deadline = tokio::time::Instant::now() + self.config.drain_timeout();
        info!(open_connections = connections.len(), "shutdown requested, draining");

        if timeout_at(deadline, rpc.graceful_stop()).await.is_err() {
            warn!("rpc calls still running at drain deadline");
        }
        drop(listener);

        conn_shutdown.drain.cancel();
        connections.close();
        if timeout_at(deadline, connections.wait()).await.is_err() {
            warn!(
                open_connections = connections.len(),
                "drain deadline reached, closing remaining connections"
            );
            conn_shutdown.force.cancel();
            connections.wait().await;
        }

        self.state.advance(LifecycleState::Stopped);
        info!(state = %self.state.current(), "server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handlers, service::MockRegisteredService};
    use axum::routing::get;
    use bytes::Bytes;
    use common::RegistrationError;
    use http_body_util::{BodyExt, Empty};
    use hyper::{header, Request, StatusCode};
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use rustls::{pki_types::ServerName, ClientConfig, RootCertStore};
    use std::time::{Duration, Instant};

    fn fixture(name: &str) -> String {
        format!("{}/../../certs/{name}", env!("CARGO_MANIFEST_DIR"))
    }

    fn free_address() -> String {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("127.0.0.1:{}", probe.local_addr().unwrap().port())
    }

    fn test_config(address: &str, docs: &std::path::Path) -> ServerConfig {
        ServerConfig {
            address: address.to_owned(),
            cert_file: fixture("server.pem"),
            key_file: fixture("server.key"),
            swagger_dir: docs.to_str().unwrap().to_owned(),
            drain_timeout_secs: 5,
            ..ServerConfig::default()
        }
    }

    /// Client TLS config trusting only the fixture certificate and offering
    /// `alpn`.
    fn client_config(alpn: &[u8]) -> Arc<ClientConfig> {
        let pem = std::fs::read(fixture("server.pem")).unwrap();
        let mut roots = RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
            roots.add(cert.unwrap()).unwrap();
        }
        let mut config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        config.alpn_protocols = vec![alpn.to_vec()];
        Arc::new(config)
    }

    async fn tls_connect(
        address: &str,
        alpn: &[u8],
    ) -> tokio_rustls::client::TlsStream<tokio::net::TcpStream> {
        let connector = tokio_rustls::TlsConnector::from(client_config(alpn));
        let tcp = tokio::net::TcpStream::connect(address).await.unwrap();
        let name = ServerName::try_from("localhost").unwrap();
        connector.connect(name, tcp).await.unwrap()
    }

    async fn https_get(address: &str, path: &str) -> (StatusCode, Bytes) {
        let tls = tls_connect(address, b"h2").await;
        let (mut sender, conn) =
            hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(tls))
                .await
                .unwrap();
        tokio::spawn(conn);

        let req = Request::get(format!("https://localhost{path}"))
            .body(Empty::<Bytes>::new())
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    async fn http1_get(address: &str, path: &str) -> (StatusCode, Bytes) {
        let tls = tls_connect(address, b"http/1.1").await;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls))
            .await
            .unwrap();
        tokio::spawn(conn);

        let req = Request::get(path)
            .header(header::HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    /// Mock service whose gateway registers `routes`.
    fn service_with(routes: fn(&mut GatewayMux)) -> MockRegisteredService {
        let mut service = MockRegisteredService::new();
        service.expect_attach_rpc().times(1).return_const(());
        service
            .expect_attach_gateway()
            .times(1)
            .returning(move |_, gateway, _, _| {
                routes(gateway);
                Ok(())
            });
        service
    }

    #[tokio::test]
    async fn empty_cert_path_fails_before_anything_starts() {
        // No expectations: any attach call would panic.
        let service = MockRegisteredService::new();
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            cert_file: String::new(),
            ..test_config(&free_address(), dir.path())
        };

        let server = Server::new(config, Arc::new(service));
        let state = server.state();
        let err = server.serve(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, ServeError::Configuration { field: "cert_file", .. }));
        assert_eq!(*state.borrow(), LifecycleState::Unstarted);
    }

    #[tokio::test]
    async fn registration_failure_leaves_port_unbound() {
        let mut service = MockRegisteredService::new();
        service.expect_attach_rpc().times(1).return_const(());
        service
            .expect_attach_gateway()
            .times(1)
            .returning(|_, _, _, _| Err(RegistrationError::gateway("dial refused")));

        let address = free_address();
        let dir = tempfile::tempdir().unwrap();
        let server = Server::new(test_config(&address, dir.path()), Arc::new(service));
        let state = server.state();
        let err = server.serve(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, ServeError::Registration(_)));
        assert_eq!(*state.borrow(), LifecycleState::CredentialsLoaded);
        std::net::TcpListener::bind(&address).expect("port must still be free");
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let mut service = MockRegisteredService::new();
        service.expect_attach_rpc().return_const(());
        service
            .expect_attach_gateway()
            .returning(|_, _, _, _| Ok(()));

        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = holder.local_addr().unwrap().to_string();
        let dir = tempfile::tempdir().unwrap();
        let server = Server::new(test_config(&address, dir.path()), Arc::new(service));

        let err = server.serve(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServeError::Bind { .. }), "{err}");
    }

    #[tokio::test]
    async fn serves_static_and_gateway_then_drains() {
        let address = free_address();
        let expected_endpoint = address.clone();

        let mut service = MockRegisteredService::new();
        service.expect_attach_rpc().times(1).return_const(());
        service
            .expect_attach_gateway()
            .times(1)
            .returning(move |_, gateway, endpoint, credentials| {
                assert_eq!(endpoint, expected_endpoint);
                assert_eq!(credentials.domain(), "127.0.0.1");
                gateway.route("/v1/ping", get(|| async { "pong" }));
                Ok(())
            });

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("foo")).unwrap();
        std::fs::write(dir.path().join("foo/bar.json"), r#"{"paths":{}}"#).unwrap();

        let server = Server::new(test_config(&address, dir.path()), Arc::new(service));
        let mut state = server.state();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(server.serve(shutdown.clone()));

        state
            .wait_for(|s| *s == LifecycleState::Listening)
            .await
            .unwrap();

        let (status, _) = https_get(&address, "/swagger-ui/index.html").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = https_get(&address, "/swaggers/foo/bar.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], br#"{"paths":{}}"#);

        let (status, body) = https_get(&address, "/v1/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"pong");

        shutdown.cancel();
        shutdown.cancel();
        run.await.unwrap().unwrap();
        assert_eq!(*state.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn internal_error_reaches_client_without_body() {
        let service = service_with(|gateway| {
            gateway.route(
                "/v1/fail",
                get(|| async { handlers::engine_failure("backend exploded") }),
            );
        });

        let address = free_address();
        let dir = tempfile::tempdir().unwrap();
        let server = Server::new(test_config(&address, dir.path()), Arc::new(service));
        let mut state = server.state();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(server.serve(shutdown.clone()));
        state
            .wait_for(|s| *s == LifecycleState::Listening)
            .await
            .unwrap();

        let (status, body) = https_get(&address, "/v1/fail").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());

        let (status, body) = http1_get(&address, "/v1/fail").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());

        shutdown.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn drain_is_cut_off_at_deadline() {
        let service = service_with(|gateway| {
            gateway.route(
                "/v1/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "late"
                }),
            );
        });

        let address = free_address();
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            drain_timeout_secs: 1,
            ..test_config(&address, dir.path())
        };
        let server = Server::new(config, Arc::new(service));
        let mut state = server.state();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(server.serve(shutdown.clone()));
        state
            .wait_for(|s| *s == LifecycleState::Listening)
            .await
            .unwrap();

        let target = address.clone();
        let stuck = tokio::spawn(async move { https_get(&target, "/v1/slow").await });
        // Give the request time to reach the handler.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("serve must return after the drain deadline")
            .unwrap()
            .unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
        assert_eq!(*state.borrow(), LifecycleState::Stopped);
        // The cut-off request never completes normally.
        assert!(stuck.await.is_err());
    }
}
