//! The JSON/HTTP gateway engine.
//!
//! Services register plain axum routes into a [`GatewayMux`]. Route handlers
//! reach the RPC engine through a tonic [`Channel`] built from
//! [`DialCredentials`], dialling back into the same listener over TLS.

use std::{fmt, sync::Arc};

use axum::{response::Response, routing::MethodRouter, Router};
use common::{RegistrationError, RequestError, ServeError};
use tonic::{
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint},
    Code, Status,
};

use crate::{credentials::CredentialSet, handlers};

/// Hosts that mean "any interface" and cannot be dialled as-is.
const UNSPECIFIED_HOSTS: [&str; 4] = ["", "0.0.0.0", "::", "[::]"];

/// HTTP routes registered by services.
#[derive(Debug, Default)]
pub struct GatewayMux {
    router: Router,
}

impl GatewayMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route.
    ///
    /// # Panics
    ///
    /// Panics if `path` is invalid or already routed for the same method, as
    /// [`Router::route`] does.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> &mut Self {
        self.router = std::mem::take(&mut self.router).route(path, method_router);
        self
    }

    /// Merge a whole router in, e.g. one built by a service crate.
    pub fn merge(&mut self, router: Router) -> &mut Self {
        self.router = std::mem::take(&mut self.router).merge(router);
        self
    }

    pub(crate) fn into_router(self) -> Router {
        self.router
    }
}

/// Where the gateway dials to reach the RPC engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    /// `host:port` used in the request URI.
    pub authority: String,
    /// Name checked against the server certificate.
    pub domain: String,
}

impl DialTarget {
    /// Derive the loopback target from the listen address. Wildcard hosts are
    /// replaced with `localhost`.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Configuration`] if `address` is not `host:port`.
    pub fn from_listen_address(address: &str) -> Result<Self, ServeError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| ServeError::config("address", format!("{address:?} is not host:port")))?;
        if port.parse::<u16>().is_err() {
            return Err(ServeError::config(
                "address",
                format!("{address:?} has an invalid port"),
            ));
        }

        let host = if UNSPECIFIED_HOSTS.contains(&host) {
            "localhost"
        } else {
            host
        };
        Ok(Self {
            authority: format!("{host}:{port}"),
            domain: host.trim_start_matches('[').trim_end_matches(']').to_owned(),
        })
    }
}

/// TLS material the gateway uses to dial the RPC engine. The server's own
/// certificate is the only trusted root.
#[derive(Clone)]
pub struct DialCredentials {
    cert_pem: Arc<[u8]>,
    domain: String,
}

impl fmt::Debug for DialCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialCredentials")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl DialCredentials {
    pub fn new(credentials: &CredentialSet, domain: impl Into<String>) -> Self {
        Self::from_pem(credentials.cert_pem(), domain)
    }

    /// Trust exactly the certificates in `cert_pem`. Used by standalone
    /// clients that only hold the server's certificate file.
    pub fn from_pem(cert_pem: &[u8], domain: impl Into<String>) -> Self {
        Self {
            cert_pem: Arc::from(cert_pem),
            domain: domain.into(),
        }
    }

    /// Name the dialled certificate must carry.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Client TLS settings for a tonic endpoint.
    pub fn tls_config(&self) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(&*self.cert_pem))
            .domain_name(self.domain.clone())
    }

    /// A lazily connecting channel to `endpoint` (`host:port`). Nothing is
    /// dialled until the first call.
    ///
    /// # Errors
    ///
    /// Returns a gateway [`RegistrationError`] if `endpoint` is not a valid
    /// authority or the TLS settings are rejected.
    pub fn channel(&self, endpoint: &str) -> Result<Channel, RegistrationError> {
        let channel = Endpoint::from_shared(format!("https://{endpoint}"))
            .map_err(RegistrationError::gateway)?
            .tls_config(self.tls_config())
            .map_err(RegistrationError::gateway)?
            .connect_lazy();
        Ok(channel)
    }
}

/// Map an RPC status to the error a JSON caller sees.
pub fn status_to_error(status: &Status) -> RequestError {
    let message = status.message().to_owned();
    match status.code() {
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            RequestError::BadRequest(message)
        }
        Code::Unauthenticated => RequestError::Unauthenticated(message),
        Code::PermissionDenied => RequestError::PermissionDenied(message),
        Code::NotFound => RequestError::NotFound(message),
        Code::AlreadyExists | Code::Aborted => RequestError::Conflict(message),
        Code::ResourceExhausted => RequestError::TooManyRequests(message),
        Code::Cancelled => RequestError::Cancelled(message),
        Code::Unimplemented => RequestError::NotImplemented(message),
        Code::Unavailable => RequestError::Unavailable(message),
        Code::DeadlineExceeded => RequestError::Timeout(message),
        Code::Ok | Code::Unknown | Code::Internal | Code::DataLoss => {
            RequestError::Internal(message)
        }
    }
}

/// JSON error response for a failed RPC.
pub fn status_response(status: &Status) -> Response {
    handlers::error_response(&status_to_error(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum_test::TestServer;

    #[test]
    fn wildcard_hosts_dial_localhost() {
        for address in ["0.0.0.0:10000", ":10000", "[::]:10000"] {
            let target = DialTarget::from_listen_address(address).unwrap();
            assert_eq!(target.authority, "localhost:10000", "{address}");
            assert_eq!(target.domain, "localhost", "{address}");
        }
    }

    #[test]
    fn concrete_hosts_are_kept() {
        let target = DialTarget::from_listen_address("127.0.0.1:8443").unwrap();
        assert_eq!(target.authority, "127.0.0.1:8443");
        assert_eq!(target.domain, "127.0.0.1");

        let target = DialTarget::from_listen_address("[::1]:8443").unwrap();
        assert_eq!(target.authority, "[::1]:8443");
        assert_eq!(target.domain, "::1");
    }

    #[test]
    fn malformed_address_is_configuration_error() {
        for address in ["localhost", "localhost:http", "localhost:70000"] {
            let err = DialTarget::from_listen_address(address).unwrap_err();
            assert!(
                matches!(err, ServeError::Configuration { field: "address", .. }),
                "{address}"
            );
        }
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (Code::InvalidArgument, 400),
            (Code::Unauthenticated, 401),
            (Code::PermissionDenied, 403),
            (Code::NotFound, 404),
            (Code::AlreadyExists, 409),
            (Code::ResourceExhausted, 429),
            (Code::Cancelled, 499),
            (Code::Internal, 500),
            (Code::Unimplemented, 501),
            (Code::Unavailable, 503),
            (Code::DeadlineExceeded, 504),
        ];
        for (code, http) in cases {
            let err = status_to_error(&Status::new(code, "x"));
            assert_eq!(err.http_status(), http, "{code:?}");
        }
    }

    #[tokio::test]
    async fn mux_serves_registered_routes() {
        let mut mux = GatewayMux::new();
        mux.route("/v1/ping", get(|| async { "pong" }))
            .merge(Router::new().route("/v1/other", get(|| async { "other" })));

        let server = TestServer::new(mux.into_router()).unwrap();
        server.get("/v1/ping").await.assert_text("pong");
        server.get("/v1/other").await.assert_text("other");
    }

    #[tokio::test]
    async fn channel_is_lazy() {
        let creds = crate::credentials::load(
            &format!("{}/../../certs/server.pem", env!("CARGO_MANIFEST_DIR")),
            &format!("{}/../../certs/server.key", env!("CARGO_MANIFEST_DIR")),
        )
        .unwrap();
        let dial = DialCredentials::new(&creds, "localhost");
        assert_eq!(dial.domain(), "localhost");
        // Nothing listens on this port; a lazy channel must still build.
        assert!(dial.channel("localhost:1").is_ok());
    }
}
