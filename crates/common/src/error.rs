//! Error types shared across crates.
//!
//! Two families live here:
//! - [`ServeError`] covers startup. Every variant is fatal: the server never
//!   binds a port after one of these is returned.
//! - [`RequestError`] covers a single request and maps to an HTTP status code.

use std::fmt;

use thiserror::Error;

/// Fatal error raised while bringing a server up.
#[derive(Debug, Error)]
pub enum ServeError {
    /// A required setting is missing or malformed.
    #[error("configuration error: {field} {reason}")]
    Configuration {
        /// Name of the offending setting (e.g. `"cert_file"`).
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Certificate or key material could not be loaded.
    #[error("failed to load TLS credentials from {path}: {reason}")]
    CredentialLoad {
        /// File the failure relates to.
        path: String,
        /// Parser or I/O diagnostic.
        reason: String,
    },

    /// The listen address could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address from the configuration.
        address: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The registered service could not attach to one of the engines.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl ServeError {
    /// Shorthand for [`ServeError::Configuration`].
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ServeError::CredentialLoad`].
    pub fn credentials(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::CredentialLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Which engine a registration failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// The binary RPC engine.
    Rpc,
    /// The JSON/HTTP gateway.
    Gateway,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Rpc => f.write_str("rpc"),
            Engine::Gateway => f.write_str("gateway"),
        }
    }
}

/// A service failed to attach itself to an engine.
#[derive(Debug, Error)]
#[error("failed to attach service to {engine} engine: {reason}")]
pub struct RegistrationError {
    /// Engine that rejected the registration.
    pub engine: Engine,
    /// Human-readable cause.
    pub reason: String,
}

impl RegistrationError {
    /// Registration failure against the gateway engine.
    pub fn gateway(reason: impl fmt::Display) -> Self {
        Self {
            engine: Engine::Gateway,
            reason: reason.to_string(),
        }
    }

    /// Registration failure against the RPC engine.
    pub fn rpc(reason: impl fmt::Display) -> Self {
        Self {
            engine: Engine::Rpc,
            reason: reason.to_string(),
        }
    }
}

/// Per-request failure inside an engine or the static file server.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`RequestError::BadRequest`] → 400
/// - [`RequestError::Unauthenticated`] → 401
/// - [`RequestError::PermissionDenied`] → 403
/// - [`RequestError::NotFound`] → 404
/// - [`RequestError::Conflict`] → 409
/// - [`RequestError::TooManyRequests`] → 429
/// - [`RequestError::Cancelled`] → 499
/// - [`RequestError::Internal`] → 500
/// - [`RequestError::NotImplemented`] → 501
/// - [`RequestError::Unavailable`] → 503
/// - [`RequestError::Timeout`] → 504
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No valid credentials were presented.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Credentials were presented but do not grant access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A quota or rate limit was hit.
    #[error("too many requests: {0}")]
    TooManyRequests(String),

    /// The caller gave up before the backend answered.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),

    /// The method exists in the API description but has no handler.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The backend is draining or otherwise unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl RequestError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            RequestError::BadRequest(_) => 400,
            RequestError::Unauthenticated(_) => 401,
            RequestError::PermissionDenied(_) => 403,
            RequestError::NotFound(_) => 404,
            RequestError::Conflict(_) => 409,
            RequestError::TooManyRequests(_) => 429,
            RequestError::Cancelled(_) => 499,
            RequestError::Internal(_) => 500,
            RequestError::NotImplemented(_) => 501,
            RequestError::Unavailable(_) => 503,
            RequestError::Timeout(_) => 504,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::BadRequest(_) => "bad_request",
            RequestError::Unauthenticated(_) => "unauthenticated",
            RequestError::PermissionDenied(_) => "permission_denied",
            RequestError::NotFound(_) => "not_found",
            RequestError::Conflict(_) => "conflict",
            RequestError::TooManyRequests(_) => "too_many_requests",
            RequestError::Cancelled(_) => "cancelled",
            RequestError::Internal(_) => "internal_error",
            RequestError::NotImplemented(_) => "not_implemented",
            RequestError::Unavailable(_) => "service_unavailable",
            RequestError::Timeout(_) => "timeout",
        }
    }
}

/// A response body write was attempted after the handler set a server-fault
/// status. The bytes are dropped instead of being sent to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("internal server error: body write refused after fault status")]
pub struct WriteAfterFaultError;
