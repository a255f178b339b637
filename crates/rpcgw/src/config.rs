//! Server configuration loading and validation.
//!
//! Values are read from `RPCGW_`-prefixed environment variables. Binaries may
//! override individual fields (e.g. from command-line flags) before handing the
//! config to [`crate::Server::new`]; after that it is never mutated.

use std::time::Duration;

use anyhow::{Context, Result};
use common::ServeError;
use serde::Deserialize;

use crate::static_files::AssetBundle;

/// Validated server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` the TLS listener binds to. Also the address the gateway
    /// dials to reach the RPC engine.
    #[serde(default = "default_address")]
    pub address: String,

    /// Filesystem path to the PEM-encoded private key. **Required.**
    #[serde(default = "default_key_file")]
    pub key_file: String,

    /// Filesystem path to the PEM-encoded certificate chain. **Required.**
    ///
    /// Every certificate in this file is also trusted as a root when the
    /// gateway dials back into the RPC engine.
    #[serde(default = "default_cert_file")]
    pub cert_file: String,

    /// Directory of generated API description documents served under
    /// `/swaggers/`.
    #[serde(default = "default_swagger_dir")]
    pub swagger_dir: String,

    /// Skip the API call logging middleware.
    #[serde(default)]
    pub no_api_log: bool,

    /// Upper bound (seconds) on the graceful drain after cancellation.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for span export. Logs only when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// UI bundle served under `/swagger-ui/`.
    #[serde(skip)]
    pub assets: AssetBundle,
}

fn default_address() -> String {
    "localhost:10000".into()
}
fn default_key_file() -> String {
    "certs/server.key".into()
}
fn default_cert_file() -> String {
    "certs/server.pem".into()
}
fn default_swagger_dir() -> String {
    "swaggers".into()
}
fn default_drain_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            key_file: default_key_file(),
            cert_file: default_cert_file(),
            swagger_dir: default_swagger_dir(),
            no_api_log: false,
            drain_timeout_secs: default_drain_timeout(),
            log_level: default_log_level(),
            otel_exporter_otlp_endpoint: None,
            assets: AssetBundle::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Validation is deferred to [`ServerConfig::validate`] so callers can
    /// apply overrides first.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("RPCGW"))
            .build()
            .context("failed to build configuration from environment")?;

        cfg.try_deserialize()
            .context("failed to deserialise configuration")
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<(), ServeError> {
        ensure_non_empty(&self.address, "address")?;
        ensure_non_empty(&self.key_file, "key_file")?;
        ensure_non_empty(&self.cert_file, "cert_file")?;
        if self.drain_timeout_secs == 0 {
            return Err(ServeError::config("drain_timeout_secs", "must be > 0"));
        }
        Ok(())
    }

    /// Graceful drain deadline.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), ServeError> {
    if value.trim().is_empty() {
        return Err(ServeError::config(field, "is required and must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.address, "localhost:10000");
        assert_eq!(cfg.key_file, "certs/server.key");
        assert_eq!(cfg.cert_file, "certs/server.pem");
        assert_eq!(cfg.swagger_dir, "swaggers");
        assert!(!cfg.no_api_log);
        assert_eq!(cfg.drain_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.otel_exporter_otlp_endpoint.is_none());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_cert_file() {
        let cfg = ServerConfig {
            cert_file: "".into(),
            ..ServerConfig::default()
        };
        match cfg.validate() {
            Err(ServeError::Configuration { field, .. }) => assert_eq!(field, "cert_file"),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_blank_key_file() {
        let cfg = ServerConfig {
            key_file: "   ".into(),
            ..ServerConfig::default()
        };
        match cfg.validate() {
            Err(ServeError::Configuration { field, .. }) => assert_eq!(field, "key_file"),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_drain_timeout() {
        let cfg = ServerConfig {
            drain_timeout_secs: 0,
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
