//! Structured logging, with optional span export over OTLP.
//!
//! # Telemetry invariants
//!
//! - Key material and request bodies never appear in span attributes or log
//!   fields. The one exception is the truncated body of a refused 500
//!   response, which is logged so the fault can be diagnosed server-side.
//! - Log level is configurable via `RPCGW_LOG_LEVEL` (default: `info`);
//!   `RUST_LOG` wins when set.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
