//! Command-line interface.

use clap::{Args, Parser, Subcommand};
use rpcgw::ServerConfig;

/// Echo service over gRPC and JSON on one TLS port.
#[derive(Debug, Parser)]
#[command(name = "echo", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the echo server.
    Serve(ServeArgs),
    /// Send one Echo call to a running server.
    Send(SendArgs),
}

/// Flags for `serve`. Unset flags keep the value from the environment.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Listen address.
    #[arg(short, long)]
    pub address: Option<String>,

    /// Don't log API calls.
    #[arg(long)]
    pub no_api_log: bool,

    /// Private key file.
    #[arg(long)]
    pub key: Option<String>,

    /// Certificate file.
    #[arg(long)]
    pub cert: Option<String>,

    /// Directory of API description documents.
    #[arg(long)]
    pub swagger_dir: Option<String>,
}

impl ServeArgs {
    /// Override `config` with the flags that were given.
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(key) = self.key {
            config.key_file = key;
        }
        if let Some(cert) = self.cert {
            config.cert_file = cert;
        }
        if let Some(dir) = self.swagger_dir {
            config.swagger_dir = dir;
        }
        config.no_api_log |= self.no_api_log;
    }
}

/// Flags for `send`.
#[derive(Debug, Args)]
pub struct SendArgs {
    /// Server address.
    #[arg(short, long, default_value = "localhost:10000")]
    pub address: String,

    /// Certificate file the server presents; trusted as the only root.
    #[arg(long, default_value = "certs/server.pem")]
    pub cert: String,

    /// Value to echo.
    pub value: String,
}
