//! The contract between the server and the service it exposes.

use async_trait::async_trait;
use common::RegistrationError;
use tokio_util::sync::CancellationToken;

use crate::engine::{
    gateway::{DialCredentials, GatewayMux},
    RpcEngine,
};

/// A service exposed through both engines.
///
/// The same instance is attached to the RPC engine first and then to the
/// gateway. Both calls happen once per [`crate::Server::serve`] run, before
/// the listener is bound.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegisteredService: Send + Sync {
    /// Register the service's tonic handlers.
    fn attach_rpc(&self, engine: &mut RpcEngine);

    /// Register the service's HTTP routes.
    ///
    /// `endpoint` is the `host:port` the gateway must dial to reach the RPC
    /// engine and `credentials` the TLS material to dial with. `shutdown`
    /// fires when the server starts draining; anything spawned here should
    /// stop with it.
    async fn attach_gateway(
        &self,
        shutdown: &CancellationToken,
        gateway: &mut GatewayMux,
        endpoint: &str,
        credentials: &DialCredentials,
    ) -> Result<(), RegistrationError>;
}
