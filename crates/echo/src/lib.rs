//! Example service: echoes a message back, over gRPC and over the JSON
//! gateway.

pub mod cli;
pub mod gateway;
pub mod proto;
pub mod service;

use std::sync::Arc;

use async_trait::async_trait;
use common::RegistrationError;
use rpcgw::{DialCredentials, GatewayMux, RegisteredService, RpcEngine};
use tokio_util::sync::CancellationToken;

use service::{EchoServer, EchoService};

/// [`EchoService`] wired into both rpcgw engines.
#[derive(Debug, Clone, Default)]
pub struct Echo {
    service: Arc<EchoService>,
}

#[async_trait]
impl RegisteredService for Echo {
    fn attach_rpc(&self, engine: &mut RpcEngine) {
        engine.add_service(EchoServer::from_arc(Arc::clone(&self.service)));
    }

    async fn attach_gateway(
        &self,
        _shutdown: &CancellationToken,
        gateway: &mut GatewayMux,
        endpoint: &str,
        credentials: &DialCredentials,
    ) -> Result<(), RegistrationError> {
        let channel = credentials.channel(endpoint)?;
        gateway.merge(gateway::routes(channel));
        Ok(())
    }
}
