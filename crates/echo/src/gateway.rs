//! JSON routes for the echo service. Each route calls the RPC engine through
//! the gateway's loopback channel.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use rpcgw::engine::gateway::status_response;
use tonic::transport::Channel;

use crate::{proto::EchoMessage, service::EchoClient};

/// `POST` a JSON [`EchoMessage`], get it back.
pub const ECHO_ROUTE: &str = "/v1/example/echo";

/// Router for all echo gateway routes.
pub fn routes(channel: Channel) -> Router {
    Router::new()
        .route(ECHO_ROUTE, post(echo))
        .with_state(EchoClient::new(channel))
}

async fn echo(State(mut client): State<EchoClient>, Json(msg): Json<EchoMessage>) -> Response {
    match client.echo(msg).await {
        Ok(resp) => Json(resp.into_inner()).into_response(),
        Err(status) => status_response(&status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use rpcgw::DialCredentials;

    fn unreachable_channel() -> Channel {
        let pem = std::fs::read(format!("{}/../../certs/server.pem", env!("CARGO_MANIFEST_DIR")))
            .unwrap();
        // Port 1 on loopback: nothing listens there.
        DialCredentials::from_pem(&pem, "localhost")
            .channel("localhost:1")
            .unwrap()
    }

    #[tokio::test]
    async fn unreachable_backend_is_json_server_error() {
        rpcgw::credentials::install_crypto_provider();
        let server = TestServer::new(routes(unreachable_channel())).unwrap();

        let resp = server
            .post(ECHO_ROUTE)
            .json(&serde_json::json!({ "value": "hi" }))
            .await;
        assert!(resp.status_code().is_server_error(), "{}", resp.status_code());
        let body: serde_json::Value = resp.json();
        assert!(body["code"].is_string());
    }

    #[tokio::test]
    async fn malformed_json_is_client_error() {
        rpcgw::credentials::install_crypto_provider();
        let server = TestServer::new(routes(unreachable_channel())).unwrap();

        let resp = server
            .post(ECHO_ROUTE)
            .content_type("application/json")
            .text("{not json")
            .await;
        assert!(resp.status_code().is_client_error(), "{}", resp.status_code());
    }
}
