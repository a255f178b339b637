//! `echo`: binary entry point.
//!
//! `echo serve` startup sequence:
//! 1. Load [`ServerConfig`] from the environment and apply flag overrides.
//! 2. Initialise tracing (plus OTLP export when configured).
//! 3. Arm SIGINT/SIGTERM to cancel the shutdown token.
//! 4. Serve until cancelled.
//!
//! `echo send` dials a running server and prints the echoed message as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use echo::{
    cli::{Cli, Command, SendArgs, ServeArgs},
    proto::EchoMessage,
    service::EchoClient,
    Echo,
};
use rpcgw::{credentials, engine::gateway::DialTarget, telemetry, DialCredentials, Server, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Send(args) => send(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut cfg = ServerConfig::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;
    args.apply(&mut cfg);

    telemetry::init_telemetry("echo", cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %cfg.address,
        "echo starting"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let result = Server::new(cfg, Arc::new(Echo::default()))
        .serve(shutdown)
        .await;
    telemetry::shutdown_telemetry();
    result.context("server failed")
}

async fn send(args: SendArgs) -> Result<()> {
    credentials::install_crypto_provider();

    let pem = std::fs::read(&args.cert)
        .with_context(|| format!("failed to read certificate file {}", args.cert))?;
    let target = DialTarget::from_listen_address(&args.address)?;
    let channel = DialCredentials::from_pem(&pem, target.domain)
        .channel(&target.authority)
        .with_context(|| format!("cannot dial {}", args.address))?;

    let reply = EchoClient::new(channel)
        .echo(EchoMessage::new(args.value))
        .await
        .context("Echo call failed")?;
    println!("{}", serde_json::to_string(reply.get_ref())?);
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}
