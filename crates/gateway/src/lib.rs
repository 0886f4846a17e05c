// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mcpgate: a multi-tenant gateway fronting per-tenant MCP child processes.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod framer;
pub mod instance;
pub mod jsonrpc;
pub mod pipeline;
pub mod pool;
pub mod quota;
pub mod session;
pub mod state;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collaborators::{ConfigProducer, CredentialStore, DirConfigProducer, InMemoryUsageLog, StaticCredentialStore};
use crate::config::GatewayConfig;
use crate::state::GatewayState;
use crate::transport::build_router;

/// Runs the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let credentials: Arc<dyn CredentialStore> = match &config.credentials_file {
        Some(path) => Arc::new(StaticCredentialStore::load_from_file(path)?),
        None => Arc::new(StaticCredentialStore::from_accounts(Vec::new())),
    };
    let usage_log = Arc::new(InMemoryUsageLog::new());
    let config_producer: Arc<dyn ConfigProducer> = Arc::new(DirConfigProducer::new(config.config_dir.clone()));

    let state = GatewayState::new(config, credentials, usage_log, config_producer);
    let session_sweeper = session::spawn_sweeper(state.sessions.clone());

    spawn_signal_handler(shutdown.clone());

    info!("mcpgate listening on {addr}");
    let router = build_router(state.clone());
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    session_sweeper.abort();
    state.drain().await;
    Ok(())
}

/// Installs a SIGTERM/SIGINT handler that cancels `shutdown` on the first
/// signal and force-exits on the second, in the teacher's shutdown style.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGTERM"),
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGINT"),
        }
        shutdown.cancel();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGTERM again, forcing exit"),
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => info!("received SIGINT again, forcing exit"),
        }
        std::process::exit(130);
    });
}
