// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the MCP gateway.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::GatewayState;

/// Build the axum `Router`, mirroring the teacher's flat
/// `Router::new().route(...)` chain.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/mcp", post(http::mcp_post).get(http::mcp_get_not_allowed).delete(http::mcp_delete))
        .route("/healthz", get(http::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
