// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request pipeline: authenticate → session resolution → quota →
//! instance forwarding → usage logging → response shaping.
//!
//! One async function per concern, explicit state extraction, mapped to an
//! HTTP response at the transport boundary — the teacher's
//! `transport::http` handler style (`register_session`, `proxy_post`),
//! generalized from raw proxy passthrough to JSON-RPC envelopes.

use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::collaborators::{TenantIdentity, UsageOutcome, UsageRecord};
use crate::error::GatewayError;
use crate::jsonrpc::{JsonRpcResponse, RequestId};
use crate::session::Session;
use crate::state::GatewayState;

pub const GATEWAY_SERVER_NAME: &str = "seomcp-proxy";
pub const GATEWAY_PROTOCOL_VERSION: &str = "2024-11-05";

/// Quota state at the moment a `tools/call` was admitted or denied, carried
/// back to the transport layer so it can set the `X-RateLimit-*` headers
/// without re-deriving them.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub used: u64,
}

/// Result of handling the `initialize` request: a freshly created session
/// plus the gateway's own reply (not the child's — the gateway advertises
/// its own server identity, per the design's chosen protocol-version split).
pub struct InitializeOutcome {
    pub session: Session,
    pub response: JsonRpcResponse,
}

pub async fn handle_initialize(
    state: &GatewayState,
    identity: &TenantIdentity,
    id: RequestId,
) -> Result<InitializeOutcome, GatewayError> {
    let command = state.child_command(&identity.tenant_id).map_err(|e| GatewayError::Internal(e.to_string()))?;
    let instance = state.pool.acquire(&identity.tenant_id, command).await;

    // Drive the handshake now rather than lazily on first tool call, so a
    // broken child is surfaced to the caller at initialize time.
    instance.ensure_ready().await.map_err(GatewayError::from)?;

    let session = state.sessions.create(identity.tenant_id.clone(), instance).await;
    let response = JsonRpcResponse::success(
        id,
        serde_json::json!({
            "protocolVersion": GATEWAY_PROTOCOL_VERSION,
            "serverInfo": {"name": GATEWAY_SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {"tools": {}},
        }),
    );
    Ok(InitializeOutcome { session, response })
}

pub async fn resolve_session(
    state: &GatewayState,
    identity: &TenantIdentity,
    token: Option<&str>,
) -> Result<Session, GatewayError> {
    let token = token.ok_or_else(|| GatewayError::InvalidRequest("missing Mcp-Session-Id header".into()))?;
    state.sessions.resolve(token, &identity.tenant_id).await.ok_or(GatewayError::SessionNotFound)
}

/// Handles one JSON-RPC request (has an `id`) against an already-resolved
/// session: scope check, quota check (for `tools/call`), forwarding, and
/// usage logging.
pub async fn handle_request(
    state: &GatewayState,
    identity: &TenantIdentity,
    session: &Session,
    id: RequestId,
    method: String,
    params: Value,
) -> (JsonRpcResponse, Option<RateLimitInfo>) {
    if method == "tools/call" {
        return handle_tool_call(state, identity, session, id, method, params).await;
    }

    let response = match session.instance.send(id.clone(), &method, params).await {
        Ok(value) => response_from_child_value(id, value),
        Err(e) => JsonRpcResponse::failure(id, GatewayError::from(e).to_jsonrpc_error()),
    };
    (response, None)
}

async fn handle_tool_call(
    state: &GatewayState,
    identity: &TenantIdentity,
    session: &Session,
    id: RequestId,
    method: String,
    params: Value,
) -> (JsonRpcResponse, Option<RateLimitInfo>) {
    let tool_name = params.get("name").and_then(Value::as_str).unwrap_or_default().to_owned();

    if !identity.scope_allows(&tool_name) {
        let response = JsonRpcResponse::failure(
            id,
            GatewayError::MethodNotFound(format!("tools/call:{tool_name}")).to_jsonrpc_error(),
        );
        return (response, None);
    }

    let now = Utc::now();
    let decision = state.quota.check(&identity.tenant_id, identity.plan, identity.verified, now);
    let rate_limit = RateLimitInfo { limit: decision.limit, used: decision.used };
    if !decision.allowed {
        // `allowed == false` only ever comes from the finite-limit branch of
        // `QuotaAccountant::check`, so `limit` is always `Some` here; the
        // fallback just avoids an unwrap for a case that cannot occur.
        let limit = decision.limit.unwrap_or(decision.used);
        record_usage(state, identity, &tool_name, UsageOutcome::QuotaExhausted, 0, now);
        let response = JsonRpcResponse::failure(
            id,
            GatewayError::RateLimited { used: decision.used, limit, plan: identity.plan.as_str() }.to_jsonrpc_error(),
        );
        return (response, Some(rate_limit));
    }

    let started = Instant::now();
    let outcome = session.instance.send(id.clone(), &method, params).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let response = match outcome {
        Ok(value) => {
            let usage_outcome = if value.get("error").is_some() { UsageOutcome::Error } else { UsageOutcome::Success };
            record_usage(state, identity, &tool_name, usage_outcome, duration_ms, now);
            response_from_child_value(id, value)
        }
        Err(e) => {
            record_usage(state, identity, &tool_name, UsageOutcome::Error, duration_ms, now);
            JsonRpcResponse::failure(id, GatewayError::from(e).to_jsonrpc_error())
        }
    };
    (response, Some(rate_limit))
}

fn record_usage(
    state: &GatewayState,
    identity: &TenantIdentity,
    tool_name: &str,
    outcome: UsageOutcome,
    duration_ms: u64,
    timestamp: chrono::DateTime<Utc>,
) {
    state.usage_log.append(UsageRecord {
        tenant_id: identity.tenant_id.clone(),
        credential_id: identity.credential_id.clone(),
        tool_name: tool_name.to_owned(),
        outcome,
        duration_ms,
        timestamp,
    });
}

/// Forwards a notification (no `id`) to the child; never produces a
/// response entry.
pub async fn handle_notification(session: &Session, method: &str, params: Value) {
    if let Err(e) = session.instance.notify(method, params).await {
        warn!(method, err = %e, "failed to forward notification to child");
    }
}

/// A child's response object already carries its own `id`/`result`/`error`
/// shape (mirrored by [`crate::jsonrpc::ChildResponse`]); re-wrap it so the
/// envelope the caller sees is unambiguous even if the child sent something
/// malformed.
fn response_from_child_value(id: RequestId, value: Value) -> JsonRpcResponse {
    if let Some(error) = value.get("error") {
        if let Ok(error) = serde_json::from_value(error.clone()) {
            return JsonRpcResponse::failure(id, error);
        }
    }
    let result = value.get("result").cloned().unwrap_or(Value::Null);
    info!(method_id = %id, "forwarded tool response");
    JsonRpcResponse::success(id, result)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
