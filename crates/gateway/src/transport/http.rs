// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the MCP surface, grounded on the teacher's
//! `transport::http` style: one async function per route, `State` + header
//! extractors, `MuxError`-shaped mapping to a response at the boundary.

use std::convert::Infallible;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::Json;
use futures_util::stream;
use serde::Serialize;
use serde_json::Value;

use crate::jsonrpc::{JsonRpcResponse, RawMessage};
use crate::pipeline::{self, RateLimitInfo};
use crate::state::GatewayState;
use crate::transport::auth;

const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pool_size: usize,
    pub session_count: usize,
}

/// `GET /healthz` — ambient, unauthenticated.
pub async fn healthz(axum::extract::State(state): axum::extract::State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running",
        pool_size: state.pool.len().await,
        session_count: state.sessions.len().await,
    })
}

/// `GET /mcp` — reserved for server-to-client streaming, not implemented.
pub async fn mcp_get_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, [("allow", "POST, DELETE")])
}

/// `DELETE /mcp` — destroys the caller's session and kills its instance.
pub async fn mcp_delete(
    axum::extract::State(state): axum::extract::State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    let identity = match auth::authenticate(&state, &headers) {
        Ok(identity) => identity,
        Err(e) => return e.to_http_response(None).into_response(),
    };
    let Some(token) = session_header(&headers) else {
        return crate::error::GatewayError::InvalidRequest("missing Mcp-Session-Id header".into())
            .to_http_response(None)
            .into_response();
    };
    if state.sessions.destroy(token, &identity.tenant_id).await {
        StatusCode::OK.into_response()
    } else {
        crate::error::GatewayError::SessionNotFound.to_http_response(None).into_response()
    }
}

/// `POST /mcp` — the entire MCP-over-HTTP surface: auth, body decoding,
/// initialize-vs-bound-session dispatch, batch splitting, and response
/// shaping (plain JSON, a JSON array, or SSE per the caller's `Accept`).
pub async fn mcp_post(
    axum::extract::State(state): axum::extract::State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Json<Value>,
) -> Response {
    let identity = match auth::authenticate(&state, &headers) {
        Ok(identity) => identity,
        Err(e) => return e.to_http_response(None).into_response(),
    };

    let (messages, is_batch) = match decode_body(body.0) {
        Ok(parsed) => parsed,
        Err(_) => {
            return crate::error::GatewayError::ParseError("request body is not a JSON-RPC message".into())
                .to_http_response(None)
                .into_response();
        }
    };

    if messages.len() == 1 && messages[0].method.as_deref() == Some("initialize") {
        return handle_initialize_request(&state, &identity, &messages[0]).await;
    }

    let token = session_header(&headers);
    let session = match pipeline::resolve_session(&state, &identity, token).await {
        Ok(session) => session,
        Err(e) => return e.to_http_response(None).into_response(),
    };

    let wants_sse = accepts_event_stream(&headers);
    let mut responses = Vec::new();
    let mut rate_limits = Vec::new();

    for message in messages {
        if message.is_notification() {
            let method = message.method.clone().unwrap_or_default();
            pipeline::handle_notification(&session, &method, message.params.clone()).await;
            continue;
        }
        let Some(id) = message.id.clone() else { continue };
        let method = message.method.clone().unwrap_or_default();
        let (response, rate_limit) =
            pipeline::handle_request(&state, &identity, &session, id, method, message.params.clone()).await;
        responses.push(response);
        if let Some(info) = rate_limit {
            rate_limits.push(info);
        }
    }

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    let mut out = if wants_sse {
        responses_as_sse(responses).into_response()
    } else if is_batch {
        Json(responses).into_response()
    } else {
        Json(responses.into_iter().next()).into_response()
    };

    if let Some(info) = rate_limits.last() {
        apply_rate_limit_headers(out.headers_mut(), info);
    }
    out
}

async fn handle_initialize_request(state: &GatewayState, identity: &crate::collaborators::TenantIdentity, message: &RawMessage) -> Response {
    let Some(id) = message.id.clone() else {
        return crate::error::GatewayError::InvalidRequest("initialize must carry an id".into())
            .to_http_response(None)
            .into_response();
    };
    match pipeline::handle_initialize(state, identity, id).await {
        Ok(outcome) => {
            let mut response = Json(outcome.response).into_response();
            if let Ok(value) = outcome.session.token.parse() {
                response.headers_mut().insert(SESSION_HEADER, value);
            }
            response
        }
        Err(e) => e.to_http_response(None).into_response(),
    }
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers.get("accept").and_then(|v| v.to_str().ok()).is_some_and(|v| v.contains("text/event-stream"))
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    let (limit, remaining, used) = match info.limit {
        Some(limit) => (limit as i64, (limit as i64 - info.used as i64).max(0), info.used as i64),
        None => (-1, -1, -1),
    };
    for (name, value) in [
        ("x-ratelimit-limit", limit),
        ("x-ratelimit-remaining", remaining),
        ("x-ratelimit-used", used),
    ] {
        if let Ok(value) = value.to_string().parse() {
            headers.insert(name, value);
        }
    }
}

fn decode_body(value: Value) -> Result<(Vec<RawMessage>, bool), serde_json::Error> {
    if let Value::Array(items) = value {
        let messages = items.into_iter().map(serde_json::from_value).collect::<Result<Vec<RawMessage>, _>>()?;
        Ok((messages, true))
    } else {
        Ok((vec![serde_json::from_value(value)?], false))
    }
}

fn responses_as_sse(responses: Vec<JsonRpcResponse>) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let events = responses.into_iter().map(|response| {
        let data = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_owned());
        Ok(Event::default().event("message").data(data))
    });
    Sse::new(stream::iter(events)).keep_alive(KeepAlive::default())
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
