// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::instance::InstanceError;
use crate::jsonrpc::{JsonRpcError, RequestId};

/// Reserved JSON-RPC error codes this gateway emits, outside the standard
/// parse/invalid-request/method-not-found/invalid-params range.
pub mod code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const RATE_LIMITED: i64 = -32001;
    pub const INSTANCE_ERROR: i64 = -32002;
    pub const INTERNAL: i64 = -32003;
}

/// Top-level gateway error, mapped to an HTTP status at the transport
/// boundary and, where applicable, to a JSON-RPC error object.
#[derive(Debug)]
pub enum GatewayError {
    Unauthorized,
    ParseError(String),
    InvalidRequest(String),
    SessionNotFound,
    MethodNotFound(String),
    RateLimited { used: u64, limit: u64, plan: &'static str },
    Instance(InstanceError),
    Upstream(Value),
    Internal(String),
}

impl GatewayError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ParseError(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::MethodNotFound(_)
            | Self::RateLimited { .. }
            | Self::Instance(_)
            | Self::Upstream(_) => StatusCode::OK,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a JSON-RPC error object for a request that carried an id.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            Self::Unauthorized => {
                JsonRpcError { code: code::INVALID_REQUEST, message: "unauthorized".into(), data: None }
            }
            Self::ParseError(msg) => {
                JsonRpcError { code: code::PARSE_ERROR, message: msg.clone(), data: None }
            }
            Self::InvalidRequest(msg) => {
                JsonRpcError { code: code::INVALID_REQUEST, message: msg.clone(), data: None }
            }
            Self::SessionNotFound => {
                JsonRpcError { code: code::INVALID_REQUEST, message: "session not found".into(), data: None }
            }
            Self::MethodNotFound(method) => JsonRpcError {
                code: code::METHOD_NOT_FOUND,
                message: format!("method not found: {}", truncate(method, 80)),
                data: None,
            },
            Self::RateLimited { used, limit, plan } => JsonRpcError {
                code: code::RATE_LIMITED,
                message: "monthly call quota exhausted".into(),
                data: Some(serde_json::json!({"used": used, "limit": limit, "plan": plan})),
            },
            Self::Instance(e) => {
                JsonRpcError { code: code::INSTANCE_ERROR, message: e.to_string(), data: None }
            }
            Self::Upstream(value) => serde_json::from_value(value.clone()).unwrap_or(JsonRpcError {
                code: code::INTERNAL,
                message: "malformed upstream error".into(),
                data: None,
            }),
            Self::Internal(msg) => {
                JsonRpcError { code: code::INTERNAL, message: msg.clone(), data: None }
            }
        }
    }

    /// Render as a standalone HTTP error body, for failures that never reach
    /// JSON-RPC framing (auth, missing session header, unknown session).
    pub fn to_http_response(&self, id: Option<RequestId>) -> (StatusCode, Json<ErrorBody>) {
        let body = ErrorBody {
            jsonrpc: "2.0",
            id,
            error: self.to_jsonrpc_error(),
        };
        (self.http_status(), Json(body))
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_jsonrpc_error().message)
    }
}

impl std::error::Error for GatewayError {}

impl From<InstanceError> for GatewayError {
    fn from(e: InstanceError) -> Self {
        Self::Instance(e)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub error: JsonRpcError,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
