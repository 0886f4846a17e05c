// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC 2.0 envelope types shared by the child-facing [`crate::instance`]
//! transport and the client-facing [`crate::transport`] surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC id: either a string or a number on the wire, never both at
/// once. Kept distinct from `Value` so it can be used as a pending-table key
/// without reaching into the full message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A message read off the wire before its shape (request, notification, or
/// response) has been decided. `id` is absent for notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
}

impl RawMessage {
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0", id, method: method.into(), params }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: "2.0", method: method.into(), params }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response the gateway returns to a caller: either the child's own
/// `result`/`error` passed through unchanged, or one synthesized locally.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Result { result: Value },
    Error { error: JsonRpcError },
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, payload: Payload::Result { result } }
    }

    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0", id, payload: Payload::Error { error } }
    }
}

/// Splits a decoded child message into `(id, result-or-error)`, as read off
/// the child's stdout. Child responses always carry an id; notifications
/// emitted by the child (e.g. progress) are not routed through this path.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}
