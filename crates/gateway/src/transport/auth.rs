// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer extraction and per-request credential resolution.
//!
//! Unlike the teacher's single shared auth token checked by constant-time
//! comparison, every request here carries its own bearer which is resolved
//! against the [`crate::collaborators::CredentialStore`] collaborator to a
//! full [`TenantIdentity`] — there is no single gateway-wide secret.

use axum::http::HeaderMap;

use crate::collaborators::TenantIdentity;
use crate::error::GatewayError;
use crate::state::GatewayState;

/// Extracts the bearer token from `Authorization: Bearer <token>` and
/// resolves it to a tenant identity. `Unauthorized` covers a missing header,
/// a malformed scheme, and an unknown or revoked credential alike — the
/// collaborator does not distinguish "unknown" from "revoked".
pub fn authenticate(state: &GatewayState, headers: &HeaderMap) -> Result<TenantIdentity, GatewayError> {
    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(GatewayError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(GatewayError::Unauthorized)?;
    state.credentials.resolve(token).ok_or(GatewayError::Unauthorized)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
