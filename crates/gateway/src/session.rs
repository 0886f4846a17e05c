// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque-token sessions binding an authenticated caller to a specific
//! [`Instance`], with a 30-minute idle TTL and a 5-minute sweeper.
//!
//! Grounded on the teacher's `credential/pkce.rs` random-token generation
//! (`rand::rng().fill(&mut bytes)`) adapted to hex encoding for a 256-bit
//! opaque session token, and on `MuxState::sessions`'s single-lock map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::info;

use crate::collaborators::TenantId;
use crate::instance::Instance;

pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub tenant_id: TenantId,
    pub instance: Arc<Instance>,
    pub created_at: Instant,
    pub last_access: Instant,
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn create(&self, tenant_id: TenantId, instance: Arc<Instance>) -> Session {
        let token = generate_token();
        let now = Instant::now();
        let session = Session { token: token.clone(), tenant_id, instance, created_at: now, last_access: now };
        self.sessions.write().await.insert(token, session.clone());
        session
    }

    /// Returns the session if the token is known, unexpired, and bound to
    /// `tenant_id`. A mismatch on tenant is treated identically to an
    /// unknown token (not-found, never forbidden) so session existence is
    /// never leaked across tenants.
    pub async fn resolve(&self, token: &str, tenant_id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get(token)?;
        if session.tenant_id != tenant_id {
            return None;
        }
        if session.last_access.elapsed() > SESSION_TTL {
            sessions.remove(token);
            return None;
        }
        let session = sessions.get_mut(token)?;
        session.last_access = Instant::now();
        Some(session.clone())
    }

    /// Removes the session and kills its bound instance. Returns whether a
    /// session was found for that tenant (so callers can distinguish
    /// "destroyed" from "not found/cross-tenant" without leaking existence).
    pub async fn destroy(&self, token: &str, tenant_id: &str) -> bool {
        let session = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(token) {
                Some(s) if s.tenant_id == tenant_id => sessions.remove(token),
                _ => None,
            }
        };
        match session {
            Some(session) => {
                session.instance.kill().await;
                true
            }
            None => false,
        }
    }

    /// Destroys every session whose last access is older than the TTL.
    pub async fn sweep(&self) {
        let expired: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.last_access.elapsed() > SESSION_TTL)
                .map(|(token, _)| token.clone())
                .collect()
        };
        if expired.is_empty() {
            return;
        }
        let mut sessions = self.sessions.write().await;
        for token in &expired {
            sessions.remove(token);
        }
        info!(count = expired.len(), "swept expired sessions");
    }

    /// Destroys every session, killing each bound instance. Invoked only
    /// during graceful shutdown.
    pub async fn destroy_all(&self) {
        let sessions: Vec<Session> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.instance.kill().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Spawns the periodic sweeper task.
pub fn spawn_sweeper(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            registry.sweep().await;
        }
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
