// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three collaborator seams named out of scope by the core design:
//! credential verification, usage logging, and per-tenant configuration.
//!
//! Each trait is the real contract the core modules consume; the
//! implementations here are in-memory demo stand-ins, not the production
//! credential service, store, or config pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quota::Plan;

pub type TenantId = String;
pub type CredentialId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantIdentity {
    pub tenant_id: TenantId,
    pub credential_id: CredentialId,
    pub plan: Plan,
    pub verified: bool,
    /// Tool names this credential may invoke. Empty means unrestricted.
    pub scopes: Vec<String>,
}

impl TenantIdentity {
    pub fn scope_allows(&self, tool: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| s == tool)
    }
}

/// Resolves a bearer credential to a tenant identity.
pub trait CredentialStore: Send + Sync {
    fn resolve(&self, bearer: &str) -> Option<TenantIdentity>;
}

/// One seeded account, as loaded from the backing JSON file.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SeededAccount {
    bearer: String,
    tenant_id: String,
    credential_id: String,
    plan: Plan,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    scopes: Vec<String>,
}

/// In-memory credential store seeded from a JSON document:
/// `[{"bearer": "...", "tenant_id": "...", "credential_id": "...", "plan": "pro", "verified": true, "scopes": []}, ...]`
///
/// Grounded on the teacher's `CredentialConfig`/`AccountConfig` shape
/// (`crates/mux/src/credential/mod.rs`): a small env/file-seeded table keyed
/// by a bearer-like string, with plan/verification as plain fields rather
/// than a live lookup.
pub struct StaticCredentialStore {
    by_bearer: HashMap<String, TenantIdentity>,
}

impl StaticCredentialStore {
    pub(crate) fn from_accounts(accounts: Vec<SeededAccount>) -> Self {
        let by_bearer = accounts
            .into_iter()
            .map(|a| {
                (
                    a.bearer,
                    TenantIdentity {
                        tenant_id: a.tenant_id,
                        credential_id: a.credential_id,
                        plan: a.plan,
                        verified: a.verified,
                        scopes: a.scopes,
                    },
                )
            })
            .collect();
        Self { by_bearer }
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let accounts: Vec<SeededAccount> = serde_json::from_str(&text)?;
        Ok(Self::from_accounts(accounts))
    }

    #[cfg(test)]
    pub fn single(bearer: &str, identity: TenantIdentity) -> Self {
        let mut by_bearer = HashMap::new();
        by_bearer.insert(bearer.to_owned(), identity);
        Self { by_bearer }
    }
}

impl CredentialStore for StaticCredentialStore {
    fn resolve(&self, bearer: &str) -> Option<TenantIdentity> {
        self.by_bearer.get(bearer).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOutcome {
    Success,
    Error,
    QuotaExhausted,
}

impl UsageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::QuotaExhausted => "quota-exhausted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub tenant_id: TenantId,
    pub credential_id: CredentialId,
    pub tool_name: String,
    pub outcome: UsageOutcome,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log of tool-call attempts; the quota accountant's source of
/// truth (no materialized counter, per the core design's stated trade-off).
pub trait UsageLog: Send + Sync {
    fn append(&self, record: UsageRecord);
    fn count_since(&self, tenant_id: &str, since: DateTime<Utc>) -> u64;
}

#[derive(Default)]
pub struct InMemoryUsageLog {
    rows: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageLog for InMemoryUsageLog {
    fn append(&self, record: UsageRecord) {
        let mut rows = self.rows.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        rows.push(record);
    }

    fn count_since(&self, tenant_id: &str, since: DateTime<Utc>) -> u64 {
        let rows = self.rows.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        rows.iter().filter(|r| r.tenant_id == tenant_id && r.timestamp >= since).count() as u64
    }
}

/// Resolves a per-tenant configuration document path to hand to the child.
pub trait ConfigProducer: Send + Sync {
    fn config_path(&self, tenant_id: &str) -> std::io::Result<PathBuf>;
}

/// Writes `<base_dir>/<tenant_id>.json`, creating a minimal default document
/// the first time a tenant is seen.
pub struct DirConfigProducer {
    base_dir: PathBuf,
}

impl DirConfigProducer {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

impl ConfigProducer for DirConfigProducer {
    fn config_path(&self, tenant_id: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.base_dir.join(format!("{tenant_id}.json"));
        if !path.exists() {
            std::fs::write(&path, serde_json::to_vec_pretty(&DefaultTenantConfig::default())?)?;
        }
        Ok(path)
    }
}

#[derive(Debug, Serialize, Default)]
struct DefaultTenantConfig {
    tenant_id_overrides: HashMap<String, String>,
}

#[cfg(test)]
#[path = "collaborators_tests.rs"]
mod tests;
