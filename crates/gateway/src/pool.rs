// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant-keyed map of at most one live [`Instance`] each, with guarded
//! lazy construction so concurrent acquires for the same tenant never
//! double-spawn.
//!
//! Grounded on the teacher's single-lock-protected `MuxState::sessions` map
//! and its stale-entry eviction on re-registration
//! (`transport/http.rs::register_session`), generalized from "one entry per
//! session id" to "one entry per tenant."

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::info;

use crate::instance::{ChildCommand, Instance, InstanceConfig};

pub struct PoolConfig {
    pub call_timeout: Duration,
    pub idle_timeout: Duration,
    pub protocol_version: String,
}

/// Map from tenant id to at most one live `Instance`. A freshly-acquired
/// `Instance` is inserted before it has spawned anything; a background
/// reaper task removes it from the map once it reaches its terminal dead
/// state, whether that happens via idle eviction, crash, or drain.
pub struct Pool {
    instances: RwLock<HashMap<String, Arc<Instance>>>,
    config: PoolConfig,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self { instances: RwLock::new(HashMap::new()), config })
    }

    /// Returns the tenant's live instance, constructing one if absent.
    /// Concurrent callers for the same tenant observe the same instance;
    /// callers for different tenants never contend on each other.
    pub async fn acquire(self: &Arc<Self>, tenant_id: &str, command: ChildCommand) -> Arc<Instance> {
        if let Some(existing) = self.instances.read().await.get(tenant_id) {
            if !existing.is_dead() {
                return existing.clone();
            }
        }

        let mut instances = self.instances.write().await;
        if let Some(existing) = instances.get(tenant_id) {
            if !existing.is_dead() {
                return existing.clone();
            }
        }

        let instance = Instance::new(InstanceConfig {
            tenant_id: tenant_id.to_owned(),
            command,
            call_timeout: self.config.call_timeout,
            idle_timeout: self.config.idle_timeout,
            protocol_version: self.config.protocol_version.clone(),
        });
        instances.insert(tenant_id.to_owned(), instance.clone());
        drop(instances);

        self.spawn_reaper(tenant_id.to_owned(), instance.clone());
        instance
    }

    fn spawn_reaper(self: &Arc<Self>, tenant_id: String, instance: Arc<Instance>) {
        let pool = self.clone();
        tokio::spawn(async move {
            instance.wait_terminal().await;
            pool.remove_if_current(&tenant_id, &instance).await;
        });
    }

    /// Removes the map entry for `tenant_id` only if it still points at
    /// `instance` — guards against racing a replacement instance that was
    /// acquired after this one died.
    async fn remove_if_current(&self, tenant_id: &str, instance: &Arc<Instance>) {
        let mut instances = self.instances.write().await;
        if let Some(current) = instances.get(tenant_id) {
            if Arc::ptr_eq(current, instance) {
                instances.remove(tenant_id);
                info!(tenant_id, "removed dead instance from pool");
            }
        }
    }

    /// Kills every live instance and clears the map. Invoked only during
    /// graceful shutdown.
    pub async fn drain_all(&self) {
        let instances: Vec<Arc<Instance>> = {
            let mut map = self.instances.write().await;
            map.drain().map(|(_, instance)| instance).collect()
        };
        for instance in instances {
            instance.kill().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
