// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state threaded through every axum handler, in the
//! shape of the teacher's `MuxState`.

use std::sync::Arc;

use crate::collaborators::{ConfigProducer, CredentialStore, UsageLog};
use crate::config::GatewayConfig;
use crate::instance::ChildCommand;
use crate::pool::{Pool, PoolConfig};
use crate::quota::QuotaAccountant;
use crate::session::SessionRegistry;

pub struct GatewayState {
    pub pool: Arc<Pool>,
    pub sessions: Arc<SessionRegistry>,
    pub quota: Arc<QuotaAccountant>,
    pub credentials: Arc<dyn CredentialStore>,
    pub usage_log: Arc<dyn UsageLog>,
    pub config_producer: Arc<dyn ConfigProducer>,
    pub config: GatewayConfig,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        credentials: Arc<dyn CredentialStore>,
        usage_log: Arc<dyn UsageLog>,
        config_producer: Arc<dyn ConfigProducer>,
    ) -> Arc<Self> {
        let pool = Pool::new(PoolConfig {
            call_timeout: config.call_timeout(),
            idle_timeout: config.idle_timeout(),
            protocol_version: config.child_protocol_version.clone(),
        });
        let quota = Arc::new(QuotaAccountant::new(usage_log.clone()));
        Arc::new(Self {
            pool,
            sessions: SessionRegistry::new(),
            quota,
            credentials,
            usage_log,
            config_producer,
            config,
        })
    }

    /// Builds the `ChildCommand` for `tenant_id`, resolving its config path
    /// through the config-producer collaborator.
    pub fn child_command(&self, tenant_id: &str) -> std::io::Result<ChildCommand> {
        let config_path = self.config_producer.config_path(tenant_id)?;
        Ok(ChildCommand {
            program: self.config.child_command.clone(),
            args: self.config.child_args.clone(),
            config_env_var: self.config.child_config_env_var.clone(),
            config_path,
        })
    }

    /// Kills every instance and session ahead of a graceful shutdown.
    pub async fn drain(&self) {
        self.sessions.destroy_all().await;
        self.pool.drain_all().await;
    }
}
