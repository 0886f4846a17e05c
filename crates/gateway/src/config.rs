// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the mcpgate process.
#[derive(Debug, Clone, clap::Parser)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "MCPGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8900, env = "MCPGATE_PORT")]
    pub port: u16,

    /// Per-call timeout (milliseconds) waiting for a child's response.
    #[arg(long, default_value_t = 60_000, env = "MCPGATE_CALL_TIMEOUT_MS")]
    pub call_timeout_ms: u64,

    /// Idle timeout (milliseconds) before an unused instance evicts itself.
    #[arg(long, default_value_t = 600_000, env = "MCPGATE_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    /// Program the gateway spawns as each tenant's MCP child.
    #[arg(long, env = "MCPGATE_CHILD_COMMAND")]
    pub child_command: String,

    /// Extra arguments passed to the child command, space-separated.
    #[arg(long, env = "MCPGATE_CHILD_ARGS", value_delimiter = ' ')]
    pub child_args: Vec<String>,

    /// Environment variable the child reads its per-tenant config path from.
    #[arg(long, default_value = "MCP_CHILD_CONFIG", env = "MCPGATE_CHILD_CONFIG_ENV_VAR")]
    pub child_config_env_var: String,

    /// Protocol version advertised to the child during the inward handshake.
    #[arg(long, default_value = "2025-03-26", env = "MCPGATE_CHILD_PROTOCOL_VERSION")]
    pub child_protocol_version: String,

    /// Path to the JSON file seeding the static demo credential store.
    #[arg(long, env = "MCPGATE_CREDENTIALS_FILE")]
    pub credentials_file: Option<std::path::PathBuf>,

    /// Base directory for per-tenant child config documents.
    #[arg(long, default_value = "./mcpgate-tenant-configs", env = "MCPGATE_CONFIG_DIR")]
    pub config_dir: std::path::PathBuf,
}

impl GatewayConfig {
    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.call_timeout_ms)
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.idle_timeout_ms)
    }
}
