// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `mcpgate` binary as a subprocess, fronting the
//! `mock-mcp-child` test double, and exercises it over HTTP.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde_json::Value;

/// Resolve the path to a compiled workspace binary.
fn workspace_binary(name: &str) -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join(name)
}

pub fn mcpgate_binary() -> PathBuf {
    workspace_binary("mcpgate")
}

pub fn mock_child_binary() -> PathBuf {
    workspace_binary("mock-mcp-child")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// One seeded bearer credential, written to the gateway's credentials file.
pub struct Account {
    pub bearer: String,
    pub tenant_id: String,
    pub plan: String,
    pub verified: bool,
}

impl Account {
    pub fn new(bearer: &str, tenant_id: &str, plan: &str, verified: bool) -> Self {
        Self { bearer: bearer.to_owned(), tenant_id: tenant_id.to_owned(), plan: plan.to_owned(), verified }
    }
}

/// Builder for configuring and spawning a [`GatewayProcess`].
pub struct GatewayBuilder {
    accounts: Vec<Account>,
    extra_child_args: Vec<String>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self { accounts: vec![Account::new("test-bearer", "tenant-a", "pro", true)], extra_child_args: Vec::new() }
    }
}

impl GatewayBuilder {
    pub fn accounts(mut self, accounts: Vec<Account>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn child_args(mut self, args: Vec<String>) -> Self {
        self.extra_child_args = args;
        self
    }

    pub fn spawn(self) -> anyhow::Result<GatewayProcess> {
        let binary = mcpgate_binary();
        anyhow::ensure!(binary.exists(), "mcpgate binary not found at {}", binary.display());
        let child_binary = mock_child_binary();
        anyhow::ensure!(child_binary.exists(), "mock-mcp-child binary not found at {}", child_binary.display());

        let port = free_port()?;
        let work_dir = tempfile::tempdir()?;

        let credentials_path = work_dir.path().join("credentials.json");
        let seeded: Vec<Value> = self
            .accounts
            .iter()
            .map(|a| {
                serde_json::json!({
                    "bearer": a.bearer,
                    "tenant_id": a.tenant_id,
                    "credential_id": format!("cred-{}", a.tenant_id),
                    "plan": a.plan,
                    "verified": a.verified,
                    "scopes": [],
                })
            })
            .collect();
        std::fs::write(&credentials_path, serde_json::to_vec_pretty(&seeded)?)?;

        let mut command = Command::new(&binary);
        command
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .arg("--child-command")
            .arg(child_binary.to_string_lossy().into_owned())
            .arg("--credentials-file")
            .arg(&credentials_path)
            .arg("--config-dir")
            .arg(work_dir.path().join("tenant-configs"))
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if !self.extra_child_args.is_empty() {
            command.arg(format!("--child-args={}", self.extra_child_args.join(" ")));
        }
        let child = command.spawn()?;

        Ok(GatewayProcess { child, port, _work_dir: work_dir })
    }
}

/// A running `mcpgate` process that is killed on drop.
pub struct GatewayProcess {
    child: Child,
    port: u16,
    _work_dir: tempfile::TempDir,
}

impl GatewayProcess {
    pub fn build() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Kills the running `mock-mcp-child` process directly (not `mcpgate`
    /// itself), simulating the child crashing mid-call.
    pub fn kill_child_process(&self) -> anyhow::Result<()> {
        let output = Command::new("pgrep").arg("-P").arg(self.pid().to_string()).arg("mock-mcp-child").output()?;
        let child_pid = String::from_utf8_lossy(&output.stdout);
        let child_pid = child_pid.lines().next().ok_or_else(|| anyhow::anyhow!("no mock-mcp-child process found"))?;
        Command::new("kill").arg("-9").arg(child_pid).status()?;
        Ok(())
    }

    /// Poll `/healthz` until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("mcpgate did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("mcpgate did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for GatewayProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
