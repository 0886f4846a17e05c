// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One running per-tenant child process plus its line framers: request/
//! response correlation, idle eviction, and bounded crash-restart.
//!
//! Child spawning and stdio handling is grounded on
//! `ahma_core::shell_pool::PrewarmedShell` and `ahma_http_bridge::bridge::manage_process`
//! (a piped, non-PTY child with a background stdout reader and a logged
//! stderr drain) rather than the teacher's own PTY backend, which wraps an
//! interactive terminal and is the wrong shape for a JSON-RPC stdio child.
//! Request correlation by id is grounded on `upstream::bridge::WsBridge`'s
//! pending-request-by-id table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, Notify, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::framer::{LineReader, LineWriter};
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, RequestId};

const MAX_RESTARTS: u32 = 3;
const RESTART_COOLDOWN: Duration = Duration::from_secs(30);
const HANDSHAKE_ID: i64 = -1;

/// Child process identity and the environment needed to launch it.
#[derive(Debug, Clone)]
pub struct ChildCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Environment variable the child reads its per-tenant config path from.
    pub config_env_var: String,
    pub config_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub tenant_id: String,
    pub command: ChildCommand,
    pub call_timeout: Duration,
    pub idle_timeout: Duration,
    pub protocol_version: String,
}

#[derive(Debug, Clone)]
pub enum InstanceError {
    SpawnFailed(String),
    HandshakeFailed(String),
    RestartExhausted,
    WriteFailed(String),
    Timeout,
    ChildExited(Option<i32>),
    Killed,
}

impl std::fmt::Display for InstanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpawnFailed(msg) => write!(f, "spawn failed: {msg}"),
            Self::HandshakeFailed(msg) => write!(f, "handshake failed: {msg}"),
            Self::RestartExhausted => write!(f, "restart exhausted"),
            Self::WriteFailed(msg) => write!(f, "write failed: {msg}"),
            Self::Timeout => write!(f, "timeout"),
            Self::ChildExited(code) => write!(f, "child exited (code={code:?})"),
            Self::Killed => write!(f, "instance terminated"),
        }
    }
}

impl std::error::Error for InstanceError {}

type Waiter = oneshot::Sender<Result<Value, InstanceError>>;

/// Resources tied to one successfully handshaken child. Created once per
/// `Instance`; never recreated in place — once `dead` is observed, the
/// owning `Instance` is discarded by the pool.
pub(crate) struct Running {
    writer: Mutex<LineWriter>,
    child: Mutex<Child>,
    pending: Mutex<HashMap<String, Waiter>>,
    dead: AtomicBool,
    terminal_notify: Notify,
}

impl Running {
    /// Marks the instance dead, drains the pending table failing every
    /// waiter with `reason`, and best-effort kills the child. Idempotent:
    /// only the first caller to win the CAS performs the work.
    async fn finalize(self: &Arc<Self>, reason: InstanceError) {
        if self.dead.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut pending = self.pending.lock().await;
        for (_, waiter) in pending.drain() {
            let _ = waiter.send(Err(reason.clone()));
        }
        drop(pending);
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        drop(child);
        self.terminal_notify.notify_waiters();
    }
}

pub struct Instance {
    config: InstanceConfig,
    running: OnceCell<Arc<Running>>,
    ever_ready: Notify,
    restart_count: AtomicU32,
    last_restart: Mutex<Option<Instant>>,
    last_activity: Mutex<Instant>,
    idle_notify: Notify,
}

impl Instance {
    pub fn new(config: InstanceConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            running: OnceCell::new(),
            ever_ready: Notify::new(),
            restart_count: AtomicU32::new(0),
            last_restart: Mutex::new(None),
            last_activity: Mutex::new(Instant::now()),
            idle_notify: Notify::new(),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.config.tenant_id
    }

    async fn touch_activity(&self) {
        *self.last_activity.lock().await = Instant::now();
        self.idle_notify.notify_waiters();
    }

    /// If alive, refreshes the idle deadline and returns. If initialization
    /// is in flight, awaits the same future as every other concurrent
    /// caller (via `OnceCell::get_or_try_init`). Otherwise spawns the child
    /// and performs the MCP handshake.
    ///
    /// Public so the `initialize` path can drive the handshake eagerly
    /// (surfacing a broken child immediately) without sending a request of
    /// its own; `send`/`notify` also call this internally.
    pub(crate) async fn ensure_ready(self: &Arc<Self>) -> Result<Arc<Running>, InstanceError> {
        if let Some(running) = self.running.get() {
            if running.dead.load(Ordering::Acquire) {
                return Err(InstanceError::Killed);
            }
            self.touch_activity().await;
            return Ok(running.clone());
        }

        let this = self.clone();
        let running = self
            .running
            .get_or_try_init(|| async move { this.spawn_and_handshake().await })
            .await?
            .clone();
        self.ever_ready.notify_waiters();

        if running.dead.load(Ordering::Acquire) {
            return Err(InstanceError::Killed);
        }
        self.touch_activity().await;
        Ok(running)
    }

    async fn spawn_and_handshake(self: &Arc<Self>) -> Result<Arc<Running>, InstanceError> {
        {
            let mut last_restart = self.last_restart.lock().await;
            let now = Instant::now();
            if let Some(prev) = *last_restart {
                if now.duration_since(prev) > RESTART_COOLDOWN {
                    self.restart_count.store(0, Ordering::Relaxed);
                }
            }
            if self.restart_count.load(Ordering::Relaxed) >= MAX_RESTARTS {
                return Err(InstanceError::RestartExhausted);
            }
            self.restart_count.fetch_add(1, Ordering::Relaxed);
            *last_restart = Some(now);
        }

        let mut child = Command::new(&self.config.command.program)
            .args(&self.config.command.args)
            .env(&self.config.command.config_env_var, &self.config.command.config_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InstanceError::SpawnFailed(e.to_string()))?;

        let stdin = child.stdin.take().ok_or_else(|| InstanceError::SpawnFailed("no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| InstanceError::SpawnFailed("no stdout".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| InstanceError::SpawnFailed("no stderr".into()))?;

        let running = Arc::new(Running {
            writer: Mutex::new(LineWriter::new(stdin)),
            child: Mutex::new(child),
            pending: Mutex::new(HashMap::new()),
            dead: AtomicBool::new(false),
            terminal_notify: Notify::new(),
        });

        tokio::spawn(stderr_task(self.config.tenant_id.clone(), stderr));
        tokio::spawn(reader_task(running.clone(), LineReader::new(stdout)));

        self.handshake(&running)
            .await
            .inspect_err(|e| {
                let running_clone = running.clone();
                let finalize_err = e.clone();
                tokio::spawn(async move { running_clone.finalize(finalize_err).await });
            })?;

        tokio::spawn(idle_timer_task(self.clone(), running.clone()));

        Ok(running)
    }

    async fn handshake(&self, running: &Arc<Running>) -> Result<(), InstanceError> {
        let id = RequestId::Number(HANDSHAKE_ID);
        let (tx, rx) = oneshot::channel();
        running.pending.lock().await.insert(id.to_string(), tx);

        let request = JsonRpcRequest::new(
            id.clone(),
            "initialize",
            serde_json::json!({
                "protocolVersion": self.config.protocol_version,
                "capabilities": {},
                "clientInfo": {"name": "mcpgate", "version": env!("CARGO_PKG_VERSION")},
            }),
        );
        running
            .writer
            .lock()
            .await
            .write_message(&request)
            .await
            .map_err(|e| InstanceError::WriteFailed(e.to_string()))?;

        let reply = tokio::time::timeout(self.config.call_timeout, rx)
            .await
            .map_err(|_| InstanceError::HandshakeFailed("timed out awaiting initialize reply".into()))?
            .map_err(|_| InstanceError::HandshakeFailed("instance terminated before handshake completed".into()))?
            .map_err(|e| InstanceError::HandshakeFailed(e.to_string()))?;

        if let Some(error) = reply.get("error") {
            return Err(InstanceError::HandshakeFailed(error.to_string()));
        }

        let notification = JsonRpcNotification::new("notifications/initialized", Value::Null);
        running
            .writer
            .lock()
            .await
            .write_message(&notification)
            .await
            .map_err(|e| InstanceError::WriteFailed(e.to_string()))?;

        info!(tenant_id = %self.config.tenant_id, "instance handshake complete");
        Ok(())
    }

    /// Forwards a JSON-RPC request to the child and returns its raw
    /// response object (`result` or `error`), whichever the child sent.
    pub async fn send(self: &Arc<Self>, id: RequestId, method: &str, params: Value) -> Result<Value, InstanceError> {
        let running = self.ensure_ready().await?;
        if running.dead.load(Ordering::Acquire) {
            return Err(InstanceError::Killed);
        }

        let key = id.to_string();
        let (tx, rx) = oneshot::channel();
        running.pending.lock().await.insert(key.clone(), tx);

        let request = JsonRpcRequest::new(id, method, params);
        if let Err(e) = running.writer.lock().await.write_message(&request).await {
            running.pending.lock().await.remove(&key);
            return Err(InstanceError::WriteFailed(e.to_string()));
        }
        self.touch_activity().await;

        match tokio::time::timeout(self.config.call_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(reason))) => Err(reason),
            Ok(Err(_recv_dropped)) => Err(InstanceError::Killed),
            Err(_elapsed) => {
                running.pending.lock().await.remove(&key);
                Err(InstanceError::Timeout)
            }
        }
    }

    /// Forwards a notification; no waiter is registered and no response is
    /// awaited.
    pub async fn notify(self: &Arc<Self>, method: &str, params: Value) -> Result<(), InstanceError> {
        let running = self.ensure_ready().await?;
        if running.dead.load(Ordering::Acquire) {
            return Err(InstanceError::Killed);
        }
        let notification = JsonRpcNotification::new(method, params);
        running
            .writer
            .lock()
            .await
            .write_message(&notification)
            .await
            .map_err(|e| InstanceError::WriteFailed(e.to_string()))?;
        self.touch_activity().await;
        Ok(())
    }

    pub fn is_dead(&self) -> bool {
        self.running.get().is_some_and(|r| r.dead.load(Ordering::Acquire))
    }

    /// Terminates the child, failing every pending waiter with "instance
    /// terminated." A no-op if the instance never started or is already
    /// dead.
    pub async fn kill(self: &Arc<Self>) {
        if let Some(running) = self.running.get() {
            running.clone().finalize(InstanceError::Killed).await;
        }
    }

    /// Resolves once this instance has reached its terminal dead state,
    /// however it got there (idle eviction, crash, or explicit kill). Never
    /// resolves for an instance that is merely slow to start.
    pub async fn wait_terminal(self: &Arc<Self>) {
        loop {
            if let Some(running) = self.running.get() {
                if running.dead.load(Ordering::Acquire) {
                    return;
                }
                let notified = running.terminal_notify.notified();
                if running.dead.load(Ordering::Acquire) {
                    return;
                }
                notified.await;
                return;
            }
            let notified = self.ever_ready.notified();
            if self.running.get().is_some() {
                continue;
            }
            notified.await;
        }
    }
}

async fn reader_task(running: Arc<Running>, mut reader: LineReader) {
    loop {
        match reader.next_message().await {
            Ok(Some(value)) => {
                let Some(id_value) = value.get("id") else { continue };
                let Ok(id) = serde_json::from_value::<RequestId>(id_value.clone()) else { continue };
                let waiter = running.pending.lock().await.remove(&id.to_string());
                if let Some(waiter) = waiter {
                    let _ = waiter.send(Ok(value));
                }
            }
            Ok(None) => {
                debug!("child stdout closed");
                running.finalize(InstanceError::ChildExited(None)).await;
                return;
            }
            Err(e) => {
                warn!(err = %e, "error reading child stdout");
                running.finalize(InstanceError::ChildExited(None)).await;
                return;
            }
        }
    }
}

async fn stderr_task(tenant_id: String, stderr: tokio::process::ChildStderr) {
    let mut lines = tokio::io::BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!(target: "child_stderr", tenant_id = %tenant_id, "{line}"),
            Ok(None) => return,
            Err(_) => return,
        }
    }
}

async fn idle_timer_task(instance: Arc<Instance>, running: Arc<Running>) {
    loop {
        if running.dead.load(Ordering::Acquire) {
            return;
        }
        let deadline = *instance.last_activity.lock().await + instance.config.idle_timeout;
        let notified = instance.idle_notify.notified();
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                if running.dead.load(Ordering::Acquire) {
                    return;
                }
                if running.pending.lock().await.is_empty() {
                    info!(tenant_id = %instance.config.tenant_id, "evicting idle instance");
                    running.finalize(InstanceError::Killed).await;
                    return;
                }
            }
            _ = notified => {}
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
