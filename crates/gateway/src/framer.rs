// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON framing over a child process's stdio pipes.
//!
//! Grounded on `PrewarmedShell`'s line-oriented stdout reading in the
//! ahma_core shell pool and on `manage_process`'s `BufReader::lines()` use
//! in the ahma_http_bridge: one JSON value per line, no length prefix.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tracing::warn;

/// Lines longer than this are discarded with a warning rather than handed
/// to the JSON parser; a well-behaved MCP child never emits one this long.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Reads one JSON value per line from a child's stdout. Non-JSON lines
/// (children may log to stdout) and oversized lines are dropped silently
/// rather than surfaced as errors, per the framer's contract.
pub struct LineReader {
    inner: tokio::io::Lines<BufReader<ChildStdout>>,
    max_line_bytes: usize,
}

impl LineReader {
    pub fn new(stdout: ChildStdout) -> Self {
        Self::with_max_line_bytes(stdout, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(stdout: ChildStdout, max_line_bytes: usize) -> Self {
        Self { inner: BufReader::new(stdout).lines(), max_line_bytes }
    }

    /// Reads the next line and parses it as JSON. Returns `Ok(None)` on EOF
    /// (the child closed stdout, i.e. exited).
    pub async fn next_message(&mut self) -> std::io::Result<Option<Value>> {
        loop {
            let Some(line) = self.inner.next_line().await? else {
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.len() > self.max_line_bytes {
                warn!(len = trimmed.len(), max = self.max_line_bytes, "dropping oversized line from child");
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(value) => return Ok(Some(value)),
                Err(_) => continue,
            }
        }
    }
}

/// Writes one JSON value per line to a child's stdin. Writes are not
/// serialized here; callers share one `LineWriter` behind a lock so lines
/// from concurrent callers never interleave.
pub struct LineWriter {
    inner: ChildStdin,
}

impl LineWriter {
    pub fn new(stdin: ChildStdin) -> Self {
        Self { inner: stdin }
    }

    pub async fn write_message<T: Serialize>(&mut self, value: &T) -> std::io::Result<()> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await
    }
}

#[cfg(test)]
#[path = "framer_tests.rs"]
mod tests;
