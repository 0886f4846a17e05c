//! Minimal MCP-over-stdio child used only by gateway integration tests.
//!
//! Implements just enough of the child contract (§6.3 of the gateway spec)
//! to drive the gateway's handshake, `tools/list`, and `tools/call` paths:
//! two tools (`echo`, `sleep_ms`), plus `--wedge` and `--crash-after=<n>`
//! flags for exercising the handshake-timeout and crash-recovery paths.

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let wedge = args.iter().any(|a| a == "--wedge");
    let crash_after = args
        .iter()
        .find_map(|a| a.strip_prefix("--crash-after="))
        .and_then(|n| n.parse::<u32>().ok());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut calls: u32 = 0;

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(msg) = serde_json::from_str::<Value>(line) else {
            continue;
        };

        let method = msg.get("method").and_then(Value::as_str).unwrap_or("");
        let id = msg.get("id").cloned();

        match method {
            "initialize" => {
                if wedge {
                    continue;
                }
                if let Some(id) = id {
                    write_line(
                        &mut stdout,
                        &json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "protocolVersion": "2025-03-26",
                                "serverInfo": {"name": "mock-mcp-child", "version": "0.1.0"},
                                "capabilities": {"tools": {}},
                            },
                        }),
                    );
                }
            }
            "notifications/initialized" => {}
            "tools/list" => {
                if let Some(id) = id {
                    write_line(
                        &mut stdout,
                        &json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "tools": [
                                    {
                                        "name": "echo",
                                        "description": "echoes its input back",
                                        "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}},
                                    },
                                    {
                                        "name": "sleep_ms",
                                        "description": "sleeps for the given number of milliseconds",
                                        "inputSchema": {"type": "object", "properties": {"ms": {"type": "integer"}}},
                                    },
                                ],
                            },
                        }),
                    );
                }
            }
            "tools/call" => {
                calls += 1;
                if let Some(limit) = crash_after {
                    if calls > limit {
                        std::process::exit(1);
                    }
                }
                handle_tool_call(&mut stdout, id, &msg);
            }
            _ => {
                if let Some(id) = id {
                    write_line(
                        &mut stdout,
                        &json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {"code": -32601, "message": format!("method not found: {method}")},
                        }),
                    );
                }
            }
        }
    }
}

fn handle_tool_call(stdout: &mut io::Stdout, id: Option<Value>, msg: &Value) {
    let Some(id) = id else { return };
    let params = msg.get("params").cloned().unwrap_or(Value::Null);
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(Value::Null);

    match name {
        "echo" => {
            let text = args.get("text").and_then(Value::as_str).unwrap_or("");
            write_line(
                stdout,
                &json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"content": [{"type": "text", "text": text}]},
                }),
            );
        }
        "sleep_ms" => {
            let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
            std::thread::sleep(std::time::Duration::from_millis(ms));
            write_line(
                stdout,
                &json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"content": [{"type": "text", "text": "slept"}]},
                }),
            );
        }
        other => {
            write_line(
                stdout,
                &json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32602, "message": format!("unknown tool: {other}")},
                }),
            );
        }
    }
}

fn write_line(stdout: &mut io::Stdout, value: &Value) {
    let _ = writeln!(stdout, "{value}");
    let _ = stdout.flush();
}
