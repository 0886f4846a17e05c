// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios that spawn the real `mcpgate` binary, fronting
//! `mock-mcp-child`, and exercise it over HTTP exactly as a caller would.

use std::time::Duration;

use mcpgate_specs::{Account, GatewayProcess};
use serde_json::{json, Value};

const TIMEOUT: Duration = Duration::from_secs(10);

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn initialize(client: &reqwest::Client, base: &str, bearer: &str) -> anyhow::Result<(Value, String)> {
    let resp = client
        .post(format!("{base}/mcp"))
        .header("authorization", format!("Bearer {bearer}"))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
        .send()
        .await?;
    let session = resp
        .headers()
        .get("mcp-session-id")
        .ok_or_else(|| anyhow::anyhow!("missing Mcp-Session-Id header"))?
        .to_str()?
        .to_owned();
    let body: Value = resp.json().await?;
    Ok((body, session))
}

// -- S1 -------------------------------------------------------------------

#[tokio::test]
async fn s1_initialize_then_list() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let (body, session) = initialize(&client, &gateway.base_url(), "test-bearer").await?;
    assert_eq!(body["result"]["serverInfo"]["name"], "seomcp-proxy");
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer test-bearer")
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await?;
    let body: Value = resp.json().await?;
    let tools = body["result"]["tools"].as_array().ok_or_else(|| anyhow::anyhow!("tools is not an array"))?;
    assert!(!tools.is_empty());
    for tool in tools {
        assert!(tool["name"].is_string());
        assert!(tool["description"].is_string());
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
    Ok(())
}

// -- S2 -------------------------------------------------------------------

#[tokio::test]
async fn s2_notification_has_no_response() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let (_, session) = initialize(&client, &gateway.base_url(), "test-bearer").await?;

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer test-bearer")
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 202);
    assert!(resp.text().await?.is_empty());

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer test-bearer")
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}))
        .send()
        .await?;
    let body: Value = resp.json().await?;
    assert!(body["result"]["tools"].is_array());
    Ok(())
}

// -- S3 -------------------------------------------------------------------

#[tokio::test]
async fn s3_unknown_method_is_method_not_found() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let (_, session) = initialize(&client, &gateway.base_url(), "test-bearer").await?;

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer test-bearer")
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "does/not/exist"}))
        .send()
        .await?;
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], -32601);
    let message = body["error"]["message"].as_str().ok_or_else(|| anyhow::anyhow!("message is not a string"))?;
    assert!(message.contains("does/not/exist"));
    Ok(())
}

// -- S4 -------------------------------------------------------------------

#[tokio::test]
async fn s4_quota_denial() -> anyhow::Result<()> {
    let gateway =
        GatewayProcess::build().accounts(vec![Account::new("free-bearer", "t-quota", "free", true)]).spawn()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let (_, session) = initialize(&client, &gateway.base_url(), "free-bearer").await?;

    for i in 0..50 {
        let resp = client
            .post(format!("{}/mcp", gateway.base_url()))
            .header("authorization", "Bearer free-bearer")
            .header("mcp-session-id", &session)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": i + 2,
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {"text": "hi"}},
            }))
            .send()
            .await?;
        let body: Value = resp.json().await?;
        assert!(body["result"].is_object(), "call {i} should have succeeded: {body:?}");
    }

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer free-bearer")
        .header("mcp-session-id", &session)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 999,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"text": "hi"}},
        }))
        .send()
        .await?;
    assert_eq!(resp.headers().get("x-ratelimit-used").and_then(|v| v.to_str().ok()), Some("50"));
    assert_eq!(resp.headers().get("x-ratelimit-limit").and_then(|v| v.to_str().ok()), Some("50"));
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["error"]["data"]["used"], 50);
    assert_eq!(body["error"]["data"]["limit"], 50);
    assert_eq!(body["error"]["data"]["plan"], "free");
    Ok(())
}

// -- S5 -------------------------------------------------------------------

#[tokio::test]
async fn s5_session_cross_tenant_refusal() -> anyhow::Result<()> {
    let gateway = GatewayProcess::build()
        .accounts(vec![Account::new("bearer-a", "tenant-a", "pro", true), Account::new("bearer-b", "tenant-b", "pro", true)])
        .spawn()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let (_, session) = initialize(&client, &gateway.base_url(), "bearer-a").await?;

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer bearer-b")
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 404);
    Ok(())
}

// -- S6 -------------------------------------------------------------------

#[tokio::test]
async fn s6_crash_recovery() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let (_, session) = initialize(&client, &gateway.base_url(), "test-bearer").await?;

    // Start a slow call, then kill the real child process out from under it
    // while it's in flight.
    let in_flight = {
        let client = client.clone();
        let base = gateway.base_url();
        let session = session.clone();
        tokio::spawn(async move {
            client
                .post(format!("{base}/mcp"))
                .header("authorization", "Bearer test-bearer")
                .header("mcp-session-id", &session)
                .json(&json!({
                    "jsonrpc": "2.0",
                    "id": 2,
                    "method": "tools/call",
                    "params": {"name": "sleep_ms", "arguments": {"ms": 3000}},
                }))
                .send()
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    gateway.kill_child_process()?;

    let resp = in_flight.await??;
    let body: Value = resp.json().await?;
    assert!(body["error"]["code"].is_number(), "expected the in-flight call to surface a child-exited error: {body:?}");

    // A fresh initialize picks up a newly spawned Instance from the pool
    // (the dead one was dropped when the child exited).
    let (_, session) = initialize(&client, &gateway.base_url(), "test-bearer").await?;
    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer test-bearer")
        .header("mcp-session-id", &session)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"text": "recovered"}},
        }))
        .send()
        .await?;
    let body: Value = resp.json().await?;
    assert_eq!(body["result"]["content"][0]["text"], "recovered");
    Ok(())
}

// -- Batch order & misc transport properties -------------------------------

#[tokio::test]
async fn batch_order_matches_request_subarray() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let (_, session) = initialize(&client, &gateway.base_url(), "test-bearer").await?;

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer test-bearer")
        .header("mcp-session-id", &session)
        .json(&json!([
            {"jsonrpc": "2.0", "id": 10, "method": "tools/call", "params": {"name": "echo", "arguments": {"text": "a"}}},
            {"jsonrpc": "2.0", "method": "notifications/progress"},
            {"jsonrpc": "2.0", "id": 11, "method": "tools/call", "params": {"name": "echo", "arguments": {"text": "b"}}},
        ]))
        .send()
        .await?;
    let body: Value = resp.json().await?;
    let array = body.as_array().ok_or_else(|| anyhow::anyhow!("expected a JSON array response"))?;
    assert_eq!(array.len(), 2);
    assert_eq!(array[0]["id"], 10);
    assert_eq!(array[0]["result"]["content"][0]["text"], "a");
    assert_eq!(array[1]["id"], 11);
    assert_eq!(array[1]["result"]["content"][0]["text"], "b");
    Ok(())
}

#[tokio::test]
async fn unauthenticated_request_is_rejected() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
        .send()
        .await?;
    assert_eq!(resp.status(), 401);
    Ok(())
}

#[tokio::test]
async fn get_mcp_is_method_not_allowed() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let resp = client.get(format!("{}/mcp", gateway.base_url())).send().await?;
    assert_eq!(resp.status(), 405);
    assert_eq!(resp.headers().get("allow").and_then(|v| v.to_str().ok()), Some("POST, DELETE"));
    Ok(())
}

#[tokio::test]
async fn delete_mcp_destroys_the_session() -> anyhow::Result<()> {
    let gateway = GatewayProcess::start()?;
    gateway.wait_healthy(TIMEOUT).await?;
    let client = client();

    let (_, session) = initialize(&client, &gateway.base_url(), "test-bearer").await?;

    let resp = client
        .delete(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer test-bearer")
        .header("mcp-session-id", &session)
        .send()
        .await?;
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/mcp", gateway.base_url()))
        .header("authorization", "Bearer test-bearer")
        .header("mcp-session-id", &session)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 404);
    Ok(())
}
