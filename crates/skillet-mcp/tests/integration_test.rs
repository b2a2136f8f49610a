//! Integration tests for the MCP client against subprocess servers.

use serde_json::{json, Map};
use skillet_mcp::{load_server_configs, McpClientManager, McpServerConfig};

/// A minimal MCP server in POSIX sh. Request IDs are deterministic
/// (the client counts from 1), so the script can answer positionally:
/// initialize, the initialized notification, tools/list, one tools/call.
#[cfg(unix)]
const FAKE_SERVER: &str = r#"
read -r line; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.0.1"}}}'
read -r line
read -r line; printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"ping","description":"Reply with pong","inputSchema":{"type":"object","properties":{},"additionalProperties":false}}]}}'
read -r line; printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"pong"}],"isError":false}}'
read -r line
"#;

#[cfg(unix)]
#[tokio::test]
async fn test_scripted_stdio_server_end_to_end() {
    let config = McpServerConfig::stdio("fake", "sh")
        .with_args(vec!["-c".to_string(), FAKE_SERVER.to_string()])
        .with_timeout_secs(5);

    let manager = McpClientManager::new(vec![config]);

    let report = manager.initialize().await.expect("first initialize");
    assert_eq!(report.connected, vec!["fake".to_string()]);
    assert!(report.unavailable.is_empty());

    let tools = manager.all_tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].qualified_name(), "fake/ping");

    let outcome = manager.call_tool("fake", "ping", Map::new()).await;
    assert!(outcome.success, "outcome: {:?}", outcome.error);
    assert_eq!(outcome.data, Some(json!("pong")));

    manager.close().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_schema_violation_never_reaches_the_server() {
    // The script would answer a call, but the sealed schema forbids
    // extra arguments, so the call must die client-side.
    let config = McpServerConfig::stdio("fake", "sh")
        .with_args(vec!["-c".to_string(), FAKE_SERVER.to_string()])
        .with_timeout_secs(5);

    let manager = McpClientManager::new(vec![config]);
    manager.initialize().await.expect("initialize");

    let mut args = Map::new();
    args.insert("unexpected".to_string(), json!(1));
    let outcome = manager.call_tool("fake", "ping", args).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error_kind(),
        Some(skillet_core::ErrorKind::Validation)
    );

    // The session is still usable afterwards.
    let outcome = manager.call_tool("fake", "ping", Map::new()).await;
    assert!(outcome.success);

    manager.close().await;
}

#[tokio::test]
async fn test_unreachable_server_degrades_gracefully() {
    let config = McpServerConfig::stdio("12306-mcp", "/nonexistent/mcp-server");
    let manager = McpClientManager::new(vec![config]);

    let report = manager.initialize().await.expect("initialize");
    assert!(report.connected.is_empty());
    assert_eq!(report.unavailable.len(), 1);

    let outcome = manager
        .call_tool("12306-mcp", "query_tickets", Map::new())
        .await;
    assert!(!outcome.success);
    assert_eq!(
        outcome.error_kind(),
        Some(skillet_core::ErrorKind::Transport)
    );
    assert!(outcome.is_retryable());

    manager.close().await;
}

#[tokio::test]
async fn test_manager_from_servers_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.toml");
    std::fs::write(
        &path,
        r#"
        [servers.amap-maps]
        transport = "sse"
        url = "https://mcp.example.com/sse"

        [servers.local-tools]
        command = "cat"
        enabled = false
        "#,
    )
    .unwrap();

    let configs = load_server_configs(&path).unwrap();
    let manager = McpClientManager::new(configs);

    assert!(manager.has_server("amap-maps"));
    assert!(!manager.has_server("local-tools"));
}
