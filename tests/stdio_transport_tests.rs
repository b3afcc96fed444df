// Stdio transport against scripted `sh` subprocesses. Request ids are
// allocated sequentially from 1, so a script can answer fixed ids.

use std::time::Duration;

use astrolabe::{StdioTransport, Transport, TransportError};
use serde_json::json;

fn args(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn round_trips_list_tools_and_call_tool() {
    let script = concat!(
        r#"read -r line"#,
        "\n",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"now","description":"current time","input_schema":{"type":"object"}}]}}'"#,
        "\n",
        r#"read -r line"#,
        "\n",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"iso":"2025-01-01T00:00:00Z"}}'"#,
        "\n",
        r#"read -r line"#,
    );

    let transport = StdioTransport::new("scripted");
    transport.start("sh", &args(script)).await.unwrap();
    assert!(transport.is_alive().await);

    let tools = transport.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "now");
    assert_eq!(tools[0].description.as_deref(), Some("current time"));

    let result = transport.execute_tool("now", json!({})).await.unwrap();
    assert_eq!(result, json!({"iso": "2025-01-01T00:00:00Z"}));

    transport.stop().await;
    assert!(!transport.is_alive().await);
    // Stopping twice is a no-op.
    transport.stop().await;
}

#[tokio::test]
async fn start_is_idempotent() {
    let script = concat!(
        r#"read -r line"#,
        "\n",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}'"#,
        "\n",
        r#"read -r line"#,
    );

    let transport = StdioTransport::new("scripted");
    transport.start("sh", &args(script)).await.unwrap();
    // A second start must not spawn a second process; ids keep counting on
    // the same connection.
    transport.start("sh", &args(script)).await.unwrap();

    let tools = transport.list_tools().await.unwrap();
    assert!(tools.is_empty());
    transport.stop().await;
}

#[tokio::test]
async fn stray_response_ids_are_skipped() {
    let script = concat!(
        r#"read -r line"#,
        "\n",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":999,"result":{"who":"nobody asked"}}'"#,
        "\n",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"now"}]}}'"#,
        "\n",
        r#"read -r line"#,
    );

    let transport = StdioTransport::new("scripted");
    transport.start("sh", &args(script)).await.unwrap();

    let tools = transport.list_tools().await.unwrap();
    assert_eq!(tools[0].name, "now");
    transport.stop().await;
}

#[tokio::test]
async fn json_rpc_error_surfaces_as_remote_error() {
    let script = concat!(
        r#"read -r line"#,
        "\n",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such tool"}}'"#,
        "\n",
        r#"read -r line"#,
    );

    let transport = StdioTransport::new("scripted");
    transport.start("sh", &args(script)).await.unwrap();

    let err = transport.execute_tool("ghost", json!({})).await.unwrap_err();
    match err {
        TransportError::Remote { code, message, .. } => {
            assert_eq!(code, -32601);
            assert_eq!(message, "no such tool");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    transport.stop().await;
}

#[tokio::test]
async fn spawn_failure_is_unavailable() {
    let transport = StdioTransport::new("broken");
    let err = transport
        .start("/nonexistent-mcp-server-binary", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Unavailable { .. }));
    assert!(!transport.is_alive().await);
}

#[tokio::test]
async fn silent_server_times_out() {
    let script = concat!(
        r#"read -r line"#,
        "\n",
        r#"sleep 10"#,
    );

    let transport = StdioTransport::with_timeout("silent", Duration::from_millis(200));
    transport.start("sh", &args(script)).await.unwrap();

    let err = transport.execute_tool("now", json!({})).await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }));
    transport.stop().await;
}

#[tokio::test]
async fn request_against_stopped_transport_fails_cleanly() {
    let transport = StdioTransport::new("never-started");
    let err = transport.execute_tool("now", json!({})).await.unwrap_err();
    assert!(matches!(err, TransportError::Unavailable { .. }));
}
