// End-to-end invocation through the public API: a scripted model provider,
// the real MCP executor, and a stdio server scripted in `sh`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use astrolabe::{
    Agent, Completion, InvokeOptions, McpConfig, McpExecutor, MemoryCheckpointStore, ModelError,
    ModelProvider, Prompt, ServerConfig, TransportKind,
};
use async_trait::async_trait;
use serde_json::json;

/// Minimal scripted provider over the public trait.
struct ScriptedProvider {
    plain: Mutex<Vec<String>>,
    json: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(json: Vec<&str>, plain: Vec<&str>) -> Self {
        // Stored reversed so `pop` yields scripted order.
        Self {
            plain: Mutex::new(plain.into_iter().rev().map(String::from).collect()),
            json: Mutex::new(json.into_iter().rev().map(String::from).collect()),
        }
    }

    fn next(queue: &Mutex<Vec<String>>) -> Result<Completion, ModelError> {
        match queue.lock().unwrap().pop() {
            Some(content) => Ok(Completion {
                content,
                usage: None,
            }),
            None => Err(ModelError::invalid_response("scripted", "script exhausted")),
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        _prompt: Prompt,
        _options: &InvokeOptions,
    ) -> Result<Completion, ModelError> {
        Self::next(&self.plain)
    }

    async fn invoke_json_mode(
        &self,
        _prompt: Prompt,
        _options: &InvokeOptions,
    ) -> Result<Completion, ModelError> {
        Self::next(&self.json)
    }
}

fn clock_server() -> ServerConfig {
    // First request on the transport gets id 1.
    let script = concat!(
        r#"read -r line"#,
        "\n",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"iso":"2025-01-01T00:00:00Z"}}'"#,
        "\n",
        r#"read -r line"#,
    );
    ServerConfig {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        transport: TransportKind::Stdio,
        enabled: true,
        tools: Some(vec!["now".to_string()]),
    }
}

#[tokio::test]
async fn invoke_drives_a_tool_plan_through_a_real_subprocess() {
    let plan = json!({
        "reasoning": "fetch the time with the clock tool",
        "tasks": [
            {"id": "t1", "description": "Fetch the current time", "tool_call": "clock:now", "tool_input": {}}
        ]
    })
    .to_string();

    let provider = Arc::new(ScriptedProvider::new(
        vec![plan.as_str()],
        vec!["The current time is 2025-01-01T00:00:00Z."],
    ));

    let mut servers = BTreeMap::new();
    servers.insert("clock".to_string(), clock_server());
    let executor = Arc::new(McpExecutor::new(McpConfig::from_servers(servers)));
    let store = Arc::new(MemoryCheckpointStore::new());

    let agent = Agent::new(provider, executor, store);
    let response = agent.invoke("s-e2e", "what time is it?").await.unwrap();

    assert!(response.message.contains("2025-01-01T00:00:00Z"));
    assert_eq!(response.execution_trace.len(), 1);
    assert!(response.execution_trace[0].success);
    assert_eq!(
        response.execution_trace[0].output,
        Some(json!({"iso": "2025-01-01T00:00:00Z"}))
    );

    agent.close().await;
}

#[tokio::test]
async fn clear_session_forgets_the_snapshot() {
    let plan = json!({
        "reasoning": "direct reply",
        "tasks": [{"id": "t1", "description": "Greet the user"}]
    })
    .to_string();

    let provider = Arc::new(ScriptedProvider::new(
        vec![plan.as_str()],
        vec!["Hello!", "Hello!"],
    ));
    let executor = Arc::new(McpExecutor::new(McpConfig::from_servers(BTreeMap::new())));
    let store = Arc::new(MemoryCheckpointStore::new());

    let agent = Agent::new(provider, executor, store.clone());
    agent.invoke("s-clear", "say hi").await.unwrap();

    use astrolabe::CheckpointStore;
    assert!(store.get("s-clear").await.unwrap().is_some());
    agent.clear_session("s-clear").await.unwrap();
    assert!(store.get("s-clear").await.unwrap().is_none());
}
