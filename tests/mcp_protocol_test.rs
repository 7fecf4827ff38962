//! Integration tests for MCP protocol handling
//!
//! Drives a full decision session through JSON-RPC lines against an offline
//! server backed by in-memory SQLite, the way an MCP client would.

use serde_json::{json, Value};
use std::sync::Arc;

use tension_field::config::{
    Config, DatabaseConfig, FieldConfig, LangbaseConfig, LogFormat, LoggingConfig, PipeConfig, RequestConfig,
};
use tension_field::langbase::LangbaseClient;
use tension_field::storage::{MessageKind, SqliteStorage, Storage};
use tension_field::{AppState, McpServer, SharedState};

fn offline_config() -> Config {
    Config {
        langbase: LangbaseConfig {
            api_key: String::new(),
            base_url: "https://api.langbase.com".to_string(),
        },
        database: DatabaseConfig {
            path: ":memory:".into(),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig::default(),
        pipes: PipeConfig::default(),
        field: FieldConfig::default(),
    }
}

async fn offline_server() -> (McpServer, SharedState) {
    let config = offline_config();
    let storage = SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage");
    let langbase = LangbaseClient::new(&config.langbase, config.request.clone()).expect("client");
    let state: SharedState = Arc::new(AppState::new(config, storage, langbase));
    (McpServer::new(state.clone()), state)
}

/// Send one line and return the response as it would appear on the wire.
async fn send(server: &McpServer, request: Value) -> Option<Value> {
    let response = server.handle_line(&request.to_string()).await?;
    let wire = serde_json::to_string(&response).expect("response serializes");
    Some(serde_json::from_str(&wire).expect("Failed to parse JSON-RPC response"))
}

async fn call_tool(server: &McpServer, id: i64, name: &str, arguments: Value) -> Value {
    let response = send(
        server,
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }),
    )
    .await
    .expect("tools/call always answers");
    assert_valid_jsonrpc_response(&response);
    assert_ne!(response["result"]["isError"], true, "tool {} failed: {}", name, response);

    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("text content");
    serde_json::from_str(text).expect("tool output is JSON")
}

/// Verify JSON-RPC 2.0 response structure
fn assert_valid_jsonrpc_response(response: &Value) {
    assert_eq!(response["jsonrpc"], "2.0", "Invalid JSON-RPC version");
    assert!(
        response.get("result").is_some() || response.get("error").is_some(),
        "Response must have result or error"
    );
}

#[cfg(test)]
mod handshake_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_then_list_tools() {
        let (server, _) = offline_server().await;

        let init = send(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "test-client", "version": "1.0.0" }
                }
            }),
        )
        .await
        .unwrap();
        assert_valid_jsonrpc_response(&init);
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["serverInfo"]["name"], "tension-field");
        assert_eq!(init["result"]["capabilities"]["tools"]["listChanged"], false);

        let initialized = send(
            &server,
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;
        assert!(initialized.is_none());

        let tools = send(&server, json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
            .await
            .unwrap();
        let names: Vec<&str> = tools["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        for expected in ["field_submit_decision", "field_answer", "field_throw", "field_snapshot"] {
            assert!(names.contains(&expected), "missing tool {}", expected);
        }
        for tool in tools["result"]["tools"].as_array().unwrap() {
            assert_eq!(tool["inputSchema"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_ping_and_unknown_method() {
        let (server, _) = offline_server().await;

        let pong = send(&server, json!({ "jsonrpc": "2.0", "id": "p", "method": "ping" }))
            .await
            .unwrap();
        assert_eq!(pong["id"], "p");
        assert_eq!(pong["result"], json!({}));

        let unknown = send(&server, json!({ "jsonrpc": "2.0", "id": 3, "method": "resources/list" }))
            .await
            .unwrap();
        assert_eq!(unknown["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_malformed_line_is_parse_error() {
        let (server, _) = offline_server().await;
        let response = server.handle_line("{ not json").await.unwrap();
        let wire: Value = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["error"]["code"], -32700);
        assert_eq!(wire["id"], Value::Null);
    }
}

#[cfg(test)]
mod session_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_session_is_persisted() {
        let (server, state) = offline_server().await;

        let submitted = call_tool(
            &server,
            1,
            "field_submit_decision",
            json!({ "decision": "Should I leave my job?" }),
        )
        .await;
        assert_eq!(submitted["outcome"], "applied");
        assert_eq!(submitted["result"]["source"], "fallback");

        let snapshot = call_tool(&server, 2, "field_snapshot", json!({})).await;
        assert_eq!(snapshot["session"]["phase"], "exploring");
        let ids: Vec<String> = snapshot["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 3);
        let conversation_id = snapshot["session"]["conversation_id"].as_str().unwrap().to_string();

        let selected = call_tool(&server, 3, "field_select_node", json!({ "node_id": ids[0] })).await;
        assert_eq!(selected["outcome"], "applied");

        let answered = call_tool(
            &server,
            4,
            "field_answer",
            json!({ "node_id": ids[0], "answer": "I have six months of savings." }),
        )
        .await;
        assert_eq!(answered["outcome"], "applied");
        assert_eq!(answered["result"]["node_id"], ids[0].as_str());

        let thrown = call_tool(
            &server,
            5,
            "field_throw",
            json!({
                "node_id": ids[2],
                "samples": [
                    { "x": 400.0, "y": 200.0, "t_ms": 0 },
                    { "x": 300.0, "y": 200.0, "t_ms": 100 },
                    { "x": 200.0, "y": 200.0, "t_ms": 200 }
                ]
            }),
        )
        .await;
        assert_eq!(thrown["result"]["action"], "dismiss");

        let ended = call_tool(&server, 6, "field_end_session", json!({ "ending": "clarity" })).await;
        assert_eq!(ended["outcome"], "applied");

        let snapshot = call_tool(&server, 7, "field_snapshot", json!({})).await;
        assert_eq!(snapshot["session"]["phase"], "silent");
        assert_eq!(snapshot["session"]["ending"], "clarity");

        let messages = state.storage.get_messages(&conversation_id).await.unwrap();
        let kinds: Vec<MessageKind> = messages.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageKind::Decision, MessageKind::Answer]);

        let stored = state.storage.latest_session(&conversation_id).await.unwrap().unwrap();
        assert_eq!(stored.phase, "silent");
        assert_eq!(stored.ending.as_deref(), Some("clarity"));
    }

    #[tokio::test]
    async fn test_events_out_of_phase_are_ignored_not_errors() {
        let (server, _) = offline_server().await;

        let answered = call_tool(
            &server,
            1,
            "field_answer",
            json!({ "node_id": "nope", "answer": "Something" }),
        )
        .await;
        assert_eq!(answered["outcome"], "ignored");
        assert!(answered["reason"].as_str().unwrap().contains("idle"));

        let reopened = call_tool(&server, 2, "field_reopen", json!({})).await;
        assert_eq!(reopened["outcome"], "ignored");
    }

    #[tokio::test]
    async fn test_reset_switches_conversation() {
        let (server, _) = offline_server().await;
        call_tool(&server, 1, "field_submit_decision", json!({ "decision": "Move?" })).await;

        let fresh = call_tool(&server, 2, "field_reset", json!({ "conversation_id": "conv-next" })).await;
        assert_eq!(fresh["conversation_id"], "conv-next");
        assert_eq!(fresh["phase"], "idle");

        let snapshot = call_tool(&server, 3, "field_snapshot", json!({})).await;
        assert_eq!(snapshot["nodes"], json!([]));
    }

    #[tokio::test]
    async fn test_affinity_and_boost_tools() {
        let (server, state) = offline_server().await;
        call_tool(&server, 1, "field_submit_decision", json!({ "decision": "Sell the house?" })).await;
        let ids = state.machine.snapshot().await.field.ids();

        let linked = call_tool(
            &server,
            2,
            "field_update_affinity",
            json!({ "a": ids[0], "b": ids[1], "score": 1.4 }),
        )
        .await;
        assert_eq!(linked["outcome"], "applied");
        assert_eq!(linked["result"], 1.0);

        let boosted = call_tool(&server, 3, "field_boost_node", json!({ "node_id": ids[2], "amount": 0.1 })).await;
        assert_eq!(boosted["outcome"], "applied");
        assert!(boosted["result"].as_f64().unwrap() > 0.8);

        let missing = call_tool(&server, 4, "field_boost_node", json!({ "node_id": "gone", "amount": 0.1 })).await;
        assert_eq!(missing["outcome"], "ignored");
    }

    #[tokio::test]
    async fn test_bad_arguments_surface_as_tool_error() {
        let (server, _) = offline_server().await;

        let response = send(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "tools/call",
                "params": { "name": "field_update_leaning", "arguments": { "direction": "stay" } }
            }),
        )
        .await
        .unwrap();
        assert_valid_jsonrpc_response(&response);
        assert_eq!(response["result"]["isError"], true);
    }
}
