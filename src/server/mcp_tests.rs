//! Unit tests for MCP protocol implementation.
//!
//! Tests JSON-RPC 2.0 request/response handling, tool definitions,
//! and end-to-end tool calls against an offline field.

use super::*;
use crate::config::{
    Config, DatabaseConfig, FieldConfig, LangbaseConfig, LogFormat, LoggingConfig, PipeConfig,
    RequestConfig,
};
use crate::langbase::LangbaseClient;
use crate::server::AppState;
use crate::storage::SqliteStorage;
use serde_json::json;
use std::sync::Arc;

async fn offline_server() -> McpServer {
    let config = Config {
        langbase: LangbaseConfig {
            api_key: String::new(),
            base_url: "https://api.langbase.com".to_string(),
        },
        database: DatabaseConfig {
            path: ":memory:".into(),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig::default(),
        pipes: PipeConfig::default(),
        field: FieldConfig::default(),
    };
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let langbase = LangbaseClient::new(&config.langbase, config.request.clone()).unwrap();
    McpServer::new(Arc::new(AppState::new(config, storage, langbase)))
}

fn tool_text(response: &JsonRpcResponse) -> Value {
    let result = response.result.as_ref().expect("tool call result");
    let text = result["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("tool output is JSON")
}

async fn call(server: &McpServer, id: i64, name: &str, arguments: Value) -> JsonRpcResponse {
    let line = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
    .to_string();
    server.handle_line(&line).await.expect("response for request")
}

// ============================================================================
// JsonRpcResponse tests
// ============================================================================

#[test]
fn test_jsonrpc_response_success_with_id() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"result": "ok"}));

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, json!(1));
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap()["result"], "ok");
}

#[test]
fn test_jsonrpc_response_error_without_id() {
    let response = JsonRpcResponse::error(None, PARSE_ERROR, "Parse error");

    assert_eq!(response.id, Value::Null);
    assert_eq!(response.error.unwrap().code, -32700);
}

#[test]
fn test_jsonrpc_response_serialization_omits_empty_fields() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"test": true}));
    let serialized = serde_json::to_string(&response).unwrap();

    assert!(serialized.contains("\"jsonrpc\":\"2.0\""));
    assert!(!serialized.contains("\"error\""));
}

// ============================================================================
// Tool definitions
// ============================================================================

#[test]
fn test_all_tools_are_field_tools_with_object_schemas() {
    let tools = all_tools();
    assert_eq!(tools.len(), 14);

    for tool in &tools {
        assert!(tool.name.starts_with("field_"), "{}", tool.name);
        assert!(!tool.description.is_empty());
        assert_eq!(tool.input_schema["type"], "object");
    }

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    for expected in ["field_submit_decision", "field_throw", "field_snapshot", "field_reset"] {
        assert!(names.contains(&expected), "missing {}", expected);
    }
}

#[test]
fn test_tool_serializes_input_schema_camel_case() {
    let value = serde_json::to_value(get_answer_tool()).unwrap();
    assert!(value.get("inputSchema").is_some());
    assert_eq!(value["inputSchema"]["required"], json!(["node_id", "answer"]));
}

// ============================================================================
// Request handling
// ============================================================================

#[tokio::test]
async fn test_parse_error() {
    let server = offline_server().await;
    let response = server.handle_line("{not json").await.unwrap();
    assert_eq!(response.error.unwrap().code, PARSE_ERROR);
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = offline_server().await;
    let line = json!({"jsonrpc": "2.0", "method": "initialized"}).to_string();
    assert!(server.handle_line(&line).await.is_none());

    let line = json!({"jsonrpc": "2.0", "method": "whatever/else"}).to_string();
    assert!(server.handle_line(&line).await.is_none());
}

#[tokio::test]
async fn test_unknown_method() {
    let server = offline_server().await;
    let line = json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"}).to_string();
    let response = server.handle_line(&line).await.unwrap();
    assert_eq!(response.id, json!(7));
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let server = offline_server().await;
    let line = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}).to_string();
    let result = server.handle_line(&line).await.unwrap().result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "tension-field");
    assert_eq!(result["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_tools_call_missing_params() {
    let server = offline_server().await;
    let line = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call"}).to_string();
    let response = server.handle_line(&line).await.unwrap();
    assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
}

#[tokio::test]
async fn test_unknown_tool_is_error_result() {
    let server = offline_server().await;
    let response = call(&server, 3, "field_teleport", json!({})).await;
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("field_teleport"));
}

#[tokio::test]
async fn test_submit_then_snapshot_offline() {
    let server = offline_server().await;

    let submitted = tool_text(&call(&server, 1, "field_submit_decision", json!({"decision": "Should I move?"})).await);
    assert_eq!(submitted["outcome"], "applied");
    assert_eq!(submitted["result"]["source"], "fallback");

    let snapshot = tool_text(&call(&server, 2, "field_snapshot", json!({})).await);
    assert_eq!(snapshot["session"]["phase"], "exploring");
    assert_eq!(snapshot["nodes"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_event_in_wrong_phase_is_ignored_not_error() {
    let server = offline_server().await;
    let response = call(&server, 1, "field_select_node", json!({"node_id": "nope"})).await;
    let result = response.result.as_ref().unwrap();
    assert!(result.get("isError").is_none());
    assert_eq!(tool_text(&response)["outcome"], "ignored");
}
