//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// JSON-RPC error codes used by the server.
pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub tools: ToolCapabilities,
}

#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Capabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until EOF.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Tension field MCP server starting...");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            if let Some(response) = self.handle_line(trimmed).await {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one raw request line. `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e)))
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" => {
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        METHOD_NOT_FOUND,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "tension-field".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e))
            }
        }
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");
        JsonRpcResponse::success(id, serde_json::json!({ "tools": all_tools() }))
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let (content, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    });
                    (
                        ToolResultContent {
                            content_type: "text".to_string(),
                            text,
                        },
                        None,
                    )
                }
                Err(e) => (
                    ToolResultContent {
                        content_type: "text".to_string(),
                        text: format!("Error: {}", e),
                    },
                    Some(true),
                ),
            };

        let tool_result = ToolCallResult {
            content: vec![content],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e))
            }
        }
    }
}

// ============================================================================
// Tool definitions
// ============================================================================

/// Every tool the server exposes.
pub fn all_tools() -> Vec<Tool> {
    vec![
        get_submit_decision_tool(),
        get_select_node_tool(),
        get_answer_tool(),
        get_answer_satellite_tool(),
        get_merge_tool(),
        get_check_merge_tool(),
        get_update_leaning_tool(),
        get_update_affinity_tool(),
        get_boost_node_tool(),
        get_throw_tool(),
        get_end_session_tool(),
        get_reopen_tool(),
        get_snapshot_tool(),
        get_reset_tool(),
    ]
}

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn no_arguments() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

fn get_submit_decision_tool() -> Tool {
    tool(
        "field_submit_decision",
        "Start exploring a decision. Spawns the opening question nodes (idle sessions only).",
        serde_json::json!({
            "type": "object",
            "properties": {
                "decision": {
                    "type": "string",
                    "description": "The decision statement, in the person's own words"
                }
            },
            "required": ["decision"],
            "additionalProperties": false
        }),
    )
}

fn get_select_node_tool() -> Tool {
    tool(
        "field_select_node",
        "Focus a node: it becomes the single probing node and its answer timer starts.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string", "description": "Node to probe" }
            },
            "required": ["node_id"],
            "additionalProperties": false
        }),
    )
}

fn get_answer_tool() -> Tool {
    tool(
        "field_answer",
        "Answer a node's question. Resolves the node, extracts behavior signals and may spawn a follow-up satellite.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string", "description": "Node being answered" },
                "answer": { "type": "string", "description": "The person's answer" }
            },
            "required": ["node_id", "answer"],
            "additionalProperties": false
        }),
    )
}

fn get_answer_satellite_tool() -> Tool {
    tool(
        "field_answer_satellite",
        "Answer a follow-up satellite and close its open loop.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "parent_id": { "type": "string", "description": "Node the satellite orbits" },
                "satellite_id": { "type": "string", "description": "Satellite being answered" },
                "answer": { "type": "string", "description": "The person's answer" }
            },
            "required": ["parent_id", "satellite_id", "answer"],
            "additionalProperties": false
        }),
    )
}

fn merge_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "a": { "type": "string", "description": "Surviving node id" },
            "b": { "type": "string", "description": "Node folded into a" },
            "insight": { "type": "string", "description": "Optional sentence naming the shared tension" }
        },
        "required": ["a", "b"],
        "additionalProperties": false
    })
}

fn get_merge_tool() -> Tool {
    tool(
        "field_merge",
        "Merge two nodes that express the same tension. May move the session to settling.",
        merge_schema(),
    )
}

fn get_check_merge_tool() -> Tool {
    tool(
        "field_check_merge",
        "Ask the merge detector whether two nodes express the same tension, merging them if so.",
        merge_schema(),
    )
}

fn get_update_leaning_tool() -> Tool {
    tool(
        "field_update_leaning",
        "Nudge the damped leaning toward a direction. Shifts are capped per update.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "direction": { "type": "string", "description": "Short label for the leaning" },
                "confidence": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Target confidence (0.0-1.0)"
                }
            },
            "required": ["direction", "confidence"],
            "additionalProperties": false
        }),
    )
}

fn get_update_affinity_tool() -> Tool {
    tool(
        "field_update_affinity",
        "Override how related two nodes are. The score replaces the topic and concept heuristics for that pair.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "a": { "type": "string", "description": "First node id" },
                "b": { "type": "string", "description": "Second node id" },
                "score": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Relatedness (0.0-1.0); 0 removes attraction between them"
                }
            },
            "required": ["a", "b", "score"],
            "additionalProperties": false
        }),
    )
}

fn get_boost_node_tool() -> Tool {
    tool(
        "field_boost_node",
        "Raise a node's intensity, keeping it clear of the fade policy.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string", "description": "Node to boost" },
                "amount": {
                    "type": "number",
                    "exclusiveMinimum": 0,
                    "maximum": 1,
                    "description": "Intensity to add; the result is capped at 1.0"
                }
            },
            "required": ["node_id", "amount"],
            "additionalProperties": false
        }),
    )
}

fn get_throw_tool() -> Tool {
    tool(
        "field_throw",
        "Release a dragged node. Fast left throws dismiss it, fast right throws regenerate it, slow drags reposition it.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": { "type": "string", "description": "Dragged node" },
                "samples": {
                    "type": "array",
                    "description": "Pointer samples of the drag, oldest first",
                    "items": {
                        "type": "object",
                        "properties": {
                            "x": { "type": "number" },
                            "y": { "type": "number" },
                            "t_ms": { "type": "integer", "description": "Timestamp in milliseconds" }
                        },
                        "required": ["x", "y", "t_ms"]
                    }
                }
            },
            "required": ["node_id", "samples"],
            "additionalProperties": false
        }),
    )
}

fn get_end_session_tool() -> Tool {
    tool(
        "field_end_session",
        "End the session with a terminal classification. The field goes silent.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "ending": {
                    "type": "string",
                    "enum": ["clarity", "conditional_clarity", "rest"],
                    "description": "How the session ended"
                }
            },
            "required": ["ending"],
            "additionalProperties": false
        }),
    )
}

fn get_reopen_tool() -> Tool {
    tool(
        "field_reopen",
        "Reopen a silent session and resume exploring.",
        no_arguments(),
    )
}

fn get_snapshot_tool() -> Tool {
    tool(
        "field_snapshot",
        "Current consistent view of the session, nodes, clusters, leaning and pending confirmation.",
        no_arguments(),
    )
}

fn get_reset_tool() -> Tool {
    tool(
        "field_reset",
        "Discard the current session and start a fresh idle one.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "conversation_id": {
                    "type": "string",
                    "description": "Optional conversation to attach the new session to"
                }
            },
            "additionalProperties": false
        }),
    )
}
