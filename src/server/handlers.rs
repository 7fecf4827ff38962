//! Tool call routing for the `field_*` MCP tools.
//!
//! Every event tool returns the machine's [`crate::session::EventOutcome`]
//! serialized as JSON. An ignored event is a successful call whose outcome
//! says `"ignored"`; only malformed arguments produce an MCP error.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::field::PointerSample;
use crate::session::Ending;

/// Route a tool call to its handler.
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "field_submit_decision" => handle_submit_decision(state, arguments).await,
        "field_select_node" => handle_select_node(state, arguments).await,
        "field_answer" => handle_answer(state, arguments).await,
        "field_answer_satellite" => handle_answer_satellite(state, arguments).await,
        "field_merge" => handle_merge(state, arguments).await,
        "field_check_merge" => handle_check_merge(state, arguments).await,
        "field_update_leaning" => handle_update_leaning(state, arguments).await,
        "field_update_affinity" => handle_update_affinity(state, arguments).await,
        "field_boost_node" => handle_boost_node(state, arguments).await,
        "field_throw" => handle_throw(state, arguments).await,
        "field_end_session" => handle_end_session(state, arguments).await,
        "field_reopen" => handle_reopen(state).await,
        "field_snapshot" => handle_snapshot(state).await,
        "field_reset" => handle_reset(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubmitDecisionParams {
    decision: String,
}

#[derive(Debug, Deserialize)]
struct NodeParams {
    node_id: String,
}

#[derive(Debug, Deserialize)]
struct AnswerParams {
    node_id: String,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct AnswerSatelliteParams {
    parent_id: String,
    satellite_id: String,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct MergeParams {
    a: String,
    b: String,
    #[serde(default)]
    insight: String,
}

#[derive(Debug, Deserialize)]
struct LeaningParams {
    direction: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct AffinityParams {
    a: String,
    b: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct BoostParams {
    node_id: String,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct ThrowParams {
    node_id: String,
    #[serde(default)]
    samples: Vec<PointerSample>,
}

#[derive(Debug, Deserialize)]
struct EndSessionParams {
    ending: Ending,
}

#[derive(Debug, Default, Deserialize)]
struct ResetParams {
    #[serde(default)]
    conversation_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_submit_decision(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SubmitDecisionParams = parse_arguments("field.submit_decision", arguments)?;
    to_json(state.machine.submit_decision(&params.decision, Utc::now()).await)
}

async fn handle_select_node(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: NodeParams = parse_arguments("field.select_node", arguments)?;
    to_json(state.machine.select_node(&params.node_id, Utc::now()).await)
}

async fn handle_answer(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: AnswerParams = parse_arguments("field.answer", arguments)?;
    to_json(
        state
            .machine
            .answer_question(&params.node_id, &params.answer, Utc::now())
            .await,
    )
}

async fn handle_answer_satellite(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: AnswerSatelliteParams = parse_arguments("field.answer_satellite", arguments)?;
    to_json(
        state
            .machine
            .answer_satellite(&params.parent_id, &params.satellite_id, &params.answer, Utc::now())
            .await,
    )
}

async fn handle_merge(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: MergeParams = parse_arguments("field.merge", arguments)?;
    to_json(
        state
            .machine
            .trigger_merge(&params.a, &params.b, &params.insight, Utc::now())
            .await,
    )
}

async fn handle_check_merge(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: MergeParams = parse_arguments("field.check_merge", arguments)?;
    to_json(state.machine.check_merge(&params.a, &params.b, Utc::now()).await)
}

async fn handle_update_leaning(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: LeaningParams = parse_arguments("field.update_leaning", arguments)?;
    require_finite("field.update_leaning", "confidence", params.confidence)?;
    to_json(
        state
            .machine
            .update_leaning(&params.direction, params.confidence, Utc::now())
            .await,
    )
}

async fn handle_update_affinity(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: AffinityParams = parse_arguments("field.update_affinity", arguments)?;
    require_finite("field.update_affinity", "score", params.score)?;
    to_json(
        state
            .machine
            .update_affinity(&params.a, &params.b, params.score, Utc::now())
            .await,
    )
}

async fn handle_boost_node(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: BoostParams = parse_arguments("field.boost_node", arguments)?;
    require_finite("field.boost_node", "amount", params.amount)?;
    to_json(
        state
            .machine
            .boost_node(&params.node_id, params.amount, Utc::now())
            .await,
    )
}

async fn handle_throw(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: ThrowParams = parse_arguments("field.throw", arguments)?;
    to_json(
        state
            .machine
            .throw_node(&params.node_id, &params.samples, Utc::now())
            .await,
    )
}

async fn handle_end_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: EndSessionParams = parse_arguments("field.end_session", arguments)?;
    to_json(state.machine.end_session(params.ending, Utc::now()).await)
}

async fn handle_reopen(state: &SharedState) -> McpResult<Value> {
    to_json(state.machine.reopen(Utc::now()).await)
}

async fn handle_snapshot(state: &SharedState) -> McpResult<Value> {
    to_json(state.machine.snapshot().await.view())
}

async fn handle_reset(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: ResetParams = match arguments {
        Some(Value::Null) | None => ResetParams::default(),
        args => parse_arguments("field.reset", args)?,
    };
    to_json(state.machine.reset(params.conversation_id, Utc::now()).await)
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse tool arguments into a typed parameter struct.
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

fn require_finite(tool_name: &str, field: &str, value: f64) -> McpResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: format!("{} must be a finite number", field),
        })
    }
}

fn to_json<R: Serialize>(result: R) -> McpResult<Value> {
    serde_json::to_value(result).map_err(McpError::Json)
}
