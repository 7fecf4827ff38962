//! Unit tests for storage types and builder patterns.

use super::*;
use serde_json::json;

// ============================================================================
// MessageEntry tests
// ============================================================================

#[test]
fn test_message_entry_new() {
    let entry = MessageEntry::new("conv-1", MessageKind::Decision, "Should I move?");
    assert!(!entry.id.is_empty());
    assert_eq!(entry.conversation_id, "conv-1");
    assert_eq!(entry.kind, MessageKind::Decision);
    assert!(entry.session_id.is_none());
    assert!(entry.node_id.is_none());
}

#[test]
fn test_message_entry_builders() {
    let entry = MessageEntry::new("conv-1", MessageKind::Answer, "Savings for six months")
        .with_session("sess-1")
        .with_node("node-1");
    assert_eq!(entry.session_id.as_deref(), Some("sess-1"));
    assert_eq!(entry.node_id.as_deref(), Some("node-1"));
}

#[test]
fn test_message_kind_round_trip_strings() {
    for kind in [MessageKind::Decision, MessageKind::Answer, MessageKind::SatelliteAnswer] {
        assert_eq!(kind.as_str().parse::<MessageKind>(), Ok(kind));
        assert_eq!(kind.to_string(), kind.as_str());
    }
    assert!("shout".parse::<MessageKind>().is_err());
}

#[test]
fn test_message_kind_serializes_snake_case() {
    assert_eq!(
        serde_json::to_value(MessageKind::SatelliteAnswer).unwrap(),
        json!("satellite_answer")
    );
}

// ============================================================================
// Invocation tests
// ============================================================================

#[test]
fn test_invocation_new() {
    let inv = Invocation::new("question_generation", json!({"decision": "move?"}));
    assert!(!inv.id.is_empty());
    assert_eq!(inv.tool_name, "question_generation");
    assert!(inv.success);
    assert!(inv.output.is_none());
    assert!(inv.latency_ms.is_none());
}

#[test]
fn test_invocation_success() {
    let inv = Invocation::new("merge_detection", json!({}))
        .with_session("sess-1")
        .with_pipe("field-merge-detection-v1")
        .success(json!({"should_merge": true}), 120);
    assert!(inv.success);
    assert_eq!(inv.latency_ms, Some(120));
    assert_eq!(inv.pipe_name.as_deref(), Some("field-merge-detection-v1"));
    assert_eq!(inv.session_id.as_deref(), Some("sess-1"));
}

#[test]
fn test_invocation_failure() {
    let inv = Invocation::new("answer_analysis", json!({})).failure("timeout", 30000);
    assert!(!inv.success);
    assert_eq!(inv.error.as_deref(), Some("timeout"));
    assert!(inv.output.is_none());
}
