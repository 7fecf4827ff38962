//! Storage layer for decision-session persistence.
//!
//! Holds the conversation message log (decision statements and answers),
//! upserted session snapshots, and the AI invocation log.

mod sqlite;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

// ============================================================================
// Message log
// ============================================================================

/// What kind of user input a log entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// The original decision statement.
    Decision,
    /// An answer to a thought node.
    Answer,
    /// An answer to a satellite follow-up.
    SatelliteAnswer,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Decision => "decision",
            MessageKind::Answer => "answer",
            MessageKind::SatelliteAnswer => "satellite_answer",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "decision" => Ok(MessageKind::Decision),
            "answer" => Ok(MessageKind::Answer),
            "satellite_answer" => Ok(MessageKind::SatelliteAnswer),
            _ => Err(format!("Unknown message kind: {}", s)),
        }
    }
}

/// One entry of the external message log, keyed by conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: String,
    pub conversation_id: String,
    pub session_id: Option<String>,
    pub kind: MessageKind,
    /// Node (or satellite) the message answers.
    pub node_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageEntry {
    pub fn new(conversation_id: impl Into<String>, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            session_id: None,
            kind,
            node_id: None,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

// ============================================================================
// Session snapshots
// ============================================================================

/// A persisted decision session. `state` is the full serialized aggregate;
/// the other columns are indexed copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: String,
    pub conversation_id: String,
    pub phase: String,
    pub ending: Option<String>,
    pub state: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Invocation log
// ============================================================================

/// Log entry for one AI collaborator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub id: String,
    pub session_id: Option<String>,
    /// Collaborator that made the call (e.g. "answer_analysis").
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub pipe_name: Option<String>,
    pub latency_ms: Option<i64>,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Invocation {
    pub fn new(tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            tool_name: tool_name.into(),
            input,
            output: None,
            pipe_name: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_pipe(mut self, pipe_name: impl Into<String>) -> Self {
        self.pipe_name = Some(pipe_name.into());
        self
    }

    /// Mark as successful with output
    pub fn success(mut self, output: serde_json::Value, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

// ============================================================================
// Storage trait
// ============================================================================

/// Persistence backend.
#[async_trait]
pub trait Storage: Send + Sync {
    // Message log

    /// Append an entry to a conversation's message log.
    async fn append_message(&self, entry: &MessageEntry) -> StorageResult<()>;
    /// All entries of a conversation, oldest first.
    async fn get_messages(&self, conversation_id: &str) -> StorageResult<Vec<MessageEntry>>;

    // Sessions

    /// Insert or replace a session snapshot.
    async fn upsert_session(&self, session: &StoredSession) -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<StoredSession>>;
    /// Most recently updated session of a conversation.
    async fn latest_session(&self, conversation_id: &str) -> StorageResult<Option<StoredSession>>;

    // Invocations

    /// Record an AI invocation.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
    /// Invocations of a session, oldest first.
    async fn get_invocations(&self, session_id: &str) -> StorageResult<Vec<Invocation>>;
}
