//! Langbase-backed collaborators and the SQLite session recorder.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::collaborators::{
    AnswerAnalysis, AnswerAnalyzer, ConfirmationDrafter, GeneratedQuestion, InsightGenerator,
    MergeDetector, MergeVerdict, QuestionGenerator, SessionRecorder,
};
use super::DecisionSession;
use crate::config::PipeConfig;
use crate::error::{FieldError, FieldResult, LangbaseResult};
use crate::field::{ThoughtNode, TopicKey};
use crate::langbase::{extract_json_from_completion, LangbaseClient, Message, PipeRequest};
use crate::prompts::{
    ANSWER_ANALYSIS_PROMPT, CONFIRMATION_PROMPT, INSIGHT_PROMPT, MERGE_DETECTION_PROMPT,
    QUESTION_GENERATION_PROMPT,
};
use crate::storage::{Invocation, MessageEntry, SqliteStorage, Storage, StoredSession};

/// Storage and Langbase client shared by the pipe-backed collaborators.
#[derive(Clone)]
pub struct PipeCore {
    storage: SqliteStorage,
    langbase: LangbaseClient,
}

impl PipeCore {
    pub fn new(storage: SqliteStorage, langbase: LangbaseClient) -> Self {
        Self { storage, langbase }
    }

    #[inline]
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    #[inline]
    pub fn langbase(&self) -> &LangbaseClient {
        &self.langbase
    }
}

// ============================================================================
// Pipe payloads
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct QuestionsPayload {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawQuestion {
    topic: String,
    question: String,
    #[serde(default)]
    concept: Option<String>,
}

impl QuestionsPayload {
    /// Keep questions with a known topic and non-empty text.
    fn into_questions(self) -> Vec<GeneratedQuestion> {
        self.questions
            .into_iter()
            .filter_map(|raw| {
                let topic: TopicKey = match raw.topic.parse() {
                    Ok(topic) => topic,
                    Err(e) => {
                        debug!(error = %e, "Skipping generated question");
                        return None;
                    }
                };
                let question = raw.question.trim();
                if question.is_empty() {
                    return None;
                }
                Some(GeneratedQuestion {
                    topic,
                    question: question.to_string(),
                    concept: raw.concept.filter(|c| !c.trim().is_empty()),
                })
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StatementPayload {
    statement: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InsightPayload {
    insight: String,
    #[serde(default)]
    confidence: f64,
}

fn describe_nodes(nodes: &[ThoughtNode]) -> String {
    nodes
        .iter()
        .map(|n| match &n.answer {
            Some(answer) => format!("- [{}] {}\n  answer: {}", n.topic, n.question, answer),
            None => format!("- [{}] {}", n.topic, n.question),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// LangbasePipes
// ============================================================================

/// All five AI collaborators, each backed by one Langbase pipe.
#[derive(Clone)]
pub struct LangbasePipes {
    core: PipeCore,
    pipes: PipeConfig,
}

impl LangbasePipes {
    pub fn new(core: PipeCore, pipes: PipeConfig) -> Self {
        Self { core, pipes }
    }

    /// Create or update every pipe with its system prompt.
    pub async fn ensure_pipes(&self) -> LangbaseResult<()> {
        let client = self.core.langbase();
        for (name, description, prompt) in [
            (&self.pipes.questions, "Opening questions for a decision", QUESTION_GENERATION_PROMPT),
            (&self.pipes.answers, "Answer analysis", ANSWER_ANALYSIS_PROMPT),
            (&self.pipes.merge, "Merge detection", MERGE_DETECTION_PROMPT),
            (&self.pipes.confirmation, "Soft confirmation", CONFIRMATION_PROMPT),
            (&self.pipes.insight, "Cross-answer insight", INSIGHT_PROMPT),
        ] {
            client.ensure_pipe(name, description, prompt).await?;
        }
        info!("Langbase pipes ready");
        Ok(())
    }

    /// Call `pipe`, parse its JSON completion into `T` and record the invocation.
    async fn run_pipe<T, I>(
        &self,
        session_id: &str,
        tool_name: &str,
        pipe: &str,
        input: &I,
        messages: Vec<Message>,
    ) -> FieldResult<T>
    where
        T: DeserializeOwned + Serialize,
        I: Serialize + ?Sized,
    {
        let start = Instant::now();
        let mut invocation = Invocation::new(tool_name, serde_json::to_value(input).unwrap_or_default())
            .with_session(session_id)
            .with_pipe(pipe);

        let result = self.call::<T>(pipe, messages).await;
        let latency = start.elapsed().as_millis() as i64;

        invocation = match &result {
            Ok(value) => invocation.success(serde_json::to_value(value).unwrap_or_default(), latency),
            Err(e) => invocation.failure(e.clone(), latency),
        };
        if let Err(e) = self.core.storage().log_invocation(&invocation).await {
            warn!(tool = %tool_name, error = %e, "Failed to log invocation");
        }

        match &result {
            Ok(_) => debug!(session_id = %session_id, tool = %tool_name, latency_ms = latency, "Pipe call completed"),
            Err(e) => warn!(session_id = %session_id, tool = %tool_name, latency_ms = latency, error = %e, "Pipe call failed"),
        }

        result.map_err(|message| FieldError::Collaborator {
            collaborator: tool_name.to_string(),
            message,
        })
    }

    async fn call<T: DeserializeOwned>(&self, pipe: &str, messages: Vec<Message>) -> Result<T, String> {
        let response = self
            .core
            .langbase()
            .call_pipe(PipeRequest::new(pipe, messages))
            .await
            .map_err(|e| e.to_string())?;
        let json = extract_json_from_completion(&response.completion)?;
        serde_json::from_str(json).map_err(|e| format!("Invalid JSON from {}: {}", pipe, e))
    }
}

#[async_trait]
impl QuestionGenerator for LangbasePipes {
    async fn generate(&self, session_id: &str, decision: &str) -> FieldResult<Vec<GeneratedQuestion>> {
        let messages = vec![
            Message::system(QUESTION_GENERATION_PROMPT),
            Message::user(format!("Decision: {}", decision)),
        ];
        let payload: QuestionsPayload = self
            .run_pipe(
                session_id,
                "field.questions",
                &self.pipes.questions,
                &serde_json::json!({ "decision": decision }),
                messages,
            )
            .await?;
        Ok(payload.into_questions())
    }

    async fn replace(
        &self,
        session_id: &str,
        decision: &str,
        discarded: &ThoughtNode,
    ) -> FieldResult<GeneratedQuestion> {
        let messages = vec![
            Message::system(QUESTION_GENERATION_PROMPT),
            Message::user(format!(
                "Decision: {}\n\nThe person set this {} question aside: \"{}\"\nReturn a single different question about {} in the same format.",
                decision, discarded.topic, discarded.question, discarded.topic
            )),
        ];
        let payload: QuestionsPayload = self
            .run_pipe(
                session_id,
                "field.questions.replace",
                &self.pipes.questions,
                &serde_json::json!({ "decision": decision, "discarded": discarded.question }),
                messages,
            )
            .await?;

        payload
            .into_questions()
            .into_iter()
            .find(|q| q.question != discarded.question)
            .ok_or_else(|| FieldError::Collaborator {
                collaborator: "field.questions.replace".to_string(),
                message: "no usable replacement question".to_string(),
            })
    }
}

#[async_trait]
impl AnswerAnalyzer for LangbasePipes {
    async fn analyze(
        &self,
        session_id: &str,
        node_id: &str,
        question: &str,
        answer: &str,
    ) -> FieldResult<AnswerAnalysis> {
        let messages = vec![
            Message::system(ANSWER_ANALYSIS_PROMPT),
            Message::user(format!("Question: {}\nAnswer: {}", question, answer)),
        ];
        self.run_pipe(
            session_id,
            "field.answers",
            &self.pipes.answers,
            &serde_json::json!({ "node_id": node_id, "question": question, "answer": answer }),
            messages,
        )
        .await
    }
}

#[async_trait]
impl MergeDetector for LangbasePipes {
    async fn detect(&self, session_id: &str, a: &ThoughtNode, b: &ThoughtNode) -> FieldResult<MergeVerdict> {
        let pair = [a.clone(), b.clone()];
        let messages = vec![
            Message::system(MERGE_DETECTION_PROMPT),
            Message::user(describe_nodes(&pair)),
        ];
        self.run_pipe(
            session_id,
            "field.merge",
            &self.pipes.merge,
            &serde_json::json!({ "a": a.id, "b": b.id }),
            messages,
        )
        .await
    }
}

#[async_trait]
impl ConfirmationDrafter for LangbasePipes {
    async fn draft(&self, session: &DecisionSession, nodes: &[ThoughtNode]) -> FieldResult<String> {
        let answered: Vec<ThoughtNode> = nodes.iter().filter(|n| n.answer.is_some()).cloned().collect();
        let messages = vec![
            Message::system(CONFIRMATION_PROMPT),
            Message::user(format!(
                "Decision: {}\n\nWhat they explored:\n{}",
                session.decision.as_deref().unwrap_or_default(),
                describe_nodes(&answered)
            )),
        ];
        let payload: StatementPayload = self
            .run_pipe(
                &session.id,
                "field.confirmation",
                &self.pipes.confirmation,
                &serde_json::json!({ "answered": answered.len() }),
                messages,
            )
            .await?;
        Ok(payload.statement)
    }
}

#[async_trait]
impl InsightGenerator for LangbasePipes {
    async fn generate(&self, session: &DecisionSession, answered: &[ThoughtNode]) -> FieldResult<String> {
        let messages = vec![
            Message::system(INSIGHT_PROMPT),
            Message::user(format!(
                "Decision: {}\n\nAnswers so far:\n{}",
                session.decision.as_deref().unwrap_or_default(),
                describe_nodes(answered)
            )),
        ];
        let payload: InsightPayload = self
            .run_pipe(
                &session.id,
                "field.insight",
                &self.pipes.insight,
                &serde_json::json!({ "answered": answered.len() }),
                messages,
            )
            .await?;
        Ok(payload.insight)
    }
}

// ============================================================================
// StorageRecorder
// ============================================================================

/// Persists the message log and session snapshots to SQLite.
#[derive(Clone)]
pub struct StorageRecorder {
    storage: SqliteStorage,
}

fn recorder_error(e: impl std::fmt::Display) -> FieldError {
    FieldError::Collaborator {
        collaborator: "recorder".to_string(),
        message: e.to_string(),
    }
}

impl StorageRecorder {
    pub fn new(storage: SqliteStorage) -> Self {
        Self { storage }
    }

    /// Load a persisted session back into the aggregate.
    pub async fn restore(&self, session_id: &str) -> FieldResult<Option<DecisionSession>> {
        let Some(stored) = self.storage.get_session(session_id).await.map_err(recorder_error)? else {
            return Ok(None);
        };
        serde_json::from_value(stored.state)
            .map(Some)
            .map_err(recorder_error)
    }
}

impl TryFrom<&DecisionSession> for StoredSession {
    type Error = serde_json::Error;

    fn try_from(session: &DecisionSession) -> Result<Self, Self::Error> {
        Ok(StoredSession {
            id: session.id.clone(),
            conversation_id: session.conversation_id.clone(),
            phase: session.phase.as_str().to_string(),
            ending: session.ending.map(|e| e.as_str().to_string()),
            state: serde_json::to_value(session)?,
            created_at: session.created_at,
            updated_at: session.updated_at,
        })
    }
}

#[async_trait]
impl SessionRecorder for StorageRecorder {
    async fn append_message(&self, entry: MessageEntry) -> FieldResult<()> {
        self.storage.append_message(&entry).await.map_err(recorder_error)
    }

    async fn save_session(&self, session: DecisionSession) -> FieldResult<()> {
        let stored = StoredSession::try_from(&session).map_err(recorder_error)?;
        self.storage.upsert_session(&stored).await.map_err(recorder_error)
    }
}
