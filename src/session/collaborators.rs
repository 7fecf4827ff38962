//! Narrow async contracts for everything the state machine does not own:
//! AI question generation, answer analysis, merge detection, confirmation
//! drafting, insight generation and persistence.
//!
//! The offline implementations always fail (or do nothing), which routes
//! the machine through its local fallbacks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::DecisionSession;
use crate::error::{FieldError, FieldResult};
use crate::field::{draft_confirmation, ThoughtNode, TopicKey};
use crate::storage::MessageEntry;

// ============================================================================
// Collaborator payloads
// ============================================================================

/// A question proposed by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub topic: TopicKey,
    pub question: String,
    #[serde(default)]
    pub concept: Option<String>,
}

impl GeneratedQuestion {
    pub fn new(topic: TopicKey, question: impl Into<String>) -> Self {
        Self {
            topic,
            question: question.into(),
            concept: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaningHint {
    pub direction: String,
    pub confidence: f64,
}

/// What an answer revealed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerAnalysis {
    #[serde(default)]
    pub concept: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub leaning: Option<LeaningHint>,
    #[serde(default)]
    pub needs_follow_up: bool,
    #[serde(default)]
    pub follow_up_question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeVerdict {
    pub should_merge: bool,
    #[serde(default)]
    pub insight: String,
    #[serde(default)]
    pub confidence: f64,
}

// ============================================================================
// Contracts
// ============================================================================

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Opening questions for a decision statement.
    async fn generate(&self, session_id: &str, decision: &str) -> FieldResult<Vec<GeneratedQuestion>>;

    /// A fresh question replacing one the user threw away.
    async fn replace(
        &self,
        session_id: &str,
        decision: &str,
        discarded: &ThoughtNode,
    ) -> FieldResult<GeneratedQuestion>;
}

#[async_trait]
pub trait AnswerAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        session_id: &str,
        node_id: &str,
        question: &str,
        answer: &str,
    ) -> FieldResult<AnswerAnalysis>;
}

#[async_trait]
pub trait MergeDetector: Send + Sync {
    async fn detect(&self, session_id: &str, a: &ThoughtNode, b: &ThoughtNode) -> FieldResult<MergeVerdict>;
}

#[async_trait]
pub trait ConfirmationDrafter: Send + Sync {
    async fn draft(&self, session: &DecisionSession, nodes: &[ThoughtNode]) -> FieldResult<String>;
}

#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, session: &DecisionSession, answered: &[ThoughtNode]) -> FieldResult<String>;
}

/// Persistence boundary: the machine triggers writes, it does not own storage.
#[async_trait]
pub trait SessionRecorder: Send + Sync {
    async fn append_message(&self, entry: MessageEntry) -> FieldResult<()>;
    async fn save_session(&self, session: DecisionSession) -> FieldResult<()>;
}

// ============================================================================
// Local fallbacks
// ============================================================================

/// Default opening triad used when generation fails.
pub fn fallback_triad() -> Vec<GeneratedQuestion> {
    [TopicKey::Reality, TopicKey::Values, TopicKey::Options]
        .into_iter()
        .map(|topic| GeneratedQuestion::new(topic, fallback_question(topic)))
        .collect()
}

/// Template question for a topic.
pub fn fallback_question(topic: TopicKey) -> &'static str {
    match topic {
        TopicKey::Reality => "What is actually true about your situation right now?",
        TopicKey::Values => "What matters most to you in this decision?",
        TopicKey::Options => "Which paths are open to you, including ones you haven't named yet?",
        TopicKey::Feelings => "How do you feel when you imagine each outcome?",
    }
}

fn offline(collaborator: &str) -> FieldError {
    FieldError::Collaborator {
        collaborator: collaborator.to_string(),
        message: "running offline".to_string(),
    }
}

/// Collaborator that is never reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[async_trait]
impl QuestionGenerator for Offline {
    async fn generate(&self, _session_id: &str, _decision: &str) -> FieldResult<Vec<GeneratedQuestion>> {
        Err(offline("question_generation"))
    }

    async fn replace(
        &self,
        _session_id: &str,
        _decision: &str,
        _discarded: &ThoughtNode,
    ) -> FieldResult<GeneratedQuestion> {
        Err(offline("question_generation"))
    }
}

#[async_trait]
impl AnswerAnalyzer for Offline {
    async fn analyze(&self, _: &str, _: &str, _: &str, _: &str) -> FieldResult<AnswerAnalysis> {
        Err(offline("answer_analysis"))
    }
}

#[async_trait]
impl MergeDetector for Offline {
    async fn detect(&self, _: &str, _: &ThoughtNode, _: &ThoughtNode) -> FieldResult<MergeVerdict> {
        Err(offline("merge_detection"))
    }
}

#[async_trait]
impl SessionRecorder for Offline {
    async fn append_message(&self, _entry: MessageEntry) -> FieldResult<()> {
        Ok(())
    }

    async fn save_session(&self, _session: DecisionSession) -> FieldResult<()> {
        Ok(())
    }
}

/// Confirmation drafted from the explored topics, no AI involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDrafter;

#[async_trait]
impl ConfirmationDrafter for TemplateDrafter {
    async fn draft(&self, _session: &DecisionSession, nodes: &[ThoughtNode]) -> FieldResult<String> {
        Ok(draft_confirmation(nodes))
    }
}

/// The full set of collaborators a [`super::SessionMachine`] talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub questions: Arc<dyn QuestionGenerator>,
    pub analyzer: Arc<dyn AnswerAnalyzer>,
    pub merges: Arc<dyn MergeDetector>,
    pub drafter: Arc<dyn ConfirmationDrafter>,
    pub insights: Option<Arc<dyn InsightGenerator>>,
    pub recorder: Arc<dyn SessionRecorder>,
}

impl Collaborators {
    /// No network and no storage: every AI call takes its fallback path.
    pub fn offline() -> Self {
        Self {
            questions: Arc::new(Offline),
            analyzer: Arc::new(Offline),
            merges: Arc::new(Offline),
            drafter: Arc::new(TemplateDrafter),
            insights: None,
            recorder: Arc::new(Offline),
        }
    }

    pub fn with_questions(mut self, questions: Arc<dyn QuestionGenerator>) -> Self {
        self.questions = questions;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn AnswerAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_merges(mut self, merges: Arc<dyn MergeDetector>) -> Self {
        self.merges = merges;
        self
    }

    pub fn with_drafter(mut self, drafter: Arc<dyn ConfirmationDrafter>) -> Self {
        self.drafter = drafter;
        self
    }

    pub fn with_insights(mut self, insights: Arc<dyn InsightGenerator>) -> Self {
        self.insights = Some(insights);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn SessionRecorder>) -> Self {
        self.recorder = recorder;
        self
    }
}
