//! Decision sessions: the aggregate root, its copy-on-write store, the phase
//! state machine and the collaborators it drives.

pub mod collaborators;
pub mod machine;
pub mod pipes;
pub mod runner;
pub mod store;

pub use collaborators::{
    AnswerAnalysis, AnswerAnalyzer, Collaborators, ConfirmationDrafter, GeneratedQuestion,
    InsightGenerator, LeaningHint, MergeDetector, MergeVerdict, QuestionGenerator, SessionRecorder,
};
pub use machine::{
    AnswerOutcome, EventOutcome, FieldEvent, GenerationOutcome, MergeOutcome, SessionMachine,
};
pub use pipes::{LangbasePipes, PipeCore, StorageRecorder};
pub use runner::{spawn_tick_loop, InsightWatcher};
pub use store::{FieldSnapshot, FieldStore, SessionState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field::{NodeId, OpenLoop};

/// Top-level lifecycle of a decision session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Intake,
    Exploring,
    Settling,
    Silent,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Intake => "intake",
            Phase::Exploring => "exploring",
            Phase::Settling => "settling",
            Phase::Silent => "silent",
        }
    }

    /// Whether the simulation advances in this phase.
    pub fn is_simulated(&self) -> bool {
        *self == Phase::Exploring
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Phase::Idle),
            "intake" => Ok(Phase::Intake),
            "exploring" => Ok(Phase::Exploring),
            "settling" => Ok(Phase::Settling),
            "silent" => Ok(Phase::Silent),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}

/// Terminal classification recorded when a session goes silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ending {
    Clarity,
    ConditionalClarity,
    Rest,
}

impl Ending {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ending::Clarity => "clarity",
            Ending::ConditionalClarity => "conditional_clarity",
            Ending::Rest => "rest",
        }
    }
}

impl std::fmt::Display for Ending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Ending {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clarity" => Ok(Ending::Clarity),
            "conditional_clarity" => Ok(Ending::ConditionalClarity),
            "rest" => Ok(Ending::Rest),
            _ => Err(format!("Unknown ending: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    DecisionSubmitted,
    NodeResolved,
    NodesMerged,
    SatelliteAnswered,
    NodeThrown,
    ConfirmationOffered,
    SessionEnded,
    Reopened,
}

/// One entry of the session's milestone trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub kind: MilestoneKind,
    #[serde(default)]
    pub node_ids: Vec<NodeId>,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

impl Milestone {
    pub fn new(kind: MilestoneKind, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            node_ids: Vec::new(),
            note: None,
            at,
        }
    }

    pub fn with_nodes(mut self, ids: &[&str]) -> Self {
        self.node_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// The aggregate root of one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSession {
    pub id: String,
    pub conversation_id: String,
    pub phase: Phase,
    /// The decision statement as submitted.
    pub decision: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub open_loops: Vec<OpenLoop>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    pub ending: Option<Ending>,
}

impl DecisionSession {
    pub fn new(conversation_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            phase: Phase::Idle,
            decision: None,
            created_at: now,
            updated_at: now,
            constraints: Vec::new(),
            assumptions: Vec::new(),
            options: Vec::new(),
            insights: Vec::new(),
            open_loops: Vec::new(),
            milestones: Vec::new(),
            ending: None,
        }
    }

    /// Move to `phase`, stamping `updated_at`. Returns the previous phase.
    pub fn transition(&mut self, phase: Phase, now: DateTime<Utc>) -> Phase {
        let previous = self.phase;
        self.phase = phase;
        self.updated_at = now;
        previous
    }

    pub fn record(&mut self, milestone: Milestone) {
        self.updated_at = milestone.at.max(self.updated_at);
        self.milestones.push(milestone);
    }

    pub fn has_open_loops(&self) -> bool {
        self.open_loops.iter().any(|l| l.is_open())
    }

    /// Append items not already present, preserving order.
    pub fn absorb(target: &mut Vec<String>, items: &[String]) {
        for item in items {
            let item = item.trim();
            if !item.is_empty() && !target.iter().any(|t| t.eq_ignore_ascii_case(item)) {
                target.push(item.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_session_is_idle() {
        let session = DecisionSession::new("conv-1", Utc::now());
        assert_eq!(session.phase, Phase::Idle);
        assert!(session.ending.is_none());
        assert!(!session.has_open_loops());
    }

    #[test]
    fn test_transition_stamps_updated_at() {
        let t0 = Utc::now();
        let mut session = DecisionSession::new("conv-1", t0);
        let t1 = t0 + Duration::seconds(3);
        assert_eq!(session.transition(Phase::Intake, t1), Phase::Idle);
        assert_eq!(session.phase, Phase::Intake);
        assert_eq!(session.updated_at, t1);
    }

    #[test]
    fn test_absorb_dedupes() {
        let mut items = vec!["Rent".to_string()];
        DecisionSession::absorb(&mut items, &["rent".into(), " ".into(), "visa".into()]);
        assert_eq!(items, vec!["Rent".to_string(), "visa".to_string()]);
    }

    #[test]
    fn test_phase_and_ending_strings() {
        assert_eq!("SETTLING".parse::<Phase>(), Ok(Phase::Settling));
        assert_eq!(Phase::Silent.to_string(), "silent");
        assert!(Phase::Exploring.is_simulated());
        assert!(!Phase::Settling.is_simulated());
        assert_eq!(
            "conditional_clarity".parse::<Ending>(),
            Ok(Ending::ConditionalClarity)
        );
        assert!("maybe".parse::<Ending>().is_err());
    }
}
