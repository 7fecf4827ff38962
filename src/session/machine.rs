//! Session State Machine.
//!
//! Owns the phase transitions (idle -> intake -> exploring -> settling ->
//! silent, plus reopen) and dispatches domain events against the shared
//! [`FieldStore`]. Every mutation goes through `FieldStore::update`, so
//! the tick loop and event handlers see whole-state replacements only.
//!
//! Events that do not apply in the current phase, or that target a node
//! that no longer exists, resolve to [`EventOutcome::Ignored`]. They are
//! expected races between the UI and the field, not errors.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::collaborators::{fallback_question, fallback_triad, AnswerAnalysis, Collaborators, GeneratedQuestion, MergeVerdict};
use super::runner::InsightWatcher;
use super::store::{FieldStore, SessionState};
use super::{DecisionSession, Ending, Milestone, MilestoneKind, Phase};
use crate::config::FieldConfig;
use crate::field::convergence::{evaluate, ConvergenceInput};
use crate::field::geometry::{find_clear_position, spawn_positions};
use crate::field::satellites::{answer_satellite, spawn_satellite};
use crate::field::{
    draft_confirmation, normalize_concept, BehaviorSignal, LeaningVector, NodeId, NodeState, OpenLoop,
    PointerSample, TensionField, ThoughtNode, ThrowAction, Vec2, VelocityTracker,
};
use crate::storage::{MessageEntry, MessageKind};

/// Intensity added to a node when it is answered.
const ANSWER_BOOST: f64 = 0.2;

/// Satellite question used when analysis asks for a follow-up without one.
const DEFAULT_FOLLOW_UP: &str = "Can you say a little more about that?";

// ============================================================================
// Outcomes and events
// ============================================================================

/// Result of dispatching an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome<T> {
    Applied { result: T },
    Ignored { reason: String },
}

impl<T> EventOutcome<T> {
    pub fn applied(result: T) -> Self {
        EventOutcome::Applied { result }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, EventOutcome::Applied { .. })
    }

    pub fn into_applied(self) -> Option<T> {
        match self {
            EventOutcome::Applied { result } => Some(result),
            EventOutcome::Ignored { .. } => None,
        }
    }
}

/// Which node set was installed on submission. Both variants proceed to
/// exploring.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated { nodes: usize },
    Fallback { nodes: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    pub node_id: NodeId,
    pub signals: Vec<BehaviorSignal>,
    /// `None` when analysis failed; node state is unaffected by the failure.
    pub analysis: Option<AnswerAnalysis>,
    pub satellite_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeOutcome {
    pub surviving_id: NodeId,
    pub merged_ids: Vec<NodeId>,
    pub phase: Phase,
}

/// Notifications for consumers of the field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FieldEvent {
    PhaseChanged { from: Phase, to: Phase },
    NodesSpawned { count: usize, fallback: bool },
    NodeReplaced { discarded: NodeId, replacement: NodeId },
    ConfirmationReady { statement: String },
    InsightReady { insight: String },
}

// ============================================================================
// Machine
// ============================================================================

#[derive(Clone)]
pub struct SessionMachine {
    store: FieldStore,
    config: Arc<FieldConfig>,
    collaborators: Collaborators,
    events: broadcast::Sender<FieldEvent>,
    insight: InsightWatcher,
}

type Guard<T> = Result<T, String>;

fn require_phase(state: &SessionState, allowed: &[Phase]) -> Guard<()> {
    if allowed.contains(&state.phase()) {
        Ok(())
    } else {
        Err(format!("not allowed while {}", state.phase()))
    }
}

fn live_node<'a>(state: &'a SessionState, id: &str) -> Guard<&'a ThoughtNode> {
    match state.field.node(id) {
        None => Err(format!("unknown node {}", id)),
        Some(node) if node.state.is_gone() => Err(format!("node {} is {}", id, node.state)),
        Some(node) => Ok(node),
    }
}

impl SessionMachine {
    pub fn new(config: FieldConfig, collaborators: Collaborators, conversation_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store: FieldStore::new(SessionState::new(conversation_id, Utc::now())),
            config: Arc::new(config),
            collaborators,
            events,
            insight: InsightWatcher::new(),
        }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    pub async fn snapshot(&self) -> Arc<SessionState> {
        self.store.snapshot().await
    }

    pub async fn phase(&self) -> Phase {
        self.store.snapshot().await.phase()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FieldEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: FieldEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn ignored<T>(&self, event: &str, reason: impl Into<String>) -> EventOutcome<T> {
        let reason = reason.into();
        debug!(event = %event, reason = %reason, "Event ignored");
        EventOutcome::Ignored { reason }
    }

    fn announce(&self, session_id: &str, from: Phase, to: Phase) {
        info!(session_id = %session_id, from = %from, to = %to, "Phase transition");
        self.emit(FieldEvent::PhaseChanged { from, to });
    }

    async fn persist(&self) {
        let session = self.store.snapshot().await.session.clone();
        let session_id = session.id.clone();
        if let Err(e) = self.collaborators.recorder.save_session(session).await {
            warn!(session_id = %session_id, error = %e, "Failed to persist session snapshot");
        }
    }

    async fn record_message(&self, entry: MessageEntry) {
        let kind = entry.kind;
        if let Err(e) = self.collaborators.recorder.append_message(entry).await {
            warn!(kind = %kind, error = %e, "Failed to append message");
        }
    }

    fn spawn_nodes(&self, questions: &[GeneratedQuestion], now: DateTime<Utc>) -> Vec<ThoughtNode> {
        let positions = spawn_positions(
            Vec2::ZERO,
            questions.len(),
            self.config.spawn_radius,
            self.config.spawn_jitter,
            &mut rand::thread_rng(),
        );
        questions
            .iter()
            .zip(positions)
            .map(|(q, position)| {
                let node = ThoughtNode::new(q.question.clone(), q.topic, position, now);
                match &q.concept {
                    Some(concept) => node.with_concept(concept),
                    None => node,
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // submitDecision
    // ------------------------------------------------------------------------

    /// Idle -> intake -> exploring. Generation failure installs the fallback
    /// triad; the session never stays in intake.
    pub async fn submit_decision(&self, text: &str, now: DateTime<Utc>) -> EventOutcome<GenerationOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return self.ignored("submit_decision", "empty decision statement");
        }

        let entered = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Idle])?;
                s.session.decision = Some(text.to_string());
                s.session.transition(Phase::Intake, now);
                s.session
                    .record(Milestone::new(MilestoneKind::DecisionSubmitted, now).with_note(text));
                Ok((s.session.id.clone(), s.session.conversation_id.clone()))
            })
            .await;
        let (session_id, conversation_id) = match entered {
            Ok(ids) => ids,
            Err(reason) => return self.ignored("submit_decision", reason),
        };
        self.announce(&session_id, Phase::Idle, Phase::Intake);

        self.record_message(
            MessageEntry::new(&conversation_id, MessageKind::Decision, text).with_session(&session_id),
        )
        .await;

        let (questions, outcome) = match self.collaborators.questions.generate(&session_id, text).await {
            Ok(questions) if !questions.is_empty() => {
                let nodes = questions.len();
                (questions, GenerationOutcome::Generated { nodes })
            }
            Ok(_) => {
                warn!(session_id = %session_id, "Question generation returned nothing, using fallback triad");
                let questions = fallback_triad();
                let nodes = questions.len();
                (
                    questions,
                    GenerationOutcome::Fallback {
                        nodes,
                        reason: "no questions returned".to_string(),
                    },
                )
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Question generation failed, using fallback triad");
                let questions = fallback_triad();
                let nodes = questions.len();
                (
                    questions,
                    GenerationOutcome::Fallback {
                        nodes,
                        reason: e.to_string(),
                    },
                )
            }
        };

        let nodes = self.spawn_nodes(&questions, now);
        let count = nodes.len();
        let installed = self
            .store
            .update(|s| {
                if s.session.id != session_id || s.phase() != Phase::Intake {
                    return false;
                }
                s.field = TensionField::with_nodes(nodes);
                s.session.transition(Phase::Exploring, now);
                s.behavior.start_tracking(now);
                true
            })
            .await;
        if !installed {
            return self.ignored("submit_decision", "session changed while generating questions");
        }

        self.emit(FieldEvent::NodesSpawned {
            count,
            fallback: matches!(outcome, GenerationOutcome::Fallback { .. }),
        });
        self.announce(&session_id, Phase::Intake, Phase::Exploring);
        self.persist().await;

        EventOutcome::applied(outcome)
    }

    // ------------------------------------------------------------------------
    // selectNode
    // ------------------------------------------------------------------------

    /// Make `node_id` the single probing node.
    pub async fn select_node(&self, node_id: &str, now: DateTime<Utc>) -> EventOutcome<()> {
        let result = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Exploring])?;
                let target = live_node(s, node_id)?;
                if target.state == NodeState::Resolved {
                    return Err(format!("node {} is already answered", node_id));
                }

                for node in s.field.nodes.iter_mut() {
                    if node.state == NodeState::Probing && node.id != node_id {
                        node.state = NodeState::Latent;
                        node.last_touched_at = now;
                    }
                }
                s.field.update_node(node_id, |n| {
                    n.state = NodeState::Probing;
                    n.last_touched_at = now;
                });
                s.active_node = Some(node_id.to_string());
                s.behavior.start_tracking(now);
                Ok(())
            })
            .await;

        match result {
            Ok(()) => {
                debug!(node_id = %node_id, "Node selected");
                EventOutcome::applied(())
            }
            Err(reason) => self.ignored("select_node", reason),
        }
    }

    // ------------------------------------------------------------------------
    // answerQuestion
    // ------------------------------------------------------------------------

    /// Resolve a node with the user's answer, then consult analysis and
    /// schedule a convergence check.
    pub async fn answer_question(&self, node_id: &str, text: &str, now: DateTime<Utc>) -> EventOutcome<AnswerOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return self.ignored("answer_question", "empty answer");
        }
        let window_ms = self.config.confusion_window_ms;

        let prepared = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Exploring])?;
                let node = live_node(s, node_id)?;
                if node.state == NodeState::Resolved {
                    return Err(format!("node {} is already answered", node_id));
                }
                let question = node.question.clone();

                let signals = s.behavior.analyze_input(text, now);
                s.push_signals(signals.clone(), window_ms, now);

                s.field.update_node(node_id, |n| {
                    n.state = NodeState::Resolved;
                    n.answer = Some(text.to_string());
                    n.resolved_at = Some(now);
                    n.last_touched_at = now;
                    n.boost(ANSWER_BOOST);
                });
                // Answering elsewhere releases the previous selection
                if let Some(other) = s.field.probing().map(|n| n.id.clone()) {
                    s.field.update_node(&other, |n| {
                        n.state = NodeState::Latent;
                        n.last_touched_at = now;
                    });
                }
                s.active_node = None;
                s.session
                    .record(Milestone::new(MilestoneKind::NodeResolved, now).with_nodes(&[node_id]));

                Ok((s.session.id.clone(), s.session.conversation_id.clone(), question, signals))
            })
            .await;
        let (session_id, conversation_id, question, signals) = match prepared {
            Ok(p) => p,
            Err(reason) => return self.ignored("answer_question", reason),
        };
        info!(session_id = %session_id, node_id = %node_id, signals = signals.len(), "Node resolved");

        self.record_message(
            MessageEntry::new(&conversation_id, MessageKind::Answer, text)
                .with_session(&session_id)
                .with_node(node_id),
        )
        .await;

        let analysis = match self
            .collaborators
            .analyzer
            .analyze(&session_id, node_id, &question, text)
            .await
        {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!(session_id = %session_id, node_id = %node_id, error = %e, "Answer analysis failed");
                None
            }
        };

        let satellite_id = match &analysis {
            Some(a) => {
                let config = self.config.clone();
                self.store
                    .update(|s| apply_analysis(s, &session_id, node_id, a, &config, now))
                    .await
            }
            None => None,
        };

        self.persist().await;
        self.schedule_convergence_check(session_id.clone(), now);
        self.start_insight_check(session_id);

        EventOutcome::applied(AnswerOutcome {
            node_id: node_id.to_string(),
            signals,
            analysis,
            satellite_id,
        })
    }

    fn schedule_convergence_check(&self, session_id: String, now: DateTime<Utc>) {
        let machine = self.clone();
        let delay_ms = self.config.convergence_delay_ms;
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            let at = now + Duration::milliseconds(delay_ms as i64);
            machine.run_convergence_check(&session_id, at).await;
        });
    }

    /// Evaluate convergence at `at` and, when the field has converged and no
    /// confirmation is pending, draft and surface one.
    pub async fn run_convergence_check(&self, session_id: &str, at: DateTime<Utc>) -> Option<String> {
        let snap = self.store.snapshot().await;
        if snap.session.id != session_id
            || !matches!(snap.phase(), Phase::Exploring | Phase::Settling)
            || snap.pending_confirmation.is_some()
        {
            return None;
        }

        let report = evaluate(
            ConvergenceInput {
                nodes: &snap.field.nodes,
                open_loops: &snap.session.open_loops,
                signals: &snap.signals,
                clusters: &snap.field.clusters,
            },
            &self.config,
            at,
        );
        if !report.converged {
            debug!(session_id = %session_id, blockers = ?report.blockers, "Not converged");
            return None;
        }

        let statement = match self
            .collaborators
            .drafter
            .draft(&snap.session, &snap.field.nodes)
            .await
        {
            Ok(statement) if !statement.trim().is_empty() => statement,
            Ok(_) => draft_confirmation(&snap.field.nodes),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Confirmation drafting failed, using template");
                draft_confirmation(&snap.field.nodes)
            }
        };

        let stored = self
            .store
            .update(|s| {
                if s.session.id != session_id
                    || s.pending_confirmation.is_some()
                    || !matches!(s.phase(), Phase::Exploring | Phase::Settling)
                {
                    return false;
                }
                s.pending_confirmation = Some(statement.clone());
                s.session.record(
                    Milestone::new(MilestoneKind::ConfirmationOffered, at).with_note(statement.clone()),
                );
                true
            })
            .await;
        if !stored {
            return None;
        }

        info!(session_id = %session_id, "Field converged, confirmation offered");
        self.emit(FieldEvent::ConfirmationReady {
            statement: statement.clone(),
        });
        self.persist().await;
        Some(statement)
    }

    fn start_insight_check(&self, session_id: String) {
        let Some(generator) = self.collaborators.insights.clone() else {
            return;
        };
        let machine = self.clone();
        self.insight.start(async move {
            let snap = machine.store.snapshot().await;
            if snap.session.id != session_id {
                return;
            }
            let answered: Vec<ThoughtNode> = snap
                .field
                .nodes
                .iter()
                .filter(|n| n.answer.is_some())
                .cloned()
                .collect();

            match generator.generate(&snap.session, &answered).await {
                Ok(insight) if !insight.trim().is_empty() => {
                    let stored = machine
                        .store
                        .update(|s| {
                            if s.session.id != session_id {
                                return false;
                            }
                            s.latest_insight = Some(insight.clone());
                            true
                        })
                        .await;
                    if stored {
                        machine.emit(FieldEvent::InsightReady { insight });
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "Insight generation failed"),
            }
        });
    }

    // ------------------------------------------------------------------------
    // Satellites
    // ------------------------------------------------------------------------

    /// Answer a follow-up satellite and close its open loop.
    pub async fn answer_satellite(
        &self,
        parent_id: &str,
        satellite_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> EventOutcome<()> {
        let text = text.trim();
        if text.is_empty() {
            return self.ignored("answer_satellite", "empty answer");
        }

        let result = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Exploring, Phase::Settling])?;
                let parent = s
                    .field
                    .node(parent_id)
                    .ok_or_else(|| format!("unknown node {}", parent_id))?;
                let updated = answer_satellite(parent, satellite_id, text, now)
                    .ok_or_else(|| format!("no open satellite {}", satellite_id))?;
                s.field.update_node(parent_id, |n| *n = updated);

                for open_loop in s.session.open_loops.iter_mut() {
                    if open_loop.satellite_id.as_deref() == Some(satellite_id) {
                        open_loop.status = crate::field::LoopStatus::Closed;
                    }
                }
                s.session.record(
                    Milestone::new(MilestoneKind::SatelliteAnswered, now)
                        .with_nodes(&[parent_id, satellite_id]),
                );
                Ok((s.session.id.clone(), s.session.conversation_id.clone()))
            })
            .await;
        let (session_id, conversation_id) = match result {
            Ok(ids) => ids,
            Err(reason) => return self.ignored("answer_satellite", reason),
        };

        self.record_message(
            MessageEntry::new(&conversation_id, MessageKind::SatelliteAnswer, text)
                .with_session(&session_id)
                .with_node(satellite_id),
        )
        .await;
        self.persist().await;
        self.schedule_convergence_check(session_id, now);
        EventOutcome::applied(())
    }

    // ------------------------------------------------------------------------
    // Merging
    // ------------------------------------------------------------------------

    /// Fold two nodes together. `a` is the surviving id.
    pub async fn trigger_merge(&self, a: &str, b: &str, insight: &str, now: DateTime<Utc>) -> EventOutcome<MergeOutcome> {
        if a == b {
            return self.ignored("trigger_merge", "cannot merge a node with itself");
        }
        let settle_threshold = self.config.settle_threshold;

        let result = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Exploring])?;
                let question_a = live_node(s, a)?.question.clone();
                let question_b = live_node(s, b)?.question.clone();

                for id in [a, b] {
                    s.field.update_node(id, |n| {
                        n.state = NodeState::Merged;
                        n.merged_into = Some(a.to_string());
                        n.last_touched_at = now;
                    });
                }
                if matches!(s.active_node.as_deref(), Some(id) if id == a || id == b) {
                    s.active_node = None;
                }

                let insight = match insight.trim() {
                    "" => format!("\"{}\" and \"{}\" point at the same tension.", question_a, question_b),
                    text => text.to_string(),
                };
                s.session.insights.push(insight.clone());
                s.session.record(
                    Milestone::new(MilestoneKind::NodesMerged, now)
                        .with_nodes(&[a, b])
                        .with_note(insight),
                );

                let settled = s.field.count_in(&[NodeState::Resolved, NodeState::Merged]);
                let from = s.phase();
                if settled >= settle_threshold {
                    s.session.transition(Phase::Settling, now);
                }
                Ok((s.session.id.clone(), from, s.phase()))
            })
            .await;

        let (session_id, from, phase) = match result {
            Ok(r) => r,
            Err(reason) => return self.ignored("trigger_merge", reason),
        };
        info!(session_id = %session_id, surviving = %a, merged = %b, "Nodes merged");
        if from != phase {
            self.announce(&session_id, from, phase);
        }
        self.persist().await;

        EventOutcome::applied(MergeOutcome {
            surviving_id: a.to_string(),
            merged_ids: vec![a.to_string(), b.to_string()],
            phase,
        })
    }

    /// Ask the merge detector about two nodes and merge when it agrees.
    /// A detector failure yields `None` and changes nothing.
    pub async fn check_merge(&self, a: &str, b: &str, now: DateTime<Utc>) -> EventOutcome<Option<MergeVerdict>> {
        if a == b {
            return self.ignored("check_merge", "cannot merge a node with itself");
        }
        let snap = self.store.snapshot().await;
        let nodes = require_phase(&snap, &[Phase::Exploring])
            .and_then(|_| Ok((live_node(&snap, a)?.clone(), live_node(&snap, b)?.clone())));
        let (node_a, node_b) = match nodes {
            Ok(pair) => pair,
            Err(reason) => return self.ignored("check_merge", reason),
        };

        let verdict = match self
            .collaborators
            .merges
            .detect(&snap.session.id, &node_a, &node_b)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(session_id = %snap.session.id, error = %e, "Merge detection failed");
                return EventOutcome::applied(None);
            }
        };

        if verdict.should_merge {
            self.trigger_merge(a, b, &verdict.insight, now).await;
        }
        EventOutcome::applied(Some(verdict))
    }

    // ------------------------------------------------------------------------
    // Leaning
    // ------------------------------------------------------------------------

    pub async fn update_leaning(&self, direction: &str, confidence: f64, now: DateTime<Utc>) -> EventOutcome<LeaningVector> {
        let direction = direction.trim();
        if direction.is_empty() {
            return self.ignored("update_leaning", "empty direction");
        }
        let max_shift = self.config.leaning_max_shift;

        let result = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Exploring, Phase::Settling])?;
                s.leaning = s.leaning.update(direction, confidence, max_shift, now);
                Ok(s.leaning.clone())
            })
            .await;

        match result {
            Ok(leaning) => EventOutcome::applied(leaning),
            Err(reason) => self.ignored("update_leaning", reason),
        }
    }

    // ------------------------------------------------------------------------
    // External affinity and intensity signals
    // ------------------------------------------------------------------------

    /// Override the relatedness of two nodes, symmetrically. Returns the
    /// stored score.
    pub async fn update_affinity(&self, a: &str, b: &str, score: f64, now: DateTime<Utc>) -> EventOutcome<f64> {
        if a == b {
            return self.ignored("update_affinity", "cannot relate a node to itself");
        }
        if score.is_nan() {
            return self.ignored("update_affinity", "affinity score is not a number");
        }
        let score = score.clamp(0.0, 1.0);

        let result = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Exploring, Phase::Settling])?;
                live_node(s, a)?;
                live_node(s, b)?;
                s.field.link_nodes(a, b, score);
                for id in [a, b] {
                    s.field.update_node(id, |n| n.last_touched_at = now);
                }
                Ok(())
            })
            .await;

        match result {
            Ok(()) => {
                debug!(a = %a, b = %b, score, "Affinity override set");
                EventOutcome::applied(score)
            }
            Err(reason) => self.ignored("update_affinity", reason),
        }
    }

    /// Raise a node's intensity. Returns the new intensity.
    pub async fn boost_node(&self, node_id: &str, amount: f64, now: DateTime<Utc>) -> EventOutcome<f64> {
        if amount.is_nan() || amount <= 0.0 {
            return self.ignored("boost_node", "boost amount must be positive");
        }

        let result = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Exploring, Phase::Settling])?;
                live_node(s, node_id)?;
                let mut intensity = 0.0;
                s.field.update_node(node_id, |n| {
                    n.boost(amount);
                    n.last_touched_at = now;
                    intensity = n.intensity;
                });
                Ok(intensity)
            })
            .await;

        match result {
            Ok(intensity) => {
                debug!(node_id = %node_id, intensity, "Node boosted");
                EventOutcome::applied(intensity)
            }
            Err(reason) => self.ignored("boost_node", reason),
        }
    }

    // ------------------------------------------------------------------------
    // Drag-to-throw
    // ------------------------------------------------------------------------

    /// Classify a drag release over `node_id` and apply it.
    pub async fn throw_node(&self, node_id: &str, samples: &[PointerSample], now: DateTime<Utc>) -> EventOutcome<ThrowAction> {
        let action = VelocityTracker::from_samples(samples, self.config.throw_sample_window)
            .classify_release(self.config.throw_velocity_threshold);

        let result = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Exploring])?;
                let discarded = live_node(s, node_id)?.clone();
                match action {
                    ThrowAction::Dismiss | ThrowAction::Regenerate => {
                        s.field.update_node(node_id, |n| {
                            n.state = NodeState::Exiting;
                            n.last_touched_at = now;
                        });
                        if s.active_node.as_deref() == Some(node_id) {
                            s.active_node = None;
                        }
                        let note = if action == ThrowAction::Dismiss { "dismissed" } else { "regenerated" };
                        s.session.record(
                            Milestone::new(MilestoneKind::NodeThrown, now)
                                .with_nodes(&[node_id])
                                .with_note(note),
                        );
                    }
                    ThrowAction::Reposition { to } => {
                        s.field.update_node(node_id, |n| {
                            n.position = to;
                            n.last_touched_at = now;
                        });
                    }
                    ThrowAction::None => {}
                }
                Ok((s.session.id.clone(), s.session.decision.clone().unwrap_or_default(), discarded))
            })
            .await;

        let (session_id, decision, discarded) = match result {
            Ok(r) => r,
            Err(reason) => return self.ignored("throw_node", reason),
        };
        debug!(session_id = %session_id, node_id = %node_id, action = ?action, "Throw applied");

        if action == ThrowAction::Regenerate {
            let machine = self.clone();
            tokio::spawn(async move {
                machine.regenerate_node(&session_id, &decision, &discarded, now).await;
            });
        }
        if matches!(action, ThrowAction::Dismiss | ThrowAction::Regenerate) {
            self.persist().await;
        }
        EventOutcome::applied(action)
    }

    /// Ask for a replacement of a thrown node and place it clear of the
    /// others. Falls back to the template question for the same topic.
    pub async fn regenerate_node(
        &self,
        session_id: &str,
        decision: &str,
        discarded: &ThoughtNode,
        now: DateTime<Utc>,
    ) -> Option<NodeId> {
        let question = match self
            .collaborators
            .questions
            .replace(session_id, decision, discarded)
            .await
        {
            Ok(question) => question,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Replacement generation failed, using template");
                GeneratedQuestion::new(discarded.topic, fallback_question(discarded.topic))
            }
        };

        let min_gap = self.config.min_distance;
        let replacement = self
            .store
            .update(|s| {
                if s.session.id != session_id || s.phase() != Phase::Exploring {
                    return None;
                }
                let position = find_clear_position(discarded.position, &s.field.occupied_positions(), min_gap);
                let mut node = ThoughtNode::new(question.question, question.topic, position, now);
                node.concept = question.concept.as_deref().and_then(normalize_concept);
                let id = node.id.clone();
                s.field.push(node);
                Some(id)
            })
            .await?;

        self.emit(FieldEvent::NodeReplaced {
            discarded: discarded.id.clone(),
            replacement: replacement.clone(),
        });
        Some(replacement)
    }

    // ------------------------------------------------------------------------
    // Closure
    // ------------------------------------------------------------------------

    /// Any phase -> silent with a terminal classification.
    pub async fn end_session(&self, ending: Ending, now: DateTime<Utc>) -> EventOutcome<()> {
        let result = self
            .store
            .update(|s| {
                if s.phase() == Phase::Silent {
                    return Err("session already ended".to_string());
                }
                let from = s.session.transition(Phase::Silent, now);
                s.session.ending = Some(ending);
                s.pending_confirmation = None;
                s.active_node = None;
                s.session.record(
                    Milestone::new(MilestoneKind::SessionEnded, now).with_note(ending.as_str()),
                );
                Ok((s.session.id.clone(), from))
            })
            .await;

        let (session_id, from) = match result {
            Ok(r) => r,
            Err(reason) => return self.ignored("end_session", reason),
        };
        self.insight.abort();
        self.announce(&session_id, from, Phase::Silent);
        self.persist().await;
        EventOutcome::applied(())
    }

    /// Silent -> exploring.
    pub async fn reopen(&self, now: DateTime<Utc>) -> EventOutcome<()> {
        let result = self
            .store
            .update(|s| -> Guard<_> {
                require_phase(s, &[Phase::Silent])?;
                s.session.transition(Phase::Exploring, now);
                s.session.ending = None;
                s.behavior.start_tracking(now);
                s.session.record(Milestone::new(MilestoneKind::Reopened, now));
                Ok(s.session.id.clone())
            })
            .await;

        match result {
            Ok(session_id) => {
                self.announce(&session_id, Phase::Silent, Phase::Exploring);
                self.persist().await;
                EventOutcome::applied(())
            }
            Err(reason) => self.ignored("reopen", reason),
        }
    }

    /// Drop the current session and start a fresh idle one. Keeps the
    /// conversation unless a new one is given.
    pub async fn reset(&self, conversation_id: Option<String>, now: DateTime<Utc>) -> DecisionSession {
        self.insight.abort();
        let current = self.store.snapshot().await;
        let conversation_id = conversation_id.unwrap_or_else(|| current.session.conversation_id.clone());
        let state = SessionState::new(conversation_id, now);
        let session = state.session.clone();
        self.store.replace(state).await;
        info!(session_id = %session.id, previous = %current.session.id, "Session reset");
        session
    }

    // ------------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------------

    /// Advance the field by one tick. Skipped outside exploring.
    pub async fn tick(&self, now: DateTime<Utc>) -> bool {
        let config = self.config.clone();
        self.store
            .update(|s| {
                if !s.phase().is_simulated() {
                    return false;
                }
                s.field = s.field.step(&config, now);
                true
            })
            .await
    }
}

/// Fold an answer analysis into the state. Returns the id of a spawned
/// satellite, if any.
fn apply_analysis(
    s: &mut SessionState,
    session_id: &str,
    node_id: &str,
    analysis: &AnswerAnalysis,
    config: &FieldConfig,
    now: DateTime<Utc>,
) -> Option<NodeId> {
    if s.session.id != session_id {
        return None;
    }

    DecisionSession::absorb(&mut s.session.constraints, &analysis.constraints);
    DecisionSession::absorb(&mut s.session.assumptions, &analysis.assumptions);
    DecisionSession::absorb(&mut s.session.options, &analysis.options);

    if let Some(hint) = &analysis.leaning {
        if !hint.direction.trim().is_empty() {
            s.leaning = s
                .leaning
                .update(hint.direction.trim(), hint.confidence, config.leaning_max_shift, now);
        }
    }

    let node = s.field.node(node_id).filter(|n| !n.state.is_gone())?.clone();

    if let Some(concept) = analysis.concept.as_deref().and_then(normalize_concept) {
        s.field.update_node(node_id, |n| n.concept = Some(concept));
    }

    if !analysis.needs_follow_up {
        return None;
    }
    let question = analysis
        .follow_up_question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_FOLLOW_UP);

    let satellite = spawn_satellite(&node, question, config, now);
    let satellite_id = satellite.id.clone();
    s.session
        .open_loops
        .push(OpenLoop::new(node_id, question, now).for_satellite(&satellite_id));
    s.field.update_node(node_id, |n| n.satellites.push(satellite));
    Some(satellite_id)
}
