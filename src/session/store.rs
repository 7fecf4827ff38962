//! Copy-on-write store for the session state shared by the tick loop and
//! event handlers.
//!
//! Readers get an `Arc` snapshot that never changes under them. Writers
//! clone the current state, mutate the clone and swap it in under the
//! write lock, so a tick and an event can never interleave half-applied.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{DecisionSession, Phase};
use crate::field::{
    BehaviorSignal, BehaviorTracker, ConceptCluster, LeaningVector, NodeId, TensionField,
    ThoughtNode,
};

/// Everything one decision session owns.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session: DecisionSession,
    pub field: TensionField,
    pub leaning: LeaningVector,
    /// Recent behavior signals; older ones are pruned on insert.
    pub signals: Vec<BehaviorSignal>,
    pub behavior: BehaviorTracker,
    pub active_node: Option<NodeId>,
    pub pending_confirmation: Option<String>,
    pub latest_insight: Option<String>,
}

impl SessionState {
    pub fn new(conversation_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session: DecisionSession::new(conversation_id, now),
            field: TensionField::new(),
            leaning: LeaningVector::default(),
            signals: Vec::new(),
            behavior: BehaviorTracker::new(now),
            active_node: None,
            pending_confirmation: None,
            latest_insight: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    /// Append signals and drop those older than `window_ms`.
    pub fn push_signals(&mut self, signals: Vec<BehaviorSignal>, window_ms: i64, now: DateTime<Utc>) {
        let window = chrono::Duration::milliseconds(window_ms);
        self.signals.retain(|s| now - s.timestamp <= window);
        self.signals.extend(signals);
    }

    /// Serializable view for consumers.
    pub fn view(&self) -> FieldSnapshot {
        FieldSnapshot {
            session: self.session.clone(),
            nodes: self.field.nodes.clone(),
            clusters: self.field.clusters.clone(),
            leaning: self.leaning.clone(),
            signals: self.signals.clone(),
            active_node: self.active_node.clone(),
            pending_confirmation: self.pending_confirmation.clone(),
            latest_insight: self.latest_insight.clone(),
            tick: self.field.tick_count(),
        }
    }
}

/// Read-only rendering of a session state.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSnapshot {
    pub session: DecisionSession,
    pub nodes: Vec<ThoughtNode>,
    pub clusters: Vec<ConceptCluster>,
    pub leaning: LeaningVector,
    pub signals: Vec<BehaviorSignal>,
    pub active_node: Option<NodeId>,
    pub pending_confirmation: Option<String>,
    pub latest_insight: Option<String>,
    pub tick: u64,
}

/// Shared owner of the current [`SessionState`].
#[derive(Clone)]
pub struct FieldStore {
    inner: Arc<RwLock<Arc<SessionState>>>,
}

impl FieldStore {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(state))),
        }
    }

    /// Current consistent snapshot.
    pub async fn snapshot(&self) -> Arc<SessionState> {
        self.inner.read().await.clone()
    }

    /// Apply `f` to a copy of the state and publish the copy.
    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let mut guard = self.inner.write().await;
        let mut next = SessionState::clone(&guard);
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }

    /// Replace the whole state.
    pub async fn replace(&self, state: SessionState) {
        *self.inner.write().await = Arc::new(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Indication, SignalKind};
    use chrono::Duration;

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_updates() {
        let store = FieldStore::new(SessionState::new("conv", Utc::now()));
        let before = store.snapshot().await;

        store
            .update(|state| state.session.decision = Some("move?".into()))
            .await;

        assert!(before.session.decision.is_none());
        assert_eq!(
            store.snapshot().await.session.decision.as_deref(),
            Some("move?")
        );
    }

    #[tokio::test]
    async fn test_update_returns_closure_result() {
        let store = FieldStore::new(SessionState::new("conv", Utc::now()));
        let phase = store
            .update(|state| {
                state.session.transition(Phase::Intake, Utc::now());
                state.phase()
            })
            .await;
        assert_eq!(phase, Phase::Intake);
    }

    #[test]
    fn test_signals_pruned_by_window() {
        let now = Utc::now();
        let mut state = SessionState::new("conv", now);
        let signal = |at| BehaviorSignal {
            kind: SignalKind::Hedging,
            value: 0.8,
            indicates: Indication::Confusion,
            note: String::new(),
            timestamp: at,
        };
        state.push_signals(vec![signal(now - Duration::seconds(120))], 60_000, now);
        state.push_signals(vec![signal(now)], 60_000, now);
        assert_eq!(state.signals.len(), 1);
        assert_eq!(state.signals[0].timestamp, now);
    }
}
