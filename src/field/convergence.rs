//! Convergence evaluation: is the field calm enough to offer closure?

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::clustering::ConceptCluster;
use super::signals::BehaviorSignal;
use super::types::{NodeState, OpenLoop, ThoughtNode, TopicKey};
use crate::config::FieldConfig;

/// A reason the field is not yet eligible for silence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConvergenceBlocker {
    OpenLoops { count: usize },
    TooFewResolved { resolved: usize, required: usize },
    RecentConfusion { count: usize },
    TooManyUnresolved { count: usize, max: usize },
    UnstableDominantCluster { dominance: f64 },
}

/// Outcome of a convergence evaluation with every blocker that applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub converged: bool,
    pub blockers: Vec<ConvergenceBlocker>,
}

/// Everything the evaluator looks at, borrowed from the current snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceInput<'a> {
    pub nodes: &'a [ThoughtNode],
    pub open_loops: &'a [OpenLoop],
    pub signals: &'a [BehaviorSignal],
    pub clusters: &'a [ConceptCluster],
}

/// Evaluate every blocker against the snapshot at `now`.
pub fn evaluate(input: ConvergenceInput<'_>, config: &FieldConfig, now: DateTime<Utc>) -> ConvergenceReport {
    let mut blockers = Vec::new();

    let open = input.open_loops.iter().filter(|l| l.is_open()).count();
    if open > 0 {
        blockers.push(ConvergenceBlocker::OpenLoops { count: open });
    }

    let resolved = input
        .nodes
        .iter()
        .filter(|n| n.state == NodeState::Resolved)
        .count();
    if resolved < config.min_resolved_nodes {
        blockers.push(ConvergenceBlocker::TooFewResolved {
            resolved,
            required: config.min_resolved_nodes,
        });
    }

    let window = Duration::milliseconds(config.confusion_window_ms);
    let confused = input
        .signals
        .iter()
        .filter(|s| s.is_confusion() && now - s.timestamp <= window)
        .count();
    if confused > 0 {
        blockers.push(ConvergenceBlocker::RecentConfusion { count: confused });
    }

    let unresolved = input
        .nodes
        .iter()
        .filter(|n| matches!(n.state, NodeState::Latent | NodeState::Probing))
        .count();
    if unresolved > config.max_active_latent {
        blockers.push(ConvergenceBlocker::TooManyUnresolved {
            count: unresolved,
            max: config.max_active_latent,
        });
    }

    if let Some(cluster) = input
        .clusters
        .iter()
        .find(|c| c.dominance > config.cluster_dominance_threshold && !c.stable)
    {
        blockers.push(ConvergenceBlocker::UnstableDominantCluster {
            dominance: cluster.dominance,
        });
    }

    ConvergenceReport {
        converged: blockers.is_empty(),
        blockers,
    }
}

/// Whether the field is eligible to go silent.
pub fn check_convergence(input: ConvergenceInput<'_>, config: &FieldConfig, now: DateTime<Utc>) -> bool {
    evaluate(input, config, now).converged
}

/// Topics the user has worked through, in canonical order.
pub fn explored_topics(nodes: &[ThoughtNode]) -> Vec<TopicKey> {
    TopicKey::ALL
        .into_iter()
        .filter(|topic| {
            nodes.iter().any(|n| {
                n.topic == *topic && matches!(n.state, NodeState::Resolved | NodeState::Merged)
            })
        })
        .collect()
}

/// Templated soft-confirmation naming the explored topics.
pub fn draft_confirmation(nodes: &[ThoughtNode]) -> String {
    let topics: Vec<&str> = explored_topics(nodes).iter().map(|t| t.as_str()).collect();
    match topics.as_slice() {
        [] => "It feels like things have settled. Is this clear enough to set down for now?".to_string(),
        [only] => format!(
            "You've spent real time on the {} side of this. Is this clear enough to set down for now?",
            only
        ),
        [init @ .., last] => format!(
            "You've looked at the {} and {} of this. Is this clear enough to set down for now?",
            init.join(", "),
            last
        ),
    }
}
