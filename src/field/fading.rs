//! Intensity decay of low-signal nodes: visible -> fading -> dissolved.

use chrono::{DateTime, Utc};

use super::types::{NodeState, ThoughtNode};
use crate::config::FieldConfig;

/// Whether the fade policy may touch `node` at `now`.
pub fn is_fade_eligible(node: &ThoughtNode, config: &FieldConfig, now: DateTime<Utc>) -> bool {
    if node.age_ms(now) < config.grace_period_ms {
        return false;
    }
    if matches!(node.state, NodeState::Probing | NodeState::Resolved) || node.state.is_gone() {
        return false;
    }
    node.intensity <= config.signal_threshold
}

/// Apply one fade step to a single node.
pub fn fade_node(node: &ThoughtNode, config: &FieldConfig, now: DateTime<Utc>) -> ThoughtNode {
    let mut next = node.clone();
    if !is_fade_eligible(node, config, now) {
        return next;
    }

    next.intensity *= config.fade_rate;
    if next.intensity < config.dissolve_threshold {
        next.state = NodeState::Dissolved;
    } else if next.intensity < config.fading_threshold {
        next.state = NodeState::Fading;
    }
    next
}

/// Apply one fade step to every node.
pub fn apply_fade(nodes: &[ThoughtNode], config: &FieldConfig, now: DateTime<Utc>) -> Vec<ThoughtNode> {
    nodes.iter().map(|n| fade_node(n, config, now)).collect()
}

/// Latent nodes untouched for the dormancy window become dormant and drop
/// to the signal threshold, which makes them fade-eligible.
pub fn apply_dormancy(nodes: &[ThoughtNode], config: &FieldConfig, now: DateTime<Utc>) -> Vec<ThoughtNode> {
    nodes
        .iter()
        .map(|n| {
            let mut next = n.clone();
            if n.state == NodeState::Latent
                && (now - n.last_touched_at).num_milliseconds() >= config.dormancy_ms
            {
                next.state = NodeState::Dormant;
                next.intensity = n.intensity.min(config.signal_threshold);
            }
            next
        })
        .collect()
}
