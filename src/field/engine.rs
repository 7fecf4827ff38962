//! The tension field: node collection, current clusters and the per-tick
//! pipeline (forces, satellites, dormancy, fading, clustering).

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use super::affinity::link;
use super::clustering::{ClusterTracker, ConceptCluster};
use super::fading::{apply_dormancy, apply_fade};
use super::forces::integrate;
use super::satellites::update_satellites;
use super::types::{NodeId, NodeState, ThoughtNode, Vec2};
use crate::config::FieldConfig;

/// Simulated state owned by a session.
#[derive(Debug, Clone, Default)]
pub struct TensionField {
    pub nodes: Vec<ThoughtNode>,
    pub clusters: Vec<ConceptCluster>,
    tracker: ClusterTracker,
    last_fade_at: Option<DateTime<Utc>>,
    tick_count: u64,
}

impl TensionField {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field seeded with `nodes`; stability history starts empty.
    pub fn with_nodes(nodes: Vec<ThoughtNode>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn node(&self, id: &str) -> Option<&ThoughtNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Apply `f` to the node with `id`. Returns false when it does not exist.
    pub fn update_node<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ThoughtNode),
    {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                f(node);
                true
            }
            None => false,
        }
    }

    pub fn push(&mut self, node: ThoughtNode) {
        self.nodes.push(node);
    }

    pub fn count_in(&self, states: &[NodeState]) -> usize {
        self.nodes.iter().filter(|n| states.contains(&n.state)).count()
    }

    /// The node currently being answered, if any.
    pub fn probing(&self) -> Option<&ThoughtNode> {
        self.nodes.iter().find(|n| n.state == NodeState::Probing)
    }

    /// Positions of every visible node and satellite, for placement.
    pub fn occupied_positions(&self) -> Vec<Vec2> {
        self.nodes
            .iter()
            .filter(|n| n.is_simulated())
            .flat_map(|n| {
                std::iter::once(n.position).chain(n.satellites.iter().map(|s| s.position))
            })
            .collect()
    }

    /// Set a symmetric affinity override between two distinct nodes.
    /// Returns false when either is missing.
    pub fn link_nodes(&mut self, a: &str, b: &str, score: f64) -> bool {
        let position = |id: &str| self.nodes.iter().position(|n| n.id == id);
        let (Some(i), Some(j)) = (position(a), position(b)) else {
            return false;
        };
        if i == j {
            return false;
        }
        let (lo, hi) = (i.min(j), i.max(j));
        let (head, tail) = self.nodes.split_at_mut(hi);
        link(&mut head[lo], &mut tail[0], score);
        true
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Advance the field by one tick and return the next field.
    pub fn step(&self, config: &FieldConfig, now: DateTime<Utc>) -> TensionField {
        let mut nodes = integrate(&self.nodes, config);
        nodes = update_satellites(&nodes, config, now);
        nodes = apply_dormancy(&nodes, config, now);

        let fade_due = match self.last_fade_at {
            Some(last) => now - last >= Duration::milliseconds(config.fade_interval_ms),
            None => false,
        };
        let last_fade_at = if fade_due || self.last_fade_at.is_none() {
            Some(now)
        } else {
            self.last_fade_at
        };
        if fade_due {
            nodes = apply_fade(&nodes, config, now);
        }

        let mut tracker = self.tracker.clone();
        let clusters = tracker.detect(&nodes, config, now);

        trace!(
            tick = self.tick_count + 1,
            nodes = nodes.len(),
            clusters = clusters.len(),
            faded = fade_due,
            "Field tick"
        );

        TensionField {
            nodes,
            clusters,
            tracker,
            last_fade_at,
            tick_count: self.tick_count + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::types::TopicKey;

    fn node_at(id: &str, x: f64, y: f64, created: DateTime<Utc>) -> ThoughtNode {
        ThoughtNode::new("q", TopicKey::Reality, Vec2::new(x, y), created).with_id(id)
    }

    #[test]
    fn test_step_moves_and_clusters() {
        let config = FieldConfig::default();
        let now = Utc::now();
        let field = TensionField::with_nodes(vec![
            node_at("a", 0.0, 0.0, now),
            node_at("b", 150.0, 0.0, now),
        ]);

        let next = field.step(&config, now);
        assert_eq!(next.tick_count(), 1);
        assert_eq!(next.clusters.len(), 1);
        // Same topic: mild attraction pulls them together
        assert!(next.node("a").unwrap().position.x > 0.0);
        assert!(next.node("b").unwrap().position.x < 150.0);
        // Original is untouched
        assert_eq!(field.node("a").unwrap().position.x, 0.0);
    }

    #[test]
    fn test_fade_runs_on_interval() {
        let config = FieldConfig::default();
        let created = Utc::now();
        let old = created + Duration::milliseconds(config.grace_period_ms + 1);
        let field = TensionField::with_nodes(vec![
            node_at("a", 0.0, 0.0, created).with_intensity(0.2),
        ]);

        let first = field.step(&config, old);
        assert_eq!(first.node("a").unwrap().intensity, 0.2);

        let early = first.step(&config, old + Duration::milliseconds(config.tick_interval_ms as i64));
        assert_eq!(early.node("a").unwrap().intensity, 0.2);

        let due = early.step(&config, old + Duration::milliseconds(config.fade_interval_ms));
        assert!(due.node("a").unwrap().intensity < 0.2);
        assert_eq!(due.node("a").unwrap().state, NodeState::Fading);
    }

    #[test]
    fn test_update_node_and_queries() {
        let now = Utc::now();
        let mut field = TensionField::with_nodes(vec![node_at("a", 0.0, 0.0, now)]);
        assert!(field.update_node("a", |n| n.state = NodeState::Probing));
        assert!(!field.update_node("zzz", |n| n.state = NodeState::Probing));
        assert_eq!(field.probing().map(|n| n.id.as_str()), Some("a"));
        assert_eq!(field.count_in(&[NodeState::Probing]), 1);
    }

    #[test]
    fn test_link_nodes_sets_both_sides() {
        let now = Utc::now();
        let mut field = TensionField::with_nodes(vec![
            node_at("a", 0.0, 0.0, now),
            node_at("b", 200.0, 0.0, now),
            node_at("c", 0.0, 200.0, now),
        ]);
        assert!(field.link_nodes("c", "a", 0.9));
        assert_eq!(field.node("a").unwrap().affinities.get("c"), Some(&0.9));
        assert_eq!(field.node("c").unwrap().affinities.get("a"), Some(&0.9));
        assert!(field.node("b").unwrap().affinities.is_empty());

        assert!(!field.link_nodes("a", "a", 0.5));
        assert!(!field.link_nodes("a", "zzz", 0.5));
    }
}
