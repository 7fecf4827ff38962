//! Proximity clustering with temporal stability tracking.
//!
//! Clusters are recomputed from scratch every tick as the connected
//! components of the "closer than the cluster threshold" graph. Affinity
//! plays no part here: it shapes positions, clustering only observes them.
//! Stability survives across ticks through a history keyed by the sorted
//! member set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::types::{NodeId, ThoughtNode, Vec2};
use crate::config::FieldConfig;

/// Structural identity of a cluster: its sorted member ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterKey(Vec<NodeId>);

impl ClusterKey {
    pub fn new(mut members: Vec<NodeId>) -> Self {
        members.sort();
        members.dedup();
        Self(members)
    }

    pub fn members(&self) -> &[NodeId] {
        &self.0
    }
}

/// A proximity-connected group of active nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCluster {
    pub key: ClusterKey,
    pub centroid: Vec2,
    /// Inverse of the spread of member intensities; 1 for a single node.
    pub coherence: f64,
    /// Share of the total intensity of all active nodes.
    pub dominance: f64,
    pub total_intensity: f64,
    pub stable: bool,
    pub stable_since: DateTime<Utc>,
}

impl ConceptCluster {
    pub fn members(&self) -> &[NodeId] {
        self.key.members()
    }

    pub fn len(&self) -> usize {
        self.key.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.members().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StabilityRecord {
    centroid: Vec2,
    stable_since: DateTime<Utc>,
}

/// Keeps per-cluster stability history between ticks.
#[derive(Debug, Clone, Default)]
pub struct ClusterTracker {
    history: HashMap<ClusterKey, StabilityRecord>,
}

impl ClusterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clusters with stability history.
    pub fn tracked(&self) -> usize {
        self.history.len()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Partition the simulated nodes and update stability.
    pub fn detect(
        &mut self,
        nodes: &[ThoughtNode],
        config: &FieldConfig,
        now: DateTime<Utc>,
    ) -> Vec<ConceptCluster> {
        let active: Vec<&ThoughtNode> = nodes.iter().filter(|n| n.is_simulated()).collect();
        let system_intensity: f64 = active.iter().map(|n| n.intensity).sum();

        let groups = connected_groups(&active, config.cluster_distance_threshold);
        let stable_after = chrono::Duration::milliseconds(config.stable_duration_ms);

        let mut next_history = HashMap::with_capacity(groups.len());
        let mut clusters = Vec::with_capacity(groups.len());

        for group in groups {
            let members: Vec<&ThoughtNode> = group.iter().map(|&i| active[i]).collect();
            let key = ClusterKey::new(members.iter().map(|n| n.id.clone()).collect());
            let centroid = centroid(&members);
            let total_intensity: f64 = members.iter().map(|n| n.intensity).sum();

            let stable_since = match self.history.get(&key) {
                Some(record) if record.centroid.distance(centroid) < config.movement_threshold => {
                    record.stable_since
                }
                _ => now,
            };

            let dominance = if system_intensity > 0.0 {
                total_intensity / system_intensity
            } else {
                0.0
            };

            next_history.insert(
                key.clone(),
                StabilityRecord {
                    centroid,
                    stable_since,
                },
            );

            clusters.push(ConceptCluster {
                key,
                centroid,
                coherence: coherence(&members),
                dominance,
                total_intensity,
                stable: now - stable_since >= stable_after,
                stable_since,
            });
        }

        // Keys not seen this tick lost or gained members: their timers reset
        self.history = next_history;

        clusters.sort_by(|a, b| {
            b.dominance
                .partial_cmp(&a.dominance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        clusters
    }
}

/// Connected components under the distance threshold (breadth-first).
fn connected_groups(nodes: &[&ThoughtNode], threshold: f64) -> Vec<Vec<usize>> {
    let mut visited = vec![false; nodes.len()];
    let mut groups = Vec::new();

    for start in 0..nodes.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut group = Vec::new();
        let mut queue = VecDeque::from([start]);

        while let Some(i) = queue.pop_front() {
            group.push(i);
            for j in 0..nodes.len() {
                if !visited[j] && nodes[i].position.distance(nodes[j].position) < threshold {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }
        groups.push(group);
    }
    groups
}

fn centroid(members: &[&ThoughtNode]) -> Vec2 {
    if members.is_empty() {
        return Vec2::ZERO;
    }
    let sum = members
        .iter()
        .fold(Vec2::ZERO, |acc, n| acc + n.position);
    sum * (1.0 / members.len() as f64)
}

fn coherence(members: &[&ThoughtNode]) -> f64 {
    if members.len() <= 1 {
        return 1.0;
    }
    let n = members.len() as f64;
    let mean = members.iter().map(|m| m.intensity).sum::<f64>() / n;
    let variance = members
        .iter()
        .map(|m| (m.intensity - mean).powi(2))
        .sum::<f64>()
        / n;
    1.0 / (1.0 + variance.sqrt())
}
