//! One integration step of the field: pairwise attraction and repulsion,
//! heavy damping, explicit Euler position update.

use super::affinity::affinity;
use super::types::{NodeState, ThoughtNode, Vec2};
use crate::config::FieldConfig;

/// Force exerted on `n` by `m`.
///
/// Short range always repels, regardless of affinity. Resolved nodes are
/// pushed out of their neighbourhood; unresolved nodes are not pulled toward
/// resolved ones.
pub fn pair_force(n: &ThoughtNode, m: &ThoughtNode, config: &FieldConfig) -> Vec2 {
    let delta = m.position - n.position;
    let d = delta.length();

    // Coincident nodes: no defined direction
    if d == 0.0 {
        return Vec2::ZERO;
    }

    let toward_m = delta * (1.0 / d);

    if d < config.min_distance {
        return toward_m * (-config.repulsion_strength / d);
    }
    if d > config.max_distance {
        return Vec2::ZERO;
    }
    if n.state == NodeState::Resolved {
        return toward_m * -config.resolved_push;
    }
    if m.state == NodeState::Resolved {
        return Vec2::ZERO;
    }

    let a = affinity(n, m);
    if a <= 0.0 {
        return Vec2::ZERO;
    }
    toward_m * (a * config.attraction_strength / d)
}

/// Sum of forces acting on `nodes[index]` from every other simulated node.
pub fn net_force(nodes: &[ThoughtNode], index: usize, config: &FieldConfig) -> Vec2 {
    let n = &nodes[index];
    nodes
        .iter()
        .enumerate()
        .filter(|(j, m)| *j != index && m.is_simulated())
        .fold(Vec2::ZERO, |acc, (_, m)| acc + pair_force(n, m, config))
}

/// Whether a node moves this tick. Fading nodes still exert forces but
/// stay where they are.
fn moves(node: &ThoughtNode) -> bool {
    node.is_simulated() && node.state != NodeState::Fading
}

/// Integrate one tick and return the updated node collection.
///
/// Forces are computed against the positions at the start of the tick so
/// the result does not depend on iteration order.
pub fn integrate(nodes: &[ThoughtNode], config: &FieldConfig) -> Vec<ThoughtNode> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            if !moves(node) {
                return node.clone();
            }
            let step = (net_force(nodes, i, config) * config.damping).clamp_length(config.max_step);
            let mut next = node.clone();
            next.position += step;
            next
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::types::TopicKey;
    use chrono::Utc;

    fn node_at(id: &str, x: f64, y: f64) -> ThoughtNode {
        ThoughtNode::new("q", TopicKey::Reality, Vec2::new(x, y), Utc::now()).with_id(id)
    }

    #[test]
    fn test_short_range_repels_even_with_max_affinity() {
        let config = FieldConfig::default();
        let n = node_at("n", 0.0, 0.0).with_affinity("m", 1.0);
        let m = node_at("m", 20.0, 0.0).with_affinity("n", 1.0);

        let f = pair_force(&n, &m, &config);
        assert!(f.x < 0.0, "force should push n away from m: {:?}", f);
    }

    #[test]
    fn test_closer_repels_harder() {
        let config = FieldConfig::default();
        let n = node_at("n", 0.0, 0.0);
        let near = pair_force(&n, &node_at("m", 10.0, 0.0), &config);
        let far = pair_force(&n, &node_at("m", 60.0, 0.0), &config);
        assert!(near.length() > far.length());
    }

    #[test]
    fn test_beyond_max_distance_no_force() {
        let config = FieldConfig::default();
        let n = node_at("n", 0.0, 0.0);
        let m = node_at("m", config.max_distance + 1.0, 0.0);
        assert_eq!(pair_force(&n, &m, &config), Vec2::ZERO);
    }

    #[test]
    fn test_zero_distance_is_guarded() {
        let config = FieldConfig::default();
        let n = node_at("n", 5.0, 5.0);
        let m = node_at("m", 5.0, 5.0);
        assert_eq!(pair_force(&n, &m, &config), Vec2::ZERO);

        let moved = integrate(&[n.clone(), m], &config);
        assert_eq!(moved[0].position, n.position);
    }

    #[test]
    fn test_mid_range_attraction_scales_with_affinity() {
        let config = FieldConfig::default();
        let n = node_at("n", 0.0, 0.0).with_concept("runway");
        let related = node_at("m", 200.0, 0.0).with_concept("runway");
        let unrelated = ThoughtNode::new("q", TopicKey::Options, Vec2::new(200.0, 0.0), Utc::now())
            .with_id("u");

        let strong = pair_force(&n, &related, &config);
        let weak = pair_force(&n, &unrelated, &config);
        assert!(strong.x > 0.0 && weak.x > 0.0);
        assert!((strong.x - 0.8 * config.attraction_strength / 200.0).abs() < 1e-9);
        assert!(strong.x > weak.x);
    }

    #[test]
    fn test_zero_affinity_skipped() {
        let config = FieldConfig::default();
        let n = node_at("n", 0.0, 0.0).with_affinity("m", 0.0);
        let m = node_at("m", 200.0, 0.0);
        assert_eq!(pair_force(&n, &m, &config), Vec2::ZERO);
    }

    #[test]
    fn test_resolved_node_drifts_outward() {
        let config = FieldConfig::default();
        let n = node_at("n", 0.0, 0.0).with_state(NodeState::Resolved);
        let m = node_at("m", 150.0, 0.0).with_concept("x");
        let f = pair_force(&n, &m, &config);
        assert!((f.x + config.resolved_push).abs() < 1e-9);
    }

    #[test]
    fn test_unresolved_not_pulled_toward_resolved() {
        let config = FieldConfig::default();
        let n = node_at("n", 0.0, 0.0);
        let m = node_at("m", 150.0, 0.0).with_state(NodeState::Resolved);
        assert_eq!(pair_force(&n, &m, &config), Vec2::ZERO);
    }

    #[test]
    fn test_gone_nodes_are_ignored() {
        let config = FieldConfig::default();
        let nodes = vec![
            node_at("n", 0.0, 0.0),
            node_at("m", 10.0, 0.0).with_state(NodeState::Dissolved),
        ];
        assert_eq!(net_force(&nodes, 0, &config), Vec2::ZERO);
    }

    #[test]
    fn test_fading_and_dissolved_nodes_do_not_move() {
        let config = FieldConfig::default();
        let nodes = vec![
            node_at("a", 0.0, 0.0).with_state(NodeState::Fading),
            node_at("b", 10.0, 0.0),
            node_at("c", 20.0, 0.0).with_state(NodeState::Dissolved),
        ];
        let next = integrate(&nodes, &config);
        assert_eq!(next[0].position, nodes[0].position);
        assert_eq!(next[2].position, nodes[2].position);
        // b is pushed away from the fading node
        assert!(next[1].position.x > 10.0);
    }

    #[test]
    fn test_step_is_bounded() {
        let config = FieldConfig::default();
        let nodes = vec![node_at("a", 0.0, 0.0), node_at("b", 0.001, 0.0)];
        let next = integrate(&nodes, &config);
        for (before, after) in nodes.iter().zip(next.iter()) {
            assert!(before.position.distance(after.position) <= config.max_step + 1e-9);
        }
    }
}
