//! Follow-up satellites orbiting their parent node.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::geometry::{orbit_position, satellite_angle};
use super::types::{NodeId, Satellite, SatelliteState, ThoughtNode};
use crate::config::FieldConfig;

/// New satellite for `parent`, placed at the orbit angle farthest from its
/// existing satellites.
pub fn spawn_satellite(
    parent: &ThoughtNode,
    question: impl Into<String>,
    config: &FieldConfig,
    now: DateTime<Utc>,
) -> Satellite {
    let taken: Vec<f64> = parent
        .satellites
        .iter()
        .filter(|s| s.state != SatelliteState::Answered)
        .map(|s| s.angle)
        .collect();
    let angle = satellite_angle(&taken);

    Satellite {
        id: Uuid::new_v4().to_string(),
        parent_id: parent.id.clone(),
        question: question.into(),
        answer: None,
        angle,
        position: orbit_position(parent.position, angle, config.satellite_orbit),
        state: SatelliteState::Active,
        created_at: now,
        last_activity_at: now,
        answered_at: None,
    }
}

/// Record an answer on a satellite. `None` when the satellite does not
/// exist or was already answered.
pub fn answer_satellite(
    parent: &ThoughtNode,
    satellite_id: &str,
    answer: &str,
    now: DateTime<Utc>,
) -> Option<ThoughtNode> {
    let index = parent
        .satellites
        .iter()
        .position(|s| s.id == satellite_id && s.state != SatelliteState::Answered)?;

    let mut next = parent.clone();
    let satellite = &mut next.satellites[index];
    satellite.answer = Some(answer.to_string());
    satellite.state = SatelliteState::Answered;
    satellite.answered_at = Some(now);
    satellite.last_activity_at = now;
    Some(next)
}

/// Keep satellites on their parent's orbit, dim idle ones and drop answered
/// ones once their fade-out has elapsed.
pub fn update_satellites(nodes: &[ThoughtNode], config: &FieldConfig, now: DateTime<Utc>) -> Vec<ThoughtNode> {
    let dim_after = Duration::milliseconds(config.satellite_dim_ms);
    let remove_after = Duration::milliseconds(config.satellite_fade_out_ms);

    nodes
        .iter()
        .map(|node| {
            if node.satellites.is_empty() {
                return node.clone();
            }
            let mut next = node.clone();
            next.satellites = node
                .satellites
                .iter()
                .filter(|s| match (s.state, s.answered_at) {
                    (SatelliteState::Answered, Some(at)) => now - at < remove_after,
                    _ => true,
                })
                .map(|s| {
                    let mut s = s.clone();
                    s.position = orbit_position(node.position, s.angle, config.satellite_orbit);
                    if s.state == SatelliteState::Active && now - s.last_activity_at >= dim_after {
                        s.state = SatelliteState::Dimmed;
                    }
                    s
                })
                .collect();
            next
        })
        .collect()
}

/// Ids of satellites still waiting for an answer.
pub fn pending_satellites(node: &ThoughtNode) -> Vec<NodeId> {
    node.satellites
        .iter()
        .filter(|s| s.state != SatelliteState::Answered)
        .map(|s| s.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::geometry::angular_distance;
    use crate::field::types::{TopicKey, Vec2};
    use std::f64::consts::PI;

    fn parent(now: DateTime<Utc>) -> ThoughtNode {
        ThoughtNode::new("q", TopicKey::Values, Vec2::new(100.0, 100.0), now).with_id("p")
    }

    #[test]
    fn test_satellites_spread_apart() {
        let config = FieldConfig::default();
        let now = Utc::now();
        let mut node = parent(now);

        let first = spawn_satellite(&node, "a?", &config, now);
        assert!((first.angle + PI / 2.0).abs() < 1e-9);
        assert!((first.position.distance(node.position) - config.satellite_orbit).abs() < 1e-9);
        node.satellites.push(first.clone());

        let second = spawn_satellite(&node, "b?", &config, now);
        assert!((angular_distance(first.angle, second.angle) - PI).abs() < 1e-9);
    }

    #[test]
    fn test_answer_marks_answered_once() {
        let config = FieldConfig::default();
        let now = Utc::now();
        let mut node = parent(now);
        let sat = spawn_satellite(&node, "a?", &config, now);
        let sat_id = sat.id.clone();
        node.satellites.push(sat);

        let answered = answer_satellite(&node, &sat_id, "yes", now).unwrap();
        assert_eq!(answered.satellites[0].state, SatelliteState::Answered);
        assert!(pending_satellites(&answered).is_empty());
        assert!(answer_satellite(&answered, &sat_id, "again", now).is_none());
        assert!(answer_satellite(&node, "missing", "x", now).is_none());
    }

    #[test]
    fn test_idle_satellite_dims_and_answered_is_removed() {
        let config = FieldConfig::default();
        let now = Utc::now();
        let mut node = parent(now);
        let idle = spawn_satellite(&node, "idle?", &config, now);
        node.satellites.push(idle);
        let done = spawn_satellite(&node, "done?", &config, now);
        let done_id = done.id.clone();
        node.satellites.push(done);
        let node = answer_satellite(&node, &done_id, "ok", now).unwrap();

        let soon = now + Duration::milliseconds(config.satellite_fade_out_ms - 1);
        let kept = update_satellites(&[node.clone()], &config, soon);
        assert_eq!(kept[0].satellites.len(), 2);
        assert_eq!(kept[0].satellites[0].state, SatelliteState::Active);

        let later = now + Duration::milliseconds(config.satellite_dim_ms);
        let updated = update_satellites(&[node], &config, later);
        assert_eq!(updated[0].satellites.len(), 1);
        assert_eq!(updated[0].satellites[0].state, SatelliteState::Dimmed);
    }

    #[test]
    fn test_satellites_follow_parent() {
        let config = FieldConfig::default();
        let now = Utc::now();
        let mut node = parent(now);
        let sat = spawn_satellite(&node, "a?", &config, now);
        node.satellites.push(sat);
        node.position = Vec2::new(300.0, 300.0);

        let updated = update_satellites(&[node.clone()], &config, now);
        let s = &updated[0].satellites[0];
        assert!((s.position.distance(node.position) - config.satellite_orbit).abs() < 1e-9);
    }
}
