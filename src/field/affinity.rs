//! Relatedness between two thought nodes.

use super::types::ThoughtNode;

/// Both nodes carry the same concept label.
pub const CONCEPT_AFFINITY: f64 = 0.8;
/// Both nodes share a topic.
pub const TOPIC_AFFINITY: f64 = 0.3;
/// Ambient attraction so the field never fully disperses.
pub const BASELINE_AFFINITY: f64 = 0.1;

/// Relatedness of `a` and `b` in [0, 1].
///
/// Explicit overrides win (either direction, `a`'s first). Callers that set
/// overrides are expected to set them on both nodes.
pub fn affinity(a: &ThoughtNode, b: &ThoughtNode) -> f64 {
    if let Some(score) = a.affinities.get(&b.id).or_else(|| b.affinities.get(&a.id)) {
        return *score;
    }

    match (&a.concept, &b.concept) {
        (Some(ca), Some(cb)) if ca == cb => CONCEPT_AFFINITY,
        _ if a.topic == b.topic => TOPIC_AFFINITY,
        _ => BASELINE_AFFINITY,
    }
}

/// Set an explicit override on both nodes.
pub fn link(a: &mut ThoughtNode, b: &mut ThoughtNode, score: f64) {
    let score = score.clamp(0.0, 1.0);
    a.affinities.insert(b.id.clone(), score);
    b.affinities.insert(a.id.clone(), score);
}
