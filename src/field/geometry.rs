//! Placement helpers: radial spawn layout, satellite angle selection and
//! collision-avoiding placement for nodes added mid-session.

use rand::Rng;
use std::f64::consts::{PI, TAU};

use super::types::Vec2;

/// Golden angle in radians, used to walk a spiral of candidate positions.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Candidate orbit slots considered when placing a satellite.
const SATELLITE_SLOTS: usize = 12;

/// Spiral attempts before giving up on finding a clear spot.
const MAX_PLACEMENT_ATTEMPTS: usize = 64;

/// Positions for `count` nodes spread evenly on a circle around `anchor`,
/// starting at the top, each nudged by up to `jitter` pixels.
pub fn spawn_positions<R: Rng + ?Sized>(
    anchor: Vec2,
    count: usize,
    radius: f64,
    jitter: f64,
    rng: &mut R,
) -> Vec<Vec2> {
    if count == 0 {
        return Vec::new();
    }

    let step = TAU / count as f64;
    (0..count)
        .map(|i| {
            let angle = -PI / 2.0 + step * i as f64;
            let base = anchor + Vec2::from_angle(angle) * radius;
            if jitter > 0.0 {
                base + Vec2::new(rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
            } else {
                base
            }
        })
        .collect()
}

/// Smallest absolute difference between two angles, in [0, PI].
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(TAU);
    diff.min(TAU - diff)
}

/// Orbit angle for a new satellite that maximises the separation from the
/// angles already taken. The first satellite goes to the top.
pub fn satellite_angle(existing: &[f64]) -> f64 {
    let top = -PI / 2.0;
    if existing.is_empty() {
        return top;
    }

    let mut best_angle = top;
    let mut best_gap = f64::NEG_INFINITY;
    for slot in 0..SATELLITE_SLOTS {
        let candidate = top + TAU * slot as f64 / SATELLITE_SLOTS as f64;
        let gap = existing
            .iter()
            .map(|&taken| angular_distance(candidate, taken))
            .fold(f64::INFINITY, f64::min);
        if gap > best_gap + 1e-9 {
            best_gap = gap;
            best_angle = candidate;
        }
    }
    best_angle
}

/// Position of a satellite orbiting `parent` at `angle`.
pub fn orbit_position(parent: Vec2, angle: f64, orbit: f64) -> Vec2 {
    parent + Vec2::from_angle(angle) * orbit
}

/// First position on a golden-angle spiral around `desired` that keeps at
/// least `min_gap` from every obstacle. Falls back to the last candidate
/// tried when the field is too crowded.
pub fn find_clear_position(desired: Vec2, obstacles: &[Vec2], min_gap: f64) -> Vec2 {
    let is_clear = |p: Vec2| obstacles.iter().all(|o| o.distance(p) >= min_gap);

    if is_clear(desired) {
        return desired;
    }

    let mut candidate = desired;
    for attempt in 1..=MAX_PLACEMENT_ATTEMPTS {
        let radius = min_gap * 0.5 * (attempt as f64).sqrt();
        candidate = desired + Vec2::from_angle(GOLDEN_ANGLE * attempt as f64) * radius;
        if is_clear(candidate) {
            return candidate;
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_spawn_positions_radial_without_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        let anchor = Vec2::new(100.0, 100.0);
        let positions = spawn_positions(anchor, 3, 50.0, 0.0, &mut rng);

        assert_eq!(positions.len(), 3);
        for p in &positions {
            assert!((p.distance(anchor) - 50.0).abs() < 1e-9);
        }
        // First node sits straight above the anchor
        assert!((positions[0].x - 100.0).abs() < 1e-9);
        assert!((positions[0].y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_spawn_positions_jitter_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        let positions = spawn_positions(Vec2::ZERO, 8, 100.0, 10.0, &mut rng);
        for p in positions {
            let d = p.length();
            assert!(d > 100.0 - 15.0 && d < 100.0 + 15.0);
        }
    }

    #[test]
    fn test_spawn_positions_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(spawn_positions(Vec2::ZERO, 0, 10.0, 0.0, &mut rng).is_empty());
    }

    #[test]
    fn test_angular_distance_wraps() {
        assert!((angular_distance(0.1, TAU - 0.1) - 0.2).abs() < 1e-9);
        assert!((angular_distance(0.0, PI) - PI).abs() < 1e-9);
    }

    #[test]
    fn test_satellite_angle_first_and_opposite() {
        let first = satellite_angle(&[]);
        assert!((first + PI / 2.0).abs() < 1e-9);

        let second = satellite_angle(&[first]);
        assert!((angular_distance(first, second) - PI).abs() < 1e-9);
    }

    #[test]
    fn test_satellite_angle_fills_largest_gap() {
        let taken = [-PI / 2.0, PI / 2.0];
        let next = satellite_angle(&taken);
        let gap = taken
            .iter()
            .map(|&t| angular_distance(next, t))
            .fold(f64::INFINITY, f64::min);
        assert!((gap - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_clear_position_respects_gap() {
        let obstacles = vec![Vec2::ZERO, Vec2::new(30.0, 0.0)];
        let placed = find_clear_position(Vec2::new(10.0, 0.0), &obstacles, 60.0);
        for o in &obstacles {
            assert!(o.distance(placed) >= 60.0);
        }
    }

    #[test]
    fn test_find_clear_position_keeps_free_spot() {
        let desired = Vec2::new(500.0, 500.0);
        assert_eq!(find_clear_position(desired, &[Vec2::ZERO], 60.0), desired);
    }
}
