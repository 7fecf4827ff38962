//! Drag-to-throw: windowed velocity estimation and release classification.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::types::Vec2;

/// One pointer observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub x: f64,
    pub y: f64,
    /// Milliseconds on any monotonic clock.
    pub t_ms: i64,
}

impl PointerSample {
    pub fn new(x: f64, y: f64, t_ms: i64) -> Self {
        Self { x, y, t_ms }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// What a release gesture asks for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ThrowAction {
    /// Thrown left: drop the node.
    Dismiss,
    /// Thrown right: replace the node with a fresh question.
    Regenerate,
    /// Plain drag: move the node to the drop point.
    Reposition { to: Vec2 },
    /// Released where it was picked up.
    None,
}

/// Keeps the most recent pointer samples of a drag.
#[derive(Debug, Clone)]
pub struct VelocityTracker {
    window: usize,
    origin: Option<Vec2>,
    samples: VecDeque<PointerSample>,
}

impl VelocityTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            origin: None,
            samples: VecDeque::with_capacity(window),
        }
    }

    /// Tracker fed with a whole recorded gesture.
    pub fn from_samples(samples: &[PointerSample], window: usize) -> Self {
        let mut tracker = Self::new(window);
        for sample in samples {
            tracker.push(*sample);
        }
        tracker
    }

    pub fn push(&mut self, sample: PointerSample) {
        if self.origin.is_none() {
            self.origin = Some(sample.position());
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Velocity in px/s across the retained window.
    pub fn velocity(&self) -> Vec2 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return Vec2::ZERO;
        };
        let dt_ms = last.t_ms - first.t_ms;
        if dt_ms <= 0 {
            return Vec2::ZERO;
        }
        (last.position() - first.position()) * (1000.0 / dt_ms as f64)
    }

    /// Total displacement since the drag started.
    pub fn offset(&self) -> Vec2 {
        match (self.origin, self.samples.back()) {
            (Some(origin), Some(last)) => last.position() - origin,
            _ => Vec2::ZERO,
        }
    }

    /// Classify the release. Horizontal throws at or above `threshold` px/s
    /// dismiss or regenerate; everything else is a reposition or nothing.
    pub fn classify_release(&self, threshold: f64) -> ThrowAction {
        let Some(last) = self.samples.back() else {
            return ThrowAction::None;
        };
        let drop_point = last.position();
        let velocity = self.velocity();

        if velocity.length() >= threshold && velocity.x.abs() > velocity.y.abs() {
            return if velocity.x < 0.0 {
                ThrowAction::Dismiss
            } else {
                ThrowAction::Regenerate
            };
        }

        if self.offset() != Vec2::ZERO {
            ThrowAction::Reposition { to: drop_point }
        } else {
            ThrowAction::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture(dx_per_100ms: f64, dy_per_100ms: f64) -> Vec<PointerSample> {
        (0..=3)
            .map(|i| {
                PointerSample::new(
                    200.0 + dx_per_100ms * i as f64,
                    200.0 + dy_per_100ms * i as f64,
                    i * 100,
                )
            })
            .collect()
    }

    #[test]
    fn test_fast_left_dismisses() {
        let tracker = VelocityTracker::from_samples(&gesture(-60.0, 0.0), 5);
        assert!((tracker.velocity().x + 600.0).abs() < 1e-9);
        assert_eq!(tracker.classify_release(500.0), ThrowAction::Dismiss);
    }

    #[test]
    fn test_fast_right_regenerates() {
        let tracker = VelocityTracker::from_samples(&gesture(70.0, 5.0), 5);
        assert_eq!(tracker.classify_release(500.0), ThrowAction::Regenerate);
    }

    #[test]
    fn test_slow_drag_repositions_to_drop_point() {
        let tracker = VelocityTracker::from_samples(&gesture(-30.0, 0.0), 5);
        assert!((tracker.velocity().length() - 300.0).abs() < 1e-9);
        assert_eq!(
            tracker.classify_release(500.0),
            ThrowAction::Reposition { to: Vec2::new(110.0, 200.0) }
        );
    }

    #[test]
    fn test_fast_vertical_is_reposition() {
        let tracker = VelocityTracker::from_samples(&gesture(0.0, -80.0), 5);
        assert!(matches!(
            tracker.classify_release(500.0),
            ThrowAction::Reposition { .. }
        ));
    }

    #[test]
    fn test_no_movement_is_none() {
        let samples = vec![PointerSample::new(5.0, 5.0, 0), PointerSample::new(5.0, 5.0, 200)];
        let tracker = VelocityTracker::from_samples(&samples, 5);
        assert_eq!(tracker.classify_release(500.0), ThrowAction::None);
        assert_eq!(VelocityTracker::new(5).classify_release(500.0), ThrowAction::None);
    }

    #[test]
    fn test_window_keeps_latest_samples() {
        // Slow start, fast finish: only the last samples count for velocity
        let mut samples = vec![
            PointerSample::new(0.0, 0.0, 0),
            PointerSample::new(1.0, 0.0, 500),
            PointerSample::new(2.0, 0.0, 1000),
        ];
        samples.push(PointerSample::new(-100.0, 0.0, 1100));
        samples.push(PointerSample::new(-200.0, 0.0, 1200));

        let tracker = VelocityTracker::from_samples(&samples, 3);
        assert!((tracker.velocity().x + 1010.0).abs() < 1e-9);
        assert_eq!(tracker.offset(), Vec2::new(-200.0, 0.0));
    }

    #[test]
    fn test_zero_duration_is_guarded() {
        let samples = vec![PointerSample::new(0.0, 0.0, 10), PointerSample::new(50.0, 0.0, 10)];
        let tracker = VelocityTracker::from_samples(&samples, 5);
        assert_eq!(tracker.velocity(), Vec2::ZERO);
    }
}
