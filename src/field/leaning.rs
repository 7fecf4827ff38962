//! Damped leaning indicator. Never a verdict: it moves slowly and has to
//! drain before it can point somewhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaningVector {
    pub direction: Option<String>,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LeaningVector {
    /// Move toward `direction` at `target` confidence, shifting by at most
    /// `max_shift`. A different direction first drains the current
    /// confidence; the new label is adopted once it reaches zero.
    pub fn update(
        &self,
        direction: &str,
        target: f64,
        max_shift: f64,
        now: DateTime<Utc>,
    ) -> LeaningVector {
        let target = target.clamp(0.0, 1.0);
        let max_shift = max_shift.max(0.0);

        let same_direction = self
            .direction
            .as_deref()
            .map_or(true, |d| d.eq_ignore_ascii_case(direction));

        if !same_direction && self.confidence > EPSILON {
            let confidence = (self.confidence - max_shift).max(0.0);
            let direction = if confidence <= EPSILON {
                Some(direction.to_string())
            } else {
                self.direction.clone()
            };
            return LeaningVector {
                direction,
                confidence,
                updated_at: Some(now),
            };
        }

        let delta = (target - self.confidence).clamp(-max_shift, max_shift);
        LeaningVector {
            direction: Some(direction.to_string()),
            confidence: (self.confidence + delta).clamp(0.0, 1.0),
            updated_at: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_is_bounded() {
        let now = Utc::now();
        let leaning = LeaningVector::default().update("stay", 0.9, 0.15, now);
        assert_eq!(leaning.direction.as_deref(), Some("stay"));
        assert!((leaning.confidence - 0.15).abs() < 1e-12);

        let leaning = leaning.update("stay", 0.2, 0.15, now);
        assert!((leaning.confidence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_direction_change_drains_first() {
        let now = Utc::now();
        let leaning = LeaningVector {
            direction: Some("stay".into()),
            confidence: 0.25,
            updated_at: None,
        };

        let step1 = leaning.update("leave", 0.9, 0.15, now);
        assert_eq!(step1.direction.as_deref(), Some("stay"));
        assert!((step1.confidence - 0.10).abs() < 1e-12);

        let step2 = step1.update("leave", 0.9, 0.15, now);
        assert_eq!(step2.direction.as_deref(), Some("leave"));
        assert_eq!(step2.confidence, 0.0);

        let step3 = step2.update("leave", 0.9, 0.15, now);
        assert!((step3.confidence - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_target_clamped() {
        let now = Utc::now();
        let mut leaning = LeaningVector::default();
        for _ in 0..20 {
            leaning = leaning.update("stay", 3.0, 0.15, now);
        }
        assert_eq!(leaning.confidence, 1.0);
    }
}
