//! Lightweight behavior signals derived from how the user answers:
//! latency, hedging language and length.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Slow answers above this are suspicious when also short.
const SLOW_RESPONSE_MS: i64 = 20_000;
/// Answers faster than this read as a gut reaction.
const FAST_RESPONSE_MS: i64 = 3_000;
const SHORT_ANSWER_CHARS: usize = 50;
const LONG_ANSWER_CHARS: usize = 200;
const LENGTH_SATURATION_CHARS: f64 = 500.0;

static HEDGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(maybe|might|probably|perhaps|possibly|not sure|unsure|i guess|i think|kind of|sort of|don'?t know|i suppose)\b",
    )
    .expect("hedge pattern is a valid regex")
});

/// Which observation a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ResponseTime,
    Hedging,
    ResponseLength,
}

/// What a signal suggests about the user's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indication {
    Clarity,
    Confusion,
}

/// A timestamped observation about one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSignal {
    pub kind: SignalKind,
    pub value: f64,
    pub indicates: Indication,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

impl BehaviorSignal {
    fn new(kind: SignalKind, value: f64, indicates: Indication, note: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            value,
            indicates,
            note: note.to_string(),
            timestamp,
        }
    }

    pub fn is_confusion(&self) -> bool {
        self.indicates == Indication::Confusion
    }
}

/// Tracks when the current question was shown and turns answers into signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorTracker {
    shown_at: DateTime<Utc>,
}

impl BehaviorTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { shown_at: now }
    }

    /// Restart the response timer, e.g. when a node is selected.
    pub fn start_tracking(&mut self, now: DateTime<Utc>) {
        self.shown_at = now;
    }

    pub fn shown_at(&self) -> DateTime<Utc> {
        self.shown_at
    }

    /// Every matching signal for `text` answered at `now`. Resets the timer.
    pub fn analyze_input(&mut self, text: &str, now: DateTime<Utc>) -> Vec<BehaviorSignal> {
        let elapsed_ms = (now - self.shown_at).num_milliseconds();
        let length = text.trim().chars().count();
        let mut signals = Vec::with_capacity(3);

        signals.push(if elapsed_ms > SLOW_RESPONSE_MS && length < SHORT_ANSWER_CHARS {
            BehaviorSignal::new(
                SignalKind::ResponseTime,
                0.8,
                Indication::Confusion,
                "long pause before a short answer",
                now,
            )
        } else if elapsed_ms < FAST_RESPONSE_MS {
            BehaviorSignal::new(
                SignalKind::ResponseTime,
                0.9,
                Indication::Clarity,
                "fast gut reaction",
                now,
            )
        } else {
            BehaviorSignal::new(SignalKind::ResponseTime, 0.5, Indication::Clarity, "steady pace", now)
        });

        if HEDGE_PATTERN.is_match(text) {
            signals.push(BehaviorSignal::new(
                SignalKind::Hedging,
                0.8,
                Indication::Confusion,
                "hedging language",
                now,
            ));
        }

        if length > LONG_ANSWER_CHARS {
            signals.push(BehaviorSignal::new(
                SignalKind::ResponseLength,
                (length as f64 / LENGTH_SATURATION_CHARS).min(1.0),
                Indication::Clarity,
                "detailed answer",
                now,
            ));
        }

        self.shown_at = now;
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_slow_short_answer_is_confusion() {
        let t0 = Utc::now();
        let mut tracker = BehaviorTracker::new(t0);
        let signals = tracker.analyze_input("twenty chars exactly", t0 + Duration::seconds(25));

        let timing = signals
            .iter()
            .find(|s| s.kind == SignalKind::ResponseTime)
            .unwrap();
        assert_eq!(timing.indicates, Indication::Confusion);
        assert_eq!(timing.value, 0.8);
    }

    #[test]
    fn test_fast_answer_is_clarity() {
        let t0 = Utc::now();
        let mut tracker = BehaviorTracker::new(t0);
        let signals = tracker.analyze_input("Yes", t0 + Duration::milliseconds(1500));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].indicates, Indication::Clarity);
        assert_eq!(signals[0].value, 0.9);
    }

    #[test]
    fn test_neutral_default() {
        let t0 = Utc::now();
        let mut tracker = BehaviorTracker::new(t0);
        let signals = tracker.analyze_input("A steady answer", t0 + Duration::seconds(10));
        assert_eq!(signals[0].value, 0.5);
        assert_eq!(signals[0].indicates, Indication::Clarity);
    }

    #[test]
    fn test_slow_long_answer_is_not_confusion() {
        let t0 = Utc::now();
        let mut tracker = BehaviorTracker::new(t0);
        let text = "x".repeat(80);
        let signals = tracker.analyze_input(&text, t0 + Duration::seconds(30));
        assert_eq!(signals[0].indicates, Indication::Clarity);
    }

    #[test]
    fn test_hedging_detected() {
        let t0 = Utc::now();
        let mut tracker = BehaviorTracker::new(t0);
        let signals = tracker.analyze_input("I'm not sure, maybe", t0 + Duration::seconds(5));
        let hedge = signals.iter().find(|s| s.kind == SignalKind::Hedging).unwrap();
        assert!(hedge.is_confusion());
        assert_eq!(hedge.value, 0.8);
    }

    #[test]
    fn test_hedge_requires_word_boundary() {
        let t0 = Utc::now();
        let mut tracker = BehaviorTracker::new(t0);
        let signals = tracker.analyze_input("The mighty river", t0 + Duration::seconds(5));
        assert!(signals.iter().all(|s| s.kind != SignalKind::Hedging));
    }

    #[test]
    fn test_long_answer_signal_and_all_emitted() {
        let t0 = Utc::now();
        let mut tracker = BehaviorTracker::new(t0);
        let text = format!("probably {}", "a".repeat(300));
        let signals = tracker.analyze_input(&text, t0 + Duration::seconds(1));

        assert_eq!(signals.len(), 3);
        let length = signals
            .iter()
            .find(|s| s.kind == SignalKind::ResponseLength)
            .unwrap();
        assert!((length.value - 309.0 / 500.0).abs() < 1e-9);

        let saturated = tracker.analyze_input(&"b".repeat(900), t0 + Duration::seconds(2));
        let length = saturated
            .iter()
            .find(|s| s.kind == SignalKind::ResponseLength)
            .unwrap();
        assert_eq!(length.value, 1.0);
    }

    #[test]
    fn test_timer_resets_after_each_call() {
        let t0 = Utc::now();
        let mut tracker = BehaviorTracker::new(t0);
        let t1 = t0 + Duration::seconds(40);
        tracker.analyze_input("ok", t1);
        assert_eq!(tracker.shown_at(), t1);

        let signals = tracker.analyze_input("ok", t1 + Duration::seconds(1));
        assert_eq!(signals[0].indicates, Indication::Clarity);
    }
}
