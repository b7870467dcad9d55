//! Partial hypothesis tracking.
//!
//! Tracks the two partial snapshots a session cares about (the most recent
//! decode and the longest decode seen since the last reset), and exposes the
//! centralized string primitives (`merge_with_overlap`, `words_related`,
//! `trim_leading_related_words`) that every other engine uses instead of
//! rolling its own substring test.

mod last_sent;
mod merge;
mod word_relation;

pub use last_sent::LastSentFinal;
pub use merge::{collapse_whitespace, merge_with_overlap};
pub use word_relation::{missing_words, prefix_matches_tolerant, trim_leading_related_words, words_related};

use std::time::{Duration, Instant};

/// A single partial hypothesis and when it was recorded.
#[derive(Debug, Clone, Default)]
pub struct PartialSnapshot {
    pub text: String,
    pub recorded_at: Option<Instant>,
}

impl PartialSnapshot {
    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// The result of successfully matching a tracked snapshot against a base
/// text: the extended text and the words it added beyond the base.
#[derive(Debug, Clone)]
pub struct ExtendedMatch {
    pub extended_text: String,
    pub missing_words: Vec<String>,
}

/// Tracks the latest and longest partial hypotheses seen for a segment.
///
/// Reset whenever the segment the partials belong to finalizes or commits,
/// so stale text from a previous segment can never leak into a later one.
#[derive(Debug, Default)]
pub struct PartialTracker {
    latest: PartialSnapshot,
    longest: PartialSnapshot,
}

impl PartialTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly received partial decode.
    pub fn update(&mut self, text: &str, now: Instant) {
        let snapshot = PartialSnapshot {
            text: text.to_string(),
            recorded_at: Some(now),
        };
        if snapshot.char_len() > self.longest.char_len() {
            self.longest = snapshot.clone();
        }
        self.latest = snapshot;
    }

    /// Clear both tracked snapshots, typically on segment finalize/commit.
    pub fn reset(&mut self) {
        self.latest = PartialSnapshot::default();
        self.longest = PartialSnapshot::default();
    }

    pub fn latest(&self) -> &PartialSnapshot {
        &self.latest
    }

    pub fn longest(&self) -> &PartialSnapshot {
        &self.longest
    }

    /// Does the longest tracked partial extend `base`, within `max_age`?
    pub fn check_longest_extends(&self, base: &str, max_age: Duration, now: Instant) -> Option<ExtendedMatch> {
        Self::check_extends(&self.longest, base, max_age, now)
    }

    /// Does the latest tracked partial extend `base`, within `max_age`?
    pub fn check_latest_extends(&self, base: &str, max_age: Duration, now: Instant) -> Option<ExtendedMatch> {
        Self::check_extends(&self.latest, base, max_age, now)
    }

    fn check_extends(snapshot: &PartialSnapshot, base: &str, max_age: Duration, now: Instant) -> Option<ExtendedMatch> {
        let recorded_at = snapshot.recorded_at?;
        if now.saturating_duration_since(recorded_at) > max_age {
            return None;
        }
        let norm_base = collapse_whitespace(base);
        let norm_snapshot = collapse_whitespace(&snapshot.text);
        if !prefix_matches_tolerant(&norm_snapshot, &norm_base) {
            return None;
        }
        let missing = missing_words(&norm_base, &norm_snapshot);
        if missing.is_empty() {
            return None;
        }
        Some(ExtendedMatch {
            extended_text: norm_snapshot,
            missing_words: missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_tracks_both_latest_and_longest() {
        let mut tracker = PartialTracker::new();
        let t0 = Instant::now();
        tracker.update("the quick brown", t0);
        tracker.update("the quick", t0);
        assert_eq!(tracker.latest().text, "the quick");
        assert_eq!(tracker.longest().text, "the quick brown");
    }

    #[test]
    fn reset_clears_both_snapshots() {
        let mut tracker = PartialTracker::new();
        tracker.update("some text", Instant::now());
        tracker.reset();
        assert!(tracker.latest().text.is_empty());
        assert!(tracker.longest().text.is_empty());
    }

    #[test]
    fn longest_extends_reports_missing_words() {
        let mut tracker = PartialTracker::new();
        let now = Instant::now();
        tracker.update("we gathered here today to celebrate", now);
        let extended = tracker
            .check_longest_extends("we gathered here today", Duration::from_millis(500), now)
            .expect("expected an extension match");
        assert_eq!(extended.missing_words, vec!["to".to_string(), "celebrate".to_string()]);
    }

    #[test]
    fn stale_snapshot_outside_max_age_does_not_extend() {
        let mut tracker = PartialTracker::new();
        let past = Instant::now();
        tracker.update("we gathered here today to celebrate", past);
        let later = past + Duration::from_secs(10);
        assert!(tracker
            .check_longest_extends("we gathered here today", Duration::from_millis(500), later)
            .is_none());
    }

    #[test]
    fn non_extending_base_returns_none() {
        let mut tracker = PartialTracker::new();
        let now = Instant::now();
        tracker.update("completely different text", now);
        assert!(tracker
            .check_longest_extends("we gathered here today", Duration::from_millis(500), now)
            .is_none());
    }

    #[test]
    fn exact_match_with_no_extension_returns_none() {
        let mut tracker = PartialTracker::new();
        let now = Instant::now();
        tracker.update("we gathered here today", now);
        assert!(tracker
            .check_longest_extends("we gathered here today", Duration::from_millis(500), now)
            .is_none());
    }
}
