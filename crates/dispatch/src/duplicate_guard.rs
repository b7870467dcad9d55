//! The duplicate guard: step 1 of the commit path. Exact-match rejection
//! close in time, relaxing to looser lexical-overlap thresholds the longer
//! it's been since the last commit.
//!
//! The windows are "within 5s: exact match", "forced finals within 10s:
//! prefix/overlap rule", "outside 5s but within 3s continuation window: 85%
//! overlap", "beyond: 90% overlap". The 3s bound is strictly inside the 5s
//! one, so read literally the third rule can never fire after the first. We
//! treat the 3s check as a tighter, independent check layered under the 5s
//! exact-match rule rather than a mutually exclusive band (see DESIGN.md).

use relay_partial::{collapse_whitespace, words_related, LastSentFinal};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DuplicateGuardConfig {
    pub exact_window: Duration,
    pub forced_window: Duration,
    pub forced_prefix_len: usize,
    pub forced_overlap_ratio: f32,
    pub forced_max_diff: usize,
    pub continuation_catch_window: Duration,
    pub continuation_overlap_ratio: f32,
    pub continuation_max_diff: usize,
    pub late_overlap_ratio: f32,
    pub late_max_diff: usize,
}

impl Default for DuplicateGuardConfig {
    fn default() -> Self {
        Self {
            exact_window: Duration::from_secs(5),
            forced_window: Duration::from_secs(10),
            forced_prefix_len: 30,
            forced_overlap_ratio: 0.75,
            forced_max_diff: 30,
            continuation_catch_window: Duration::from_secs(3),
            continuation_overlap_ratio: 0.85,
            continuation_max_diff: 15,
            late_overlap_ratio: 0.90,
            late_max_diff: 25,
        }
    }
}

fn normalize(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

/// Word-overlap ratio via greedy one-to-one stem-aware matching, divided by
/// the longer of the two word counts.
fn word_overlap_ratio(a: &str, b: &str) -> f32 {
    let a_words: Vec<&str> = a.split_whitespace().collect();
    let b_words: Vec<&str> = b.split_whitespace().collect();
    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }
    let mut used = vec![false; b_words.len()];
    let mut matches = 0usize;
    for aw in &a_words {
        if let Some(idx) = b_words.iter().enumerate().position(|(i, bw)| !used[i] && words_related(aw, bw)) {
            used[idx] = true;
            matches += 1;
        }
    }
    matches as f32 / a_words.len().max(b_words.len()) as f32
}

fn char_len_diff(a: &str, b: &str) -> usize {
    a.chars().count().abs_diff(b.chars().count())
}

fn either_is_prefix_of_len(a: &str, b: &str, min_len: usize) -> bool {
    let shared_prefix_len = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    shared_prefix_len >= min_len && (shared_prefix_len == a.chars().count() || shared_prefix_len == b.chars().count())
}

/// Whether `candidate` should be rejected as a duplicate of the last-sent
/// final, per the core spec's step 1 duplicate guard.
pub fn is_duplicate(
    candidate: &str,
    is_forced: bool,
    last_sent: &LastSentFinal,
    config: &DuplicateGuardConfig,
    now: Instant,
) -> bool {
    if last_sent.is_empty() {
        return false;
    }
    let Some(sent_at) = last_sent.sent_at else { return false };
    let age = now.saturating_duration_since(sent_at);

    let normalized_candidate = normalize(candidate);
    let normalized_original = normalize(&last_sent.original_text);
    let normalized_final = normalize(&last_sent.final_text);

    if age <= config.exact_window
        && (normalized_candidate == normalized_original || normalized_candidate == normalized_final)
    {
        return true;
    }

    if is_forced && age <= config.forced_window {
        let strictly_longer = candidate.chars().count() > last_sent.final_text.chars().count()
            && candidate.chars().count() > last_sent.original_text.chars().count();
        if !strictly_longer {
            let prefix_match = either_is_prefix_of_len(candidate, &last_sent.final_text, config.forced_prefix_len);
            let overlap = word_overlap_ratio(candidate, &last_sent.final_text);
            let diff = char_len_diff(candidate, &last_sent.final_text);
            if prefix_match || (overlap >= config.forced_overlap_ratio && diff < config.forced_max_diff) {
                return true;
            }
        }
    }

    if age <= config.continuation_catch_window {
        let overlap = word_overlap_ratio(candidate, &last_sent.final_text);
        let diff = char_len_diff(candidate, &last_sent.final_text);
        if overlap >= config.continuation_overlap_ratio && diff < config.continuation_max_diff {
            return true;
        }
    }

    let max_window = if is_forced {
        config.forced_window.max(config.exact_window).max(config.continuation_catch_window)
    } else {
        config.exact_window.max(config.continuation_catch_window)
    };
    if age <= max_window {
        return false;
    }

    let overlap = word_overlap_ratio(candidate, &last_sent.final_text);
    let diff = char_len_diff(candidate, &last_sent.final_text);
    overlap >= config.late_overlap_ratio && diff < config.late_max_diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_sent_at(text: &str, at: Instant) -> LastSentFinal {
        let mut tracker = LastSentFinal::new();
        tracker.record(text, text, 1, at);
        tracker
    }

    #[test]
    fn exact_repeat_within_five_seconds_is_a_duplicate() {
        let now = Instant::now();
        let last_sent = last_sent_at("We should meet tomorrow.", now);
        let later = now + Duration::from_secs(3);
        assert!(is_duplicate("We should meet tomorrow.", false, &last_sent, &DuplicateGuardConfig::default(), later));
    }

    #[test]
    fn distinct_text_within_window_is_not_a_duplicate() {
        let now = Instant::now();
        let last_sent = last_sent_at("We should meet tomorrow.", now);
        let later = now + Duration::from_secs(3);
        assert!(!is_duplicate("Let's grab coffee instead.", false, &last_sent, &DuplicateGuardConfig::default(), later));
    }

    #[test]
    fn forced_final_with_heavy_overlap_is_rejected_unless_strictly_longer() {
        let now = Instant::now();
        let last_sent = last_sent_at("self-centered desires cordoned off", now);
        let later = now + Duration::from_secs(6);
        assert!(is_duplicate("self-centered desires cordoned", true, &last_sent, &DuplicateGuardConfig::default(), later));
        assert!(!is_duplicate(
            "self-centered desires cordoned off from everyone around them",
            true,
            &last_sent,
            &DuplicateGuardConfig::default(),
            later
        ));
    }

    #[test]
    fn late_arrival_needs_near_identical_overlap_to_be_rejected() {
        let now = Instant::now();
        let last_sent = last_sent_at("the quick brown fox jumps", now);
        let later = now + Duration::from_secs(20);
        assert!(is_duplicate("the quick brown fox jumps", false, &last_sent, &DuplicateGuardConfig::default(), later));
        assert!(!is_duplicate("the quick brown fox", false, &last_sent, &DuplicateGuardConfig::default(), later));
    }

    #[test]
    fn empty_last_sent_never_flags_a_duplicate() {
        let last_sent = LastSentFinal::new();
        assert!(!is_duplicate("anything at all", false, &last_sent, &DuplicateGuardConfig::default(), Instant::now()));
    }
}
