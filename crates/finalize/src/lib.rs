//! The Finalization Engine.
//!
//! Decides, for each stable (non-forced) hypothesis a session receives, how
//! long to hold it before committing it as a final, and whether a later
//! event should re-arm, reschedule, or short-circuit that wait. The engine
//! itself never sleeps or schedules a timer; it returns a [`FinalizeDecision`]
//! and leaves arming/cancelling real timers to the async orchestrator that
//! owns the session.

mod false_final;

use relay_partial::{merge_with_overlap, trim_leading_related_words, words_related, LastSentFinal, PartialTracker};
use std::time::{Duration, Instant};

pub use false_final::is_false_final_opening;

/// Tunable wait-time constants for the Finalization Engine.
#[derive(Debug, Clone)]
pub struct FinalizeConfig {
    pub max_finalization_wait: Duration,
    pub base_wait: Duration,
    pub long_text_threshold: usize,
    pub long_text_wait: Duration,
    pub very_long_text_threshold: usize,
    pub very_long_text_extra_ms_per_char: f64,
    pub false_final_wait: Duration,
    pub final_continuation_window: Duration,
    pub reschedule_cap: Duration,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            max_finalization_wait: Duration::from_millis(8000),
            base_wait: Duration::from_millis(1000),
            long_text_threshold: 200,
            long_text_wait: Duration::from_millis(1800),
            very_long_text_threshold: 300,
            very_long_text_extra_ms_per_char: 3.0,
            false_final_wait: Duration::from_millis(3000),
            final_continuation_window: Duration::from_millis(3000),
            reschedule_cap: Duration::from_millis(4000),
        }
    }
}

impl FinalizeConfig {
    /// The base wait for a piece of text, before the not-sentence-ending and
    /// too-short extensions are applied.
    fn wait_for_text_length(&self, text: &str) -> Duration {
        let len = text.chars().count();
        if len >= self.very_long_text_threshold {
            let extra_chars = (len - self.very_long_text_threshold) as f64;
            let extra_ms = self.very_long_text_extra_ms_per_char * extra_chars;
            self.base_wait + Duration::from_millis(extra_ms.round() as u64)
        } else if len >= self.long_text_threshold {
            self.long_text_wait
        } else {
            self.base_wait
        }
    }
}

fn ends_with_sentence_punctuation(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.') | Some('!') | Some('?'))
}

/// A finalization timer currently armed for a segment.
#[derive(Debug, Clone)]
pub struct PendingFinalization {
    pub text: String,
    pub armed_at: Instant,
    pub deadline: Instant,
    pub is_false_final: bool,
}

/// What the orchestrator should do in response to a Finalization Engine
/// event. The engine never touches real timers itself.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeDecision {
    /// Nothing changed; no timer needs to move.
    Noop,
    /// Arm (or re-arm) a deadline for this text.
    ArmDeadline { text: String, deadline: Instant },
    /// Commit this text as a final now; clears any pending state.
    Commit(String),
}

/// Decides wait times and promotions for stable hypotheses in one segment.
#[derive(Debug)]
pub struct FinalizationEngine {
    config: FinalizeConfig,
    pending: Option<PendingFinalization>,
}

impl FinalizationEngine {
    pub fn new(config: FinalizeConfig) -> Self {
        Self { config, pending: None }
    }

    pub fn pending(&self) -> Option<&PendingFinalization> {
        self.pending.as_ref()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Step 6 final paragraph of the Finalization Engine: on an incoming
    /// stable `T`, check whether it continues the last-sent final. If so,
    /// returns the rewritten (merged/extended) text and trims trailing
    /// duplicate words from the predecessor.
    pub fn detect_continuation(&mut self, text: &str, last_sent: &LastSentFinal, now: Instant) -> Option<String> {
        if !last_sent.sent_within(self.config.final_continuation_window, now) {
            return None;
        }
        let rewritten = if text.starts_with(last_sent.final_text.as_str()) {
            Some(text.to_string())
        } else {
            merge_with_overlap(&last_sent.final_text, text)
        }?;

        if let Some(pending) = &self.pending {
            if last_sent.final_text.starts_with(pending.text.as_str()) || pending.text == last_sent.final_text {
                self.pending = None;
            }
        }
        Some(rewritten)
    }

    /// Trim trailing words from `predecessor_final` that duplicate the
    /// leading words of `incoming_text`, to prevent word doubling across
    /// segment joins. Returns the words of `incoming_text` with the overlap
    /// removed.
    pub fn trim_join_overlap(predecessor_final: &str, incoming_text: &str) -> String {
        let words: Vec<String> = incoming_text.split_whitespace().map(str::to_string).collect();
        let overlap = trim_leading_related_words(predecessor_final, &words, 5);
        words[overlap..].join(" ")
    }

    /// Behavior on receipt of a stable (non-forced) hypothesis `T`.
    pub fn on_stable(&mut self, text: &str, tracker: &PartialTracker, now: Instant) -> FinalizeDecision {
        // 1. Extension check: a pending finalization whose text is a prefix of T.
        if let Some(pending) = &self.pending {
            if text.starts_with(pending.text.as_str()) && text.len() > pending.text.len() {
                let deadline = self.arm(text, now, self.is_false_final_candidate(text));
                return FinalizeDecision::ArmDeadline { text: text.to_string(), deadline };
            }
        }

        // 2. Partial promotion.
        let mut chosen = text.to_string();
        if let Some(extended) = tracker.check_longest_extends(text, Duration::from_secs(10), now) {
            chosen = extended.extended_text;
        } else if let Some(extended) = tracker.check_latest_extends(text, Duration::from_secs(5), now) {
            chosen = extended.extended_text;
        } else if let Some(merged) = merge_with_overlap(text, &tracker.longest().text) {
            if merged.chars().count() >= text.chars().count() + 3 {
                chosen = merged;
            }
        }

        // 3. False-final detection.
        let is_false_final = self.is_false_final_candidate(&chosen);

        // 4. Schedule deadline.
        let deadline = self.arm(&chosen, now, is_false_final);
        FinalizeDecision::ArmDeadline { text: chosen, deadline }
    }

    fn is_false_final_candidate(&self, text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.chars().count() < 25
            && ends_with_sentence_punctuation(trimmed)
            && is_false_final_opening(trimmed)
    }

    fn arm(&mut self, text: &str, now: Instant, is_false_final: bool) -> Instant {
        let wait = if is_false_final {
            self.config.false_final_wait
        } else {
            let mut wait = self.config.wait_for_text_length(text);
            if !ends_with_sentence_punctuation(text) {
                let floor = if text.chars().count() < 50 {
                    Duration::from_millis(2000)
                } else {
                    Duration::from_millis(1500)
                };
                wait = wait.max(floor);
            }
            wait
        };
        let deadline = now + wait;
        self.pending = Some(PendingFinalization {
            text: text.to_string(),
            armed_at: now,
            deadline,
            is_false_final,
        });
        deadline
    }

    /// Step 5: behavior when an armed deadline fires.
    pub fn on_deadline_fire(&mut self, tracker: &mut PartialTracker, now: Instant) -> FinalizeDecision {
        let Some(pending) = self.pending.clone() else {
            return FinalizeDecision::Noop;
        };

        // a. Re-query partial tracker for extensions; promote if found.
        let mut text = pending.text.clone();
        if let Some(extended) = tracker.check_longest_extends(&text, Duration::from_secs(10), now) {
            text = extended.extended_text;
        } else if let Some(extended) = tracker.check_latest_extends(&text, Duration::from_secs(5), now) {
            text = extended.extended_text;
        }

        let elapsed = now.saturating_duration_since(pending.armed_at);

        // b. Reschedule if still incomplete and under the hard ceiling.
        if !ends_with_sentence_punctuation(&text) && elapsed < self.config.max_finalization_wait {
            let remaining = self.config.max_finalization_wait - elapsed;
            let wait = self.config.reschedule_cap.min(remaining);
            let deadline = now + wait;
            self.pending = Some(PendingFinalization {
                text: text.clone(),
                armed_at: pending.armed_at,
                deadline,
                is_false_final: pending.is_false_final,
            });
            return FinalizeDecision::ArmDeadline { text, deadline };
        }

        // c. Commit.
        self.pending = None;
        tracker.reset();
        FinalizeDecision::Commit(text)
    }
}

/// Whether a short final has significant lexical overlap with another piece
/// of text, using the shared word-relation primitive (prefix, suffix, or a
/// high proportion of shared multi-character words).
pub fn has_significant_overlap(a: &str, b: &str) -> bool {
    if merge_with_overlap(a, b).is_some() || merge_with_overlap(b, a).is_some() {
        return true;
    }
    let a_words: Vec<&str> = a.split_whitespace().filter(|w| w.len() > 2).collect();
    let b_words: Vec<&str> = b.split_whitespace().filter(|w| w.len() > 2).collect();
    if a_words.is_empty() || b_words.is_empty() {
        return false;
    }
    let shared = a_words
        .iter()
        .filter(|aw| b_words.iter().any(|bw| words_related(aw, bw)))
        .count();
    let ratio = shared as f32 / a_words.len().max(b_words.len()) as f32;
    ratio >= 0.3
}
