//! The Forced Commit Engine.
//!
//! A forced final is flagged by the upstream provider as emitted due to a
//! stream restart rather than natural endpointing; words near the cut are
//! often missing. This engine buffers the forced text, arms a two-phase
//! timeout that gives a short audio-recapture window a chance to recover
//! the missing words, and decides when the buffered text should ultimately
//! commit. All audio I/O and the actual recapture stream live outside this
//! crate; this engine only ever returns decisions.

use relay_finalize::has_significant_overlap;
use relay_partial::{LastSentFinal, PartialTracker};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ForcedConfig {
    pub phase2_delay: Duration,
    pub pre_final_capture: Duration,
    pub post_final_capture_cap: Duration,
    pub partial_extends_max_age: Duration,
}

impl Default for ForcedConfig {
    fn default() -> Self {
        Self {
            phase2_delay: Duration::from_millis(1200),
            pre_final_capture: Duration::from_millis(1400),
            post_final_capture_cap: Duration::from_millis(800),
            partial_extends_max_age: Duration::from_secs(5),
        }
    }
}

/// How much buffered audio to request around the forced-final instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureWindow {
    pub pre: Duration,
    pub post: Duration,
}

/// State held open while a forced final awaits possible recovery.
#[derive(Debug, Clone)]
pub struct ForcedFinalBuffer {
    pub buffered_text: String,
    pub predecessor: LastSentFinal,
    pub opened_at: Instant,
    pub committed_by_recovery: bool,
}

impl ForcedFinalBuffer {
    /// Recovery must call this before invoking its commit callback, so a
    /// racing session-close or overlap check never double-commits.
    pub fn mark_committed_by_recovery(&mut self) {
        self.committed_by_recovery = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForcedDecision {
    Noop,
    /// Buffer opened; the orchestrator should cancel any armed finalization
    /// deadline for the segment that just produced this forced final.
    OpenedBuffer { cancel_pending_finalization: bool },
    ArmPhase2 { deadline: Instant },
    RequestCapture { window: CaptureWindow },
    Commit(String),
}

#[derive(Debug)]
pub struct ForcedCommitEngine {
    config: ForcedConfig,
    buffer: Option<ForcedFinalBuffer>,
}

fn strip_punct_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Exact start, or at least 80% word-by-word prefix agreement on a
/// punctuation-stripped comparison.
fn extends_forced(forced: &str, candidate: &str) -> bool {
    if candidate.starts_with(forced) {
        return true;
    }
    let forced_words = strip_punct_words(forced);
    let candidate_words = strip_punct_words(candidate);
    if forced_words.is_empty() {
        return false;
    }
    let compare_len = forced_words.len().min(candidate_words.len());
    let matches = forced_words
        .iter()
        .zip(candidate_words.iter())
        .take(compare_len)
        .filter(|(a, b)| a == b)
        .count();
    (matches as f32 / forced_words.len() as f32) >= 0.8
}

impl ForcedCommitEngine {
    pub fn new(config: ForcedConfig) -> Self {
        Self { config, buffer: None }
    }

    pub fn is_active(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer(&self) -> Option<&ForcedFinalBuffer> {
        self.buffer.as_ref()
    }

    /// Step 1-4 minus the capture request: promote from a longer tracked
    /// partial, open the buffer, and signal that any pending finalization
    /// for this segment should be cancelled.
    pub fn on_forced_final(
        &mut self,
        forced_text: &str,
        tracker: &PartialTracker,
        last_sent: &LastSentFinal,
        now: Instant,
    ) -> (String, ForcedDecision) {
        let chosen = self.promote_from_longest(forced_text, tracker, now);
        self.buffer = Some(ForcedFinalBuffer {
            buffered_text: chosen.clone(),
            predecessor: last_sent.clone(),
            opened_at: now,
            committed_by_recovery: false,
        });
        (chosen, ForcedDecision::OpenedBuffer { cancel_pending_finalization: true })
    }

    fn promote_from_longest(&self, forced_text: &str, tracker: &PartialTracker, now: Instant) -> String {
        let longest = tracker.longest();
        if longest.text.chars().count() <= forced_text.chars().count() {
            return forced_text.to_string();
        }
        let Some(recorded_at) = longest.recorded_at else {
            return forced_text.to_string();
        };
        if now.saturating_duration_since(recorded_at) > self.config.partial_extends_max_age {
            return forced_text.to_string();
        }
        if extends_forced(forced_text, &longest.text) {
            longest.text.clone()
        } else {
            forced_text.to_string()
        }
    }

    pub fn schedule_phase2(&self, now: Instant) -> Instant {
        now + self.config.phase2_delay
    }

    /// Phase 2: absorb any late partials, then request a capped capture
    /// window of buffered audio around the forced instant.
    pub fn on_phase2_fire(&mut self, tracker: &PartialTracker, now: Instant) -> ForcedDecision {
        let Some(buffer) = self.buffer.as_mut() else {
            return ForcedDecision::Noop;
        };
        if let Some(extended) = tracker.check_longest_extends(&buffer.buffered_text, Duration::from_secs(5), now) {
            buffer.buffered_text = extended.extended_text;
        }
        ForcedDecision::RequestCapture {
            window: CaptureWindow {
                pre: self.config.pre_final_capture,
                post: self.config.post_final_capture_cap,
            },
        }
    }

    /// No audio was available to recapture; commit the buffered text
    /// directly, unless recovery already beat us to it.
    pub fn on_capture_empty(&mut self) -> ForcedDecision {
        match self.buffer.take() {
            Some(b) if !b.committed_by_recovery => ForcedDecision::Commit(b.buffered_text),
            _ => ForcedDecision::Noop,
        }
    }

    /// Step 5: a later partial arrived while recovery is in flight and
    /// extends the buffered text; fold it in before recovery resolves.
    pub fn absorb_late_partial(&mut self, tracker: &PartialTracker, now: Instant) -> bool {
        let Some(buffer) = self.buffer.as_mut() else {
            return false;
        };
        if let Some(extended) = tracker.check_latest_extends(&buffer.buffered_text, Duration::from_secs(5), now) {
            buffer.buffered_text = extended.extended_text;
            true
        } else {
            false
        }
    }

    /// The Recovery Stream Engine resolved (or hard-failed). `recovered_merge`
    /// is the already-merged text, or `None` on hard failure.
    pub fn on_recovery_resolved(&mut self, recovered_merge: Option<String>) -> ForcedDecision {
        match self.buffer.take() {
            Some(b) if !b.committed_by_recovery => ForcedDecision::Commit(recovered_merge.unwrap_or(b.buffered_text)),
            _ => ForcedDecision::Noop,
        }
    }

    /// Step 6: a non-forced final arrived while the buffer is active.
    /// Should the orchestrator await the in-flight recovery before
    /// processing the new final as its own segment?
    pub fn should_wait_for_recovery_on_new_final(&self, new_final_text: &str) -> bool {
        match &self.buffer {
            Some(buffer) => has_significant_overlap(&buffer.buffered_text, new_final_text),
            None => false,
        }
    }

    /// Step 7: session close, connection drop, or audio-end while the
    /// buffer is active. Commit immediately; recovery is no longer
    /// possible without audio.
    pub fn on_session_close(&mut self) -> ForcedDecision {
        match self.buffer.take() {
            Some(b) if !b.committed_by_recovery => ForcedDecision::Commit(b.buffered_text),
            _ => ForcedDecision::Noop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_final_opens_a_buffer_and_cancels_pending() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let tracker = PartialTracker::new();
        let last_sent = LastSentFinal::new();
        let (text, decision) = engine.on_forced_final("the decoder cut off", &tracker, &last_sent, Instant::now());
        assert_eq!(text, "the decoder cut off");
        assert_eq!(decision, ForcedDecision::OpenedBuffer { cancel_pending_finalization: true });
        assert!(engine.is_active());
    }

    #[test]
    fn longer_fresh_partial_promotes_the_forced_text() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let mut tracker = PartialTracker::new();
        let now = Instant::now();
        tracker.update("the decoder cut off mid sentence", now);
        let (text, _) = engine.on_forced_final("the decoder cut off", &tracker, &LastSentFinal::new(), now);
        assert_eq!(text, "the decoder cut off mid sentence");
    }

    #[test]
    fn stale_longer_partial_is_not_used() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let mut tracker = PartialTracker::new();
        let now = Instant::now();
        tracker.update("the decoder cut off mid sentence", now);
        let later = now + Duration::from_secs(6);
        let (text, _) = engine.on_forced_final("the decoder cut off", &tracker, &LastSentFinal::new(), later);
        assert_eq!(text, "the decoder cut off");
    }

    #[test]
    fn phase2_requests_a_capped_capture_window() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let tracker = PartialTracker::new();
        let now = Instant::now();
        engine.on_forced_final("partial words", &tracker, &LastSentFinal::new(), now);
        let decision = engine.on_phase2_fire(&tracker, now + Duration::from_millis(1200));
        assert_eq!(
            decision,
            ForcedDecision::RequestCapture {
                window: CaptureWindow { pre: Duration::from_millis(1400), post: Duration::from_millis(800) }
            }
        );
    }

    #[test]
    fn capture_empty_commits_buffered_text_when_not_already_committed() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let tracker = PartialTracker::new();
        engine.on_forced_final("partial words", &tracker, &LastSentFinal::new(), Instant::now());
        let decision = engine.on_capture_empty();
        assert_eq!(decision, ForcedDecision::Commit("partial words".to_string()));
        assert!(!engine.is_active());
    }

    #[test]
    fn recovery_resolution_is_skipped_once_already_committed() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let tracker = PartialTracker::new();
        engine.on_forced_final("partial words", &tracker, &LastSentFinal::new(), Instant::now());
        // Simulate recovery having already committed via some other path.
        if let Some(buffer) = engine.buffer.as_mut() {
            buffer.mark_committed_by_recovery();
        }
        let decision = engine.on_recovery_resolved(Some("partial words and more".to_string()));
        assert_eq!(decision, ForcedDecision::Noop);
    }

    #[test]
    fn session_close_flushes_an_active_buffer() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let tracker = PartialTracker::new();
        engine.on_forced_final("partial words", &tracker, &LastSentFinal::new(), Instant::now());
        assert_eq!(engine.on_session_close(), ForcedDecision::Commit("partial words".to_string()));
        assert!(!engine.is_active());
    }

    #[test]
    fn overlapping_new_final_waits_for_recovery() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let tracker = PartialTracker::new();
        engine.on_forced_final("we gathered here today", &tracker, &LastSentFinal::new(), Instant::now());
        assert!(engine.should_wait_for_recovery_on_new_final("we gathered here today to celebrate"));
    }

    #[test]
    fn unrelated_new_final_does_not_wait() {
        let mut engine = ForcedCommitEngine::new(ForcedConfig::default());
        let tracker = PartialTracker::new();
        engine.on_forced_final("we gathered here today", &tracker, &LastSentFinal::new(), Instant::now());
        assert!(!engine.should_wait_for_recovery_on_new_final("a completely separate new topic starts now"));
    }
}
