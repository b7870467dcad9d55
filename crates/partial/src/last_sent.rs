//! The last-sent-final value object, shared by the Finalization Engine's
//! continuation detection and the Result Dispatcher's duplicate guard.

use std::time::{Duration, Instant};

/// The most recent final text actually sent to listeners for a session.
///
/// Tracks both the original (pre-correction) and final (post-grammar-fix)
/// text, since continuation detection and dedup compare against different
/// ones of the two.
#[derive(Debug, Clone, Default)]
pub struct LastSentFinal {
    pub original_text: String,
    pub final_text: String,
    pub sent_at: Option<Instant>,
    pub source_seq_id: Option<u64>,
}

impl LastSentFinal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, original_text: &str, final_text: &str, source_seq_id: u64, now: Instant) {
        self.original_text = original_text.to_string();
        self.final_text = final_text.to_string();
        self.source_seq_id = Some(source_seq_id);
        self.sent_at = Some(now);
    }

    /// Whether a final was sent, and it was sent within `window` of `now`.
    pub fn sent_within(&self, window: Duration, now: Instant) -> bool {
        match self.sent_at {
            Some(at) => now.saturating_duration_since(at) <= window,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sent_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_has_no_last_sent() {
        let tracker = LastSentFinal::new();
        assert!(tracker.is_empty());
        assert!(!tracker.sent_within(Duration::from_secs(3), Instant::now()));
    }

    #[test]
    fn recorded_final_is_within_window_until_it_expires() {
        let mut tracker = LastSentFinal::new();
        let sent_at = Instant::now();
        tracker.record("hello world", "Hello world.", 7, sent_at);
        assert!(tracker.sent_within(Duration::from_secs(3), sent_at));
        let later = sent_at + Duration::from_secs(4);
        assert!(!tracker.sent_within(Duration::from_secs(3), later));
    }
}
