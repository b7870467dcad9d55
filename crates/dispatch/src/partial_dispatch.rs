//! Partial-result dispatch: a much lighter touch than the commit path since
//! partials are provisional by nature, but still deduped against the last
//! committed final and throttled so a word-by-word STT stream doesn't
//! flood listeners with a message per token.

use relay_partial::{trim_leading_related_words, LastSentFinal};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PartialDispatchConfig {
    pub min_growth_chars: usize,
    pub min_growth_interval: Duration,
    pub short_segment_start_delay: Duration,
    pub short_segment_start_max_len: usize,
    pub dedup_trailing_words: usize,
}

impl Default for PartialDispatchConfig {
    fn default() -> Self {
        Self {
            min_growth_chars: 2,
            min_growth_interval: Duration::from_millis(150),
            short_segment_start_delay: Duration::from_secs(2),
            short_segment_start_max_len: 15,
            dedup_trailing_words: 5,
        }
    }
}

/// Per-session state the dispatcher needs across partial calls. Distinct
/// from `LastSentFinal`, which tracks committed finals, not partials.
#[derive(Debug, Clone, Default)]
pub struct PartialDispatchState {
    last_emitted_text: String,
    last_emitted_at: Option<Instant>,
}

impl PartialDispatchState {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, text: &str, now: Instant) {
        self.last_emitted_text = text.to_string();
        self.last_emitted_at = Some(now);
    }
}

#[derive(Debug, Clone)]
pub struct PartialDispatchInput {
    pub text: String,
    /// True for the first partial received since the last committed final
    /// (a fresh segment), so the short-segment-start delay only applies at
    /// the start of a new utterance, not mid-sentence.
    pub is_segment_start: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartialDispatchOutcome {
    Emit(String),
    Suppressed,
}

/// Decide whether (and what) to emit for an incoming partial. Does not
/// allocate a `seq_id` or build a `TranslationMessage`; the caller stamps
/// and emits once it has a non-suppressed outcome.
pub fn dispatch_partial(
    input: PartialDispatchInput,
    state: &mut PartialDispatchState,
    last_sent: &LastSentFinal,
    config: &PartialDispatchConfig,
    now: Instant,
) -> PartialDispatchOutcome {
    let words: Vec<String> = input.text.split_whitespace().map(str::to_string).collect();
    if words.is_empty() {
        return PartialDispatchOutcome::Suppressed;
    }

    let overlap = trim_leading_related_words(&last_sent.final_text, &words, config.dedup_trailing_words);
    let deduped = words[overlap..].join(" ");
    if deduped.trim().is_empty() {
        return PartialDispatchOutcome::Suppressed;
    }

    if input.is_segment_start
        && deduped.chars().count() < config.short_segment_start_max_len
        && last_sent.sent_within(config.short_segment_start_delay, now)
    {
        return PartialDispatchOutcome::Suppressed;
    }

    if let Some(last_at) = state.last_emitted_at {
        let growth = deduped.chars().count().saturating_sub(state.last_emitted_text.chars().count());
        let elapsed = now.saturating_duration_since(last_at);
        if growth < config.min_growth_chars && elapsed < config.min_growth_interval {
            return PartialDispatchOutcome::Suppressed;
        }
    }

    state.record(&deduped, now);
    PartialDispatchOutcome::Emit(deduped)
}
