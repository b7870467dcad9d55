//! The synchronous decision core for one session: everything the engines
//! need to hold between events, with no I/O of its own. The async loop in
//! `pipeline` owns timers and provider calls; this struct owns state.

use relay_dispatch::{GrammarCache, PartialDispatchConfig, PartialDispatchState};
use relay_finalize::{FinalizationEngine, FinalizeConfig};
use relay_forced::{ForcedCommitEngine, ForcedConfig};
use relay_partial::{LastSentFinal, PartialTracker};
use relay_recovery::RecoveryConfig;
use relay_timeline::TimelineTracker;
use relay_transport::TranslationTier;

/// Aggregates every engine's tunables so a session only takes one config
/// argument to build.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub finalize: FinalizeConfig,
    pub forced: ForcedConfig,
    pub recovery: RecoveryConfig,
    pub dispatch: relay_dispatch::DispatchConfig,
    pub partial_dispatch: PartialDispatchConfig,
}

/// A strongly increasing fence stamped on every partial and final. Bumped
/// at every commit; a callback carrying a `segment_id` older than
/// [`SegmentFence::current`] belongs to an already-closed segment and must
/// be dropped rather than acted on, fencing out late callbacks the way a
/// generation counter fences out a stale epoch (`seq_id` alone only orders
/// the wire, it doesn't guard internal state).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentFence(u64);

impl SegmentFence {
    pub fn current(&self) -> u64 {
        self.0
    }

    /// Start a new segment, returning its id.
    pub fn advance(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    /// Whether a callback stamped with `segment_id` belongs to a segment
    /// that has since closed.
    pub fn is_stale(&self, segment_id: u64) -> bool {
        segment_id != 0 && segment_id < self.0
    }
}

/// All per-session state the engines need, independent of the transport or
/// the provider connections.
pub struct SessionEngine {
    pub session_id: String,
    pub source_lang: String,
    pub target_langs: Vec<String>,
    /// The tier requested on the host's `init` frame.
    pub tier: TranslationTier,
    pub partial_tracker: PartialTracker,
    pub finalize: FinalizationEngine,
    pub forced: ForcedCommitEngine,
    pub last_sent: LastSentFinal,
    pub grammar_cache: GrammarCache,
    pub timeline: TimelineTracker,
    pub partial_dispatch_state: PartialDispatchState,
    pub segment: SegmentFence,
}

impl SessionEngine {
    pub fn new(session_id: impl Into<String>, source_lang: impl Into<String>, tier: TranslationTier, config: &SessionConfig) -> Self {
        Self {
            session_id: session_id.into(),
            source_lang: source_lang.into(),
            tier,
            target_langs: Vec::new(),
            partial_tracker: PartialTracker::new(),
            finalize: FinalizationEngine::new(config.finalize.clone()),
            forced: ForcedCommitEngine::new(config.forced.clone()),
            last_sent: LastSentFinal::new(),
            grammar_cache: GrammarCache::default(),
            timeline: TimelineTracker::new(),
            partial_dispatch_state: PartialDispatchState::new(),
            segment: SegmentFence::default(),
        }
    }

    /// Reset everything scoped to one segment once it commits, and advance
    /// the fence so stale callbacks for the closed segment are ignored.
    pub fn close_segment(&mut self) -> u64 {
        self.partial_tracker.reset();
        self.finalize.clear();
        self.segment.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_fence_starts_at_zero_and_advances() {
        let mut fence = SegmentFence::default();
        assert_eq!(fence.current(), 0);
        assert_eq!(fence.advance(), 1);
        assert_eq!(fence.advance(), 2);
    }

    #[test]
    fn stale_check_rejects_ids_older_than_current() {
        let mut fence = SegmentFence::default();
        fence.advance();
        fence.advance();
        assert!(fence.is_stale(1));
        assert!(!fence.is_stale(2));
        assert!(!fence.is_stale(3));
    }

    #[test]
    fn closing_a_segment_resets_tracker_and_advances_fence() {
        let config = SessionConfig::default();
        let mut engine = SessionEngine::new("s1", "en", TranslationTier::Standard, &config);
        engine.partial_tracker.update("hello there", std::time::Instant::now());
        let id = engine.close_segment();
        assert_eq!(id, 1);
        assert!(engine.partial_tracker.latest().text.is_empty());
    }
}
