//! Shared event contracts for session diagnostics.
//!
//! These are internal signals, not wire frames: a session raises them on the
//! `EventBus` so that warnings, invariant violations, and recovery outcomes
//! are observable without threading a transport handle through every engine.

mod bus;

pub use bus::{EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, NullEventBus};

use serde::{Deserialize, Serialize};

/// Raised when an engine falls back to degraded behavior instead of failing
/// outright: a timed-out grammar call, a translation worker error, a
/// recovery stream that never reached "ready".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningEvent {
    pub session_id: String,
    pub code: String,
    pub detail: String,
}

/// Raised when an engine observes state it should not be able to reach: an
/// out-of-order `seq_id`, a segment fenced out by a stale `segment_id`, a
/// finalization deadline that fired after teardown. Surfaced for
/// diagnostics; never raised to abort the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolationEvent {
    pub session_id: String,
    pub invariant: String,
    pub detail: String,
}

/// Raised once a forced-final recovery attempt resolves, whether or not it
/// found anything to merge in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcomeEvent {
    pub session_id: String,
    pub segment_id: u64,
    pub recovered_chars: usize,
    pub timed_out: bool,
}

/// Event names as constants to prevent typos.
pub mod event_names {
    pub const WARNING: &str = "session:warning";
    pub const INVARIANT_VIOLATION: &str = "session:invariant_violation";
    pub const RECOVERY_OUTCOME: &str = "session:recovery_outcome";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_event_round_trips_through_json() {
        let event = WarningEvent {
            session_id: "s1".to_string(),
            code: "grammar_timeout".to_string(),
            detail: "correct_final exceeded 2000ms".to_string(),
        };
        let raw = serde_json::to_string(&event).unwrap();
        let back: WarningEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.code, "grammar_timeout");
    }

    #[test]
    fn recovery_outcome_deserializes_minimal_payload() {
        let json = r#"{"session_id":"s1","segment_id":4,"recovered_chars":0,"timed_out":true}"#;
        let event: RecoveryOutcomeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.segment_id, 4);
        assert!(event.timed_out);
    }
}
