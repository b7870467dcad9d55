//! Sequence stamping for a single session's outbound messages.
//!
//! `TimelineTracker` is the only source of `SeqId`s in a session. It has no
//! knowledge of partials, finals, or translation; it exists purely so that
//! every other component stamps outgoing messages through one strictly
//! increasing counter, per-session.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A strictly increasing, per-session message sequence number.
///
/// Listeners render in `SeqId` order and treat gaps as transport loss, not
/// reordering (`SeqId` is never reused and never assigned out of order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqId(u64);

impl SeqId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SeqId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-side wall clock timestamp, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerTimestamp(i64);

impl ServerTimestamp {
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(ms)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

/// A payload stamped with its `seq_id`, server timestamp, and partial flag.
#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub seq_id: SeqId,
    pub server_timestamp: ServerTimestamp,
    pub is_partial: bool,
    pub payload: T,
}

/// Issues strictly increasing `SeqId`s for one session.
///
/// Not `Clone`: a session owns exactly one tracker, mutated only by the
/// single logical task that owns the session.
#[derive(Debug)]
pub struct TimelineTracker {
    next_seq_id: u64,
}

impl Default for TimelineTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineTracker {
    pub fn new() -> Self {
        // Starts at 1, not 0: `source_seq_id` on a non-anchor message must be
        // non-zero, so an anchor's own seq_id can never be mistaken for "absent".
        Self { next_seq_id: 1 }
    }

    /// Allocate the next `SeqId` without attaching a payload.
    pub fn next_seq_id(&mut self) -> SeqId {
        let id = SeqId(self.next_seq_id);
        self.next_seq_id += 1;
        id
    }

    /// Stamp a payload with a fresh `seq_id`, the current server timestamp,
    /// and the given `is_partial` flag.
    pub fn stamp<T>(&mut self, payload: T, is_partial: bool) -> Stamped<T> {
        Stamped {
            seq_id: self.next_seq_id(),
            server_timestamp: ServerTimestamp::now(),
            is_partial,
            payload,
        }
    }

    /// The most recently issued `seq_id`, if any have been issued yet.
    pub fn last_issued(&self) -> Option<SeqId> {
        self.next_seq_id.checked_sub(1).map(SeqId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_ids_are_strictly_increasing() {
        let mut tracker = TimelineTracker::new();
        let a = tracker.next_seq_id();
        let b = tracker.next_seq_id();
        let c = tracker.next_seq_id();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn stamp_attaches_growing_seq_ids() {
        let mut tracker = TimelineTracker::new();
        let first = tracker.stamp("anchor", true);
        let second = tracker.stamp("update", false);
        assert!(first.seq_id < second.seq_id);
        assert!(first.is_partial);
        assert!(!second.is_partial);
    }

    #[test]
    fn last_issued_tracks_most_recent() {
        let mut tracker = TimelineTracker::new();
        assert!(tracker.last_issued().is_none());
        let id = tracker.next_seq_id();
        assert_eq!(tracker.last_issued(), Some(id));
    }
}
