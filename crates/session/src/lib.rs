//! Per-connection session orchestration: one [`SessionEngine`] and one
//! [`pipeline::run_session`] task per host connection, wiring the pure
//! engines (`relay-finalize`, `relay-forced`, `relay-recovery`,
//! `relay-dispatch`) to a provider set and a transport handle.

mod engine;
mod pipeline;

pub use engine::{SegmentFence, SessionConfig, SessionEngine};
pub use pipeline::{spawn_session, OutboundEvent, SessionHandle};
