//! Wire types for the host/listener WebSocket protocol.
//!
//! The inbound/outbound shapes here are deliberately separate from every
//! internal domain type (`relay-partial`, `relay-finalize`, ...); nothing in
//! this crate owns pipeline state, it only describes what crosses the wire.

mod inbound;
mod outbound;

pub use inbound::{InboundFrame, TranslationTier};
pub use outbound::{ErrorMessage, SessionReadyMessage, TransportError, TranslationMessage, UpdateType, WarningMessage};
