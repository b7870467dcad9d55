//! Turns `relay-session` into a network service: an Axum router with a
//! host route and a listener route, a connection registry, and the
//! inbound/outbound frame codec. The `relay-server` binary is the only
//! thing that knows this crate exists.

mod host;
mod listener;
mod registry;
mod router;
mod state;

pub use registry::SessionRegistry;
pub use router::build_router;
pub use state::{GatewayState, SttProviderFactory};
