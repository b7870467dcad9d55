use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::host::handle_host_ws;
use crate::listener::handle_listener_ws;
use crate::state::GatewayState;

/// Builds the gateway's Axum router: one route for the host connection,
/// one for listener connections, wired to a shared [`GatewayState`].
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws/host", get(handle_host_ws))
        .route("/ws/listen", get(handle_listener_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
