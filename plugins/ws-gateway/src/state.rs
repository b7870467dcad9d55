//! Shared state handed to every route handler: the provider set, the
//! session config, and the connection registry.

use relay_events::EventBusRef;
use relay_providers::{GrammarWorker, SessionStore, SttProvider, TranslationWorker};
use relay_session::SessionConfig;
use std::sync::Arc;

use crate::registry::SessionRegistry;

/// Builds a fresh STT provider connection for one new host session. A real
/// deployment would dial the upstream here; in its absence the binary edge
/// supplies a scripted/in-memory provider, per the core's Non-goals.
pub type SttProviderFactory = Arc<dyn Fn(&str) -> Box<dyn SttProvider + Send> + Send + Sync>;

#[derive(Clone)]
pub struct GatewayState {
    pub session_config: SessionConfig,
    pub stt_factory: SttProviderFactory,
    pub grammar: Arc<dyn GrammarWorker>,
    pub translator: Arc<dyn TranslationWorker>,
    pub session_store: Arc<dyn SessionStore>,
    pub events: EventBusRef,
    pub registry: SessionRegistry,
}

impl GatewayState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_config: SessionConfig,
        stt_factory: SttProviderFactory,
        grammar: Arc<dyn GrammarWorker>,
        translator: Arc<dyn TranslationWorker>,
        session_store: Arc<dyn SessionStore>,
        events: EventBusRef,
    ) -> Self {
        Self { session_config, stt_factory, grammar, translator, session_store, events, registry: SessionRegistry::new() }
    }
}
