use relay_config::RelayConfig;
use relay_events::{EventBusRef, InMemoryEventBus};
use relay_plugin_ws_gateway::{build_router, GatewayState, SttProviderFactory};
use relay_providers::{
    InMemorySessionStore, RecordingTranslationWorker, ScriptedGrammarWorker, ScriptedSttProvider, SessionStore, TranslationWorker,
};
use relay_session::SessionConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "relay.toml".to_string());
    let config = RelayConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)))
        .init();

    tracing::info!(bind_addr = %config.gateway.bind_addr, "starting relay-server");

    let session_config = SessionConfig {
        finalize: config.finalize_config(),
        forced: config.forced_config(),
        recovery: config.recovery_config(),
        dispatch: config.dispatch_config(),
        partial_dispatch: config.partial_dispatch_config(),
    };

    // No real upstream STT client is implemented (out of scope per the
    // core's Non-goals); every new host session gets a scripted provider
    // with no pre-seeded results until a real client is wired in here.
    let stt_factory: SttProviderFactory = Arc::new(|_source_lang: &str| {
        Box::new(ScriptedSttProvider::new(Vec::new())) as Box<dyn relay_providers::SttProvider + Send>
    });

    let grammar = Arc::new(ScriptedGrammarWorker::passthrough());
    let translator: Arc<dyn TranslationWorker> = Arc::new(RecordingTranslationWorker::with_translations(HashMap::new()));
    let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let events: EventBusRef = Arc::new(InMemoryEventBus::new());

    let state = GatewayState::new(session_config, stt_factory, grammar, translator, session_store, events);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.gateway.bind_addr).await?;
    tracing::info!(bind_addr = %config.gateway.bind_addr, "gateway listening");
    axum::serve(listener, router).await?;

    Ok(())
}
