//! The session/listener registry: who is connected to which session, and
//! where to send a fanned-out [`OutboundEvent`]. Connection bookkeeping
//! only; the per-session language records a listener's registration also
//! touches live in `relay_providers::SessionStore`.

use relay_session::OutboundEvent;
use relay_transport::InboundFrame;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A single registered listener's outbound channel, tagged with the target
/// language it asked for so the host task's fan-out loop can filter.
#[derive(Clone)]
pub struct ListenerSender {
    pub target_lang: String,
    pub tx: mpsc::UnboundedSender<OutboundEvent>,
}

pub type ListenerMap = Arc<Mutex<HashMap<Uuid, ListenerSender>>>;

/// Everything a listener connection needs to reach an already-running
/// session: how to push frames in, how to register a new target language,
/// and where to add itself as a fan-out target.
#[derive(Clone)]
pub struct SessionEntry {
    pub inbound_tx: mpsc::Sender<InboundFrame>,
    pub target_lang_tx: mpsc::Sender<String>,
    pub cancel: CancellationToken,
    pub listeners: ListenerMap,
}

/// Live host connections, keyed by session id. A session exists in this
/// registry exactly as long as its host connection's task is running.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: String, entry: SessionEntry) {
        self.sessions.lock().unwrap().insert(session_id, entry);
    }

    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_session_is_retrievable_and_removable() {
        let registry = SessionRegistry::new();
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let (target_lang_tx, _target_lang_rx) = mpsc::channel(1);
        registry.insert(
            "s1".to_string(),
            SessionEntry { inbound_tx, target_lang_tx, cancel: CancellationToken::new(), listeners: Arc::new(Mutex::new(HashMap::new())) },
        );
        assert!(registry.get("s1").is_some());
        registry.remove("s1");
        assert!(registry.get("s1").is_none());
    }

    #[test]
    fn unknown_session_looks_up_as_none() {
        let registry = SessionRegistry::new();
        assert!(registry.get("missing").is_none());
    }
}
