use relay_transport::TranslationTier;
use std::collections::HashMap;
use std::sync::RwLock;

/// The per-session language registry: source language, tier, and which
/// target languages have registered listeners. Connection/broadcast
/// plumbing is a gateway concern, not this store's.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub source_lang: String,
    pub tier: TranslationTier,
    pub target_langs: Vec<String>,
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, id: &str) -> Option<SessionRecord>;
    async fn create_session(&self, id: &str, source_lang: &str, tier: TranslationTier);
    async fn update_source_language(&self, id: &str, lang: &str);
    async fn get_session_languages(&self, id: &str) -> Vec<String>;
    /// Register a listener's target language for the session.
    async fn register_listener_language(&self, id: &str, lang: &str);
}

/// An in-process session registry, guarded by a single `RwLock` over a map,
/// the same shape used elsewhere in this codebase for per-field session state.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.read().unwrap().get(id).cloned()
    }

    async fn create_session(&self, id: &str, source_lang: &str, tier: TranslationTier) {
        self.sessions.write().unwrap().insert(
            id.to_string(),
            SessionRecord { id: id.to_string(), source_lang: source_lang.to_string(), tier, target_langs: Vec::new() },
        );
    }

    async fn update_source_language(&self, id: &str, lang: &str) {
        if let Some(session) = self.sessions.write().unwrap().get_mut(id) {
            session.source_lang = lang.to_string();
        }
    }

    async fn get_session_languages(&self, id: &str) -> Vec<String> {
        self.sessions.read().unwrap().get(id).map(|s| s.target_langs.clone()).unwrap_or_default()
    }

    async fn register_listener_language(&self, id: &str, lang: &str) {
        if let Some(session) = self.sessions.write().unwrap().get_mut(id) {
            if !session.target_langs.iter().any(|l| l == lang) {
                session.target_langs.push(lang.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_session_is_retrievable() {
        let store = InMemorySessionStore::new();
        store.create_session("s1", "en", TranslationTier::Standard).await;
        let session = store.get_session("s1").await.unwrap();
        assert_eq!(session.source_lang, "en");
    }

    #[tokio::test]
    async fn registering_a_language_twice_does_not_duplicate() {
        let store = InMemorySessionStore::new();
        store.create_session("s1", "en", TranslationTier::Standard).await;
        store.register_listener_language("s1", "es").await;
        store.register_listener_language("s1", "es").await;
        assert_eq!(store.get_session_languages("s1").await, vec!["es".to_string()]);
    }

    #[tokio::test]
    async fn updating_source_language_persists() {
        let store = InMemorySessionStore::new();
        store.create_session("s1", "en", TranslationTier::Standard).await;
        store.update_source_language("s1", "fr").await;
        assert_eq!(store.get_session("s1").await.unwrap().source_lang, "fr");
    }
}
