use relay_transport::TranslationTier;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("translation request skipped: {0}")]
    SkipRequest(String),
    #[error("translation request timed out")]
    Timeout,
    #[error("translation request rate-limited")]
    RateLimited,
}

/// Translates one piece of text into every requested target language in a
/// single call, at a given tier.
#[async_trait::async_trait]
pub trait TranslationWorker: Send + Sync {
    async fn translate_to_multiple_languages(
        &self,
        text: &str,
        source_lang: &str,
        target_langs: &[String],
        session_id: &str,
        tier: TranslationTier,
    ) -> Result<HashMap<String, String>, TranslationError>;
}

/// A translation worker that records every call it receives and returns a
/// scripted per-language mapping (or a scripted failure).
pub struct RecordingTranslationWorker {
    translations: HashMap<String, String>,
    fail_with: Option<TranslationErrorKind>,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub text: String,
    pub source_lang: String,
    pub target_langs: Vec<String>,
    pub tier: TranslationTier,
}

#[derive(Debug, Clone, Copy)]
pub enum TranslationErrorKind {
    Timeout,
    RateLimited,
}

impl RecordingTranslationWorker {
    pub fn with_translations(translations: HashMap<String, String>) -> Self {
        Self { translations, fail_with: None, calls: Mutex::new(Vec::new()) }
    }

    pub fn failing(kind: TranslationErrorKind) -> Self {
        Self { translations: HashMap::new(), fail_with: Some(kind), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TranslationWorker for RecordingTranslationWorker {
    async fn translate_to_multiple_languages(
        &self,
        text: &str,
        source_lang: &str,
        target_langs: &[String],
        _session_id: &str,
        tier: TranslationTier,
    ) -> Result<HashMap<String, String>, TranslationError> {
        self.calls.lock().unwrap().push(RecordedCall {
            text: text.to_string(),
            source_lang: source_lang.to_string(),
            target_langs: target_langs.to_vec(),
            tier,
        });
        match self.fail_with {
            Some(TranslationErrorKind::Timeout) => Err(TranslationError::Timeout),
            Some(TranslationErrorKind::RateLimited) => Err(TranslationError::RateLimited),
            None => Ok(target_langs
                .iter()
                .filter_map(|lang| self.translations.get(lang).map(|t| (lang.clone(), t.clone())))
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_worker_returns_scripted_translations() {
        let mut translations = HashMap::new();
        translations.insert("es".to_string(), "hola".to_string());
        let worker = RecordingTranslationWorker::with_translations(translations);
        let result = worker
            .translate_to_multiple_languages("hello", "en", &["es".to_string()], "session-1", TranslationTier::Standard)
            .await
            .unwrap();
        assert_eq!(result.get("es"), Some(&"hola".to_string()));
        assert_eq!(worker.calls().len(), 1);
    }

    #[tokio::test]
    async fn recording_worker_can_simulate_a_timeout() {
        let worker = RecordingTranslationWorker::failing(TranslationErrorKind::Timeout);
        let result = worker
            .translate_to_multiple_languages("hello", "en", &["es".to_string()], "session-1", TranslationTier::Standard)
            .await;
        assert!(matches!(result, Err(TranslationError::Timeout)));
    }
}
