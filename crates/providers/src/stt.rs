use relay_recovery::SttRecoveryStream;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("stt provider connection failed: {0}")]
    Connection(String),
    #[error("stt provider rejected authentication")]
    Unauthenticated,
    #[error("stt provider returned no audio for the requested window")]
    NoAudioAvailable,
}

/// One decoded hypothesis from the live STT stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SttResult {
    pub text: String,
    pub is_partial: bool,
    /// Set when this final was emitted because the upstream stream
    /// restarted, not because speech naturally ended.
    pub forced: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AudioBufferStatus {
    pub buffered_ms: u64,
    pub dropped_chunks: u64,
}

/// The live STT connection a session streams audio to.
#[async_trait::async_trait]
pub trait SttProvider: Send {
    async fn send_audio(&mut self, chunk: &[u8]) -> Result<(), SttError>;

    /// Next decoded result, or `None` once the provider stream has closed.
    async fn next_result(&mut self) -> Option<SttResult>;

    /// Pull recent buffered audio for a forced-final recapture window.
    /// `end_timestamp_cap` bounds how far past the forced instant the
    /// window may extend, enforcing the post-final capture cap.
    async fn get_recent_audio(&mut self, window_ms: u64, end_timestamp_cap: Option<i64>) -> Result<Vec<u8>, SttError>;

    fn audio_buffer_status(&self) -> AudioBufferStatus;

    /// Open a fresh short-lived stream for the Recovery Stream Engine, with
    /// punctuation disabled, the high-accuracy variant, and auto-restart off.
    async fn open_recovery_stream(&self, source_lang: &str) -> Result<Box<dyn SttRecoveryStream>, SttError>;
}

/// A scripted STT provider driven entirely by a pre-seeded result queue.
/// Used by session/dispatch tests to drive the pipeline end to end without
/// a real provider connection.
pub struct ScriptedSttProvider {
    results: Mutex<VecDeque<SttResult>>,
    sent: Mutex<Vec<Vec<u8>>>,
    recent_audio: Vec<u8>,
}

impl ScriptedSttProvider {
    pub fn new(results: Vec<SttResult>) -> Self {
        Self { results: Mutex::new(results.into()), sent: Mutex::new(Vec::new()), recent_audio: Vec::new() }
    }

    pub fn with_recent_audio(mut self, audio: Vec<u8>) -> Self {
        self.recent_audio = audio;
        self
    }

    pub fn sent_chunks(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SttProvider for ScriptedSttProvider {
    async fn send_audio(&mut self, chunk: &[u8]) -> Result<(), SttError> {
        self.sent.lock().unwrap().push(chunk.to_vec());
        Ok(())
    }

    async fn next_result(&mut self) -> Option<SttResult> {
        self.results.lock().unwrap().pop_front()
    }

    async fn get_recent_audio(&mut self, _window_ms: u64, _end_timestamp_cap: Option<i64>) -> Result<Vec<u8>, SttError> {
        if self.recent_audio.is_empty() {
            return Err(SttError::NoAudioAvailable);
        }
        Ok(self.recent_audio.clone())
    }

    fn audio_buffer_status(&self) -> AudioBufferStatus {
        AudioBufferStatus::default()
    }

    async fn open_recovery_stream(&self, _source_lang: &str) -> Result<Box<dyn SttRecoveryStream>, SttError> {
        Err(SttError::Connection("scripted provider does not open real recovery streams".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_provider_replays_results_in_order() {
        let mut provider = ScriptedSttProvider::new(vec![
            SttResult { text: "hello".to_string(), is_partial: true, forced: false },
            SttResult { text: "hello world".to_string(), is_partial: false, forced: false },
        ]);
        assert_eq!(provider.next_result().await.unwrap().text, "hello");
        assert_eq!(provider.next_result().await.unwrap().text, "hello world");
        assert!(provider.next_result().await.is_none());
    }

    #[tokio::test]
    async fn scripted_provider_records_sent_audio() {
        let mut provider = ScriptedSttProvider::new(vec![]);
        provider.send_audio(&[1, 2, 3]).await.unwrap();
        assert_eq!(provider.sent_chunks(), vec![vec![1, 2, 3]]);
    }
}
