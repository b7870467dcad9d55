//! The Recovery Stream Engine.
//!
//! Opens a short-lived, high-accuracy decode of the audio captured around a
//! forced final, then merges whatever it recovers back into the buffered
//! text. This is the only place captured audio is ever replayed through the
//! STT provider a second time.

use relay_partial::merge_with_overlap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub ready_poll_interval: Duration,
    pub ready_timeout: Duration,
    pub collect_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(25),
            ready_timeout: Duration::from_millis(1500),
            collect_timeout: Duration::from_millis(4000),
        }
    }
}

/// An event emitted by a recovery decode stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    Partial(String),
    Final(String),
    /// The provider has no more results to emit for this stream.
    End,
}

/// A fresh, short-lived STT stream opened purely to re-decode captured
/// audio. Configured by the caller with punctuation disabled, the
/// high-accuracy model variant, and auto-restart off; this trait only
/// exposes the lifecycle the Recovery Stream Engine drives.
#[async_trait::async_trait]
pub trait SttRecoveryStream: Send {
    /// Non-blocking readiness check, polled by [`wait_until_ready`].
    fn is_ready(&self) -> bool;

    /// Write the entire captured audio in one call, bypassing any
    /// chunking/jitter buffer the live path would normally apply.
    async fn write_all(&mut self, audio: &[u8]) -> std::io::Result<()>;

    /// Close the write side so the provider finalizes what it has.
    async fn close_write(&mut self);

    /// Receive the next result event, or `None` once the stream itself has
    /// closed with nothing further to say.
    async fn recv_event(&mut self) -> Option<RecoveryEvent>;
}

#[async_trait::async_trait]
impl SttRecoveryStream for Box<dyn SttRecoveryStream> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    async fn write_all(&mut self, audio: &[u8]) -> std::io::Result<()> {
        (**self).write_all(audio).await
    }

    async fn close_write(&mut self) {
        (**self).close_write().await
    }

    async fn recv_event(&mut self) -> Option<RecoveryEvent> {
        (**self).recv_event().await
    }
}

/// Poll `stream.is_ready()` at `ready_poll_interval` cadence until it
/// reports ready or `ready_timeout` elapses.
pub async fn wait_until_ready<S: SttRecoveryStream>(stream: &S, config: &RecoveryConfig) -> bool {
    let deadline = tokio::time::Instant::now() + config.ready_timeout;
    loop {
        if stream.is_ready() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(config.ready_poll_interval).await;
    }
}

/// Collect partials and the final from `stream`. Once an `End` event
/// arrives, allows at most `collect_timeout` more for a trailing final
/// before giving up and falling back to the last partial seen.
async fn collect_recovered_text<S: SttRecoveryStream>(stream: &mut S, config: &RecoveryConfig) -> String {
    let mut last_partial = String::new();
    let mut final_text: Option<String> = None;

    loop {
        match stream.recv_event().await {
            Some(RecoveryEvent::Partial(text)) => last_partial = text,
            Some(RecoveryEvent::Final(text)) => {
                final_text = Some(text);
                break;
            }
            Some(RecoveryEvent::End) => break,
            None => return final_text.unwrap_or(last_partial),
        }
    }

    if final_text.is_none() {
        let wait_for_trailing_final = async {
            loop {
                match stream.recv_event().await {
                    Some(RecoveryEvent::Final(text)) => {
                        final_text = Some(text);
                        break;
                    }
                    Some(RecoveryEvent::Partial(text)) => last_partial = text,
                    Some(RecoveryEvent::End) | None => break,
                }
            }
        };
        let _ = tokio::time::timeout(config.collect_timeout, wait_for_trailing_final).await;
    }

    final_text.unwrap_or(last_partial)
}

/// Merge recovered text back into the buffered forced text. Favors a
/// suffix-of-buffered / prefix-of-recovered overlap; absent overlap it
/// appends the recovered text in full. `next_final_hint`/`next_partial_hint`
/// are the next results that arrived on the live stream after recovery
/// started, used only to corroborate an otherwise ambiguous boundary.
fn merge_recovered(buffered: &str, recovered: &str, next_final_hint: Option<&str>, next_partial_hint: Option<&str>) -> String {
    if recovered.trim().is_empty() {
        return buffered.to_string();
    }
    if let Some(merged) = merge_with_overlap(buffered, recovered) {
        return merged;
    }
    // No direct overlap; a hint that itself overlaps the recovered tail
    // corroborates that the recovered text is a genuine new segment rather
    // than noise, but doesn't change how it gets appended.
    for hint in [next_final_hint, next_partial_hint].into_iter().flatten() {
        if merge_with_overlap(recovered, hint).is_some() {
            tracing::debug!("recovered text corroborated by a subsequent live result");
            break;
        }
    }
    format!("{} {}", buffered.trim(), recovered.trim())
}

/// Everything the Recovery Stream Engine needs to attempt a recovery.
#[derive(Debug, Clone)]
pub struct RecoveryInput {
    pub audio: Vec<u8>,
    pub source_lang: String,
    pub buffered_text: String,
    pub next_partial_hint: Option<String>,
    pub next_final_hint: Option<String>,
}

/// The result of a recovery attempt: the merged text ready to commit, and
/// the predecessor text a later dedup pass should compare against.
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub merged_text: String,
    pub predecessor_text: String,
}

/// Run one full recovery attempt against an already-opened stream.
pub async fn run_recovery<S: SttRecoveryStream>(stream: &mut S, input: RecoveryInput, config: &RecoveryConfig) -> RecoveryOutcome {
    let predecessor_text = input.buffered_text.clone();

    if !wait_until_ready(stream, config).await {
        tracing::warn!(source_lang = %input.source_lang, "recovery stream never became ready, falling back to buffered text");
        return RecoveryOutcome { merged_text: predecessor_text.clone(), predecessor_text };
    }

    if let Err(err) = stream.write_all(&input.audio).await {
        tracing::warn!(error = %err, "recovery stream write failed, falling back to buffered text");
        return RecoveryOutcome { merged_text: predecessor_text.clone(), predecessor_text };
    }
    stream.close_write().await;

    let recovered = collect_recovered_text(stream, config).await;
    let merged = merge_recovered(
        &input.buffered_text,
        &recovered,
        input.next_final_hint.as_deref(),
        input.next_partial_hint.as_deref(),
    );

    RecoveryOutcome { merged_text: merged, predecessor_text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedStream {
        ready: AtomicBool,
        events: VecDeque<RecoveryEvent>,
        written: Vec<u8>,
        closed: bool,
    }

    impl ScriptedStream {
        fn new(events: Vec<RecoveryEvent>) -> Self {
            Self { ready: AtomicBool::new(true), events: events.into(), written: Vec::new(), closed: false }
        }
    }

    #[async_trait::async_trait]
    impl SttRecoveryStream for ScriptedStream {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn write_all(&mut self, audio: &[u8]) -> std::io::Result<()> {
            self.written.extend_from_slice(audio);
            Ok(())
        }

        async fn close_write(&mut self) {
            self.closed = true;
        }

        async fn recv_event(&mut self) -> Option<RecoveryEvent> {
            self.events.pop_front()
        }
    }

    #[tokio::test]
    async fn ready_stream_returns_immediately() {
        let stream = ScriptedStream::new(vec![]);
        assert!(wait_until_ready(&stream, &RecoveryConfig::default()).await);
    }

    #[tokio::test]
    async fn never_ready_stream_times_out() {
        let mut config = RecoveryConfig::default();
        config.ready_timeout = Duration::from_millis(50);
        config.ready_poll_interval = Duration::from_millis(10);
        let stream = ScriptedStream { ready: AtomicBool::new(false), events: VecDeque::new(), written: Vec::new(), closed: false };
        assert!(!wait_until_ready(&stream, &config).await);
    }

    #[tokio::test]
    async fn recovery_merges_overlapping_recovered_text() {
        let mut stream = ScriptedStream::new(vec![
            RecoveryEvent::Partial("the missing".to_string()),
            RecoveryEvent::Final("the missing words".to_string()),
            RecoveryEvent::End,
        ]);
        let input = RecoveryInput {
            audio: vec![1, 2, 3],
            source_lang: "en".to_string(),
            buffered_text: "we lost the".to_string(),
            next_partial_hint: None,
            next_final_hint: None,
        };
        let outcome = run_recovery(&mut stream, input, &RecoveryConfig::default()).await;
        assert_eq!(outcome.merged_text, "we lost the missing words");
        assert!(stream.closed);
        assert_eq!(stream.written, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn recovery_appends_when_no_overlap_exists() {
        let mut stream = ScriptedStream::new(vec![RecoveryEvent::Final("completely separate".to_string()), RecoveryEvent::End]);
        let input = RecoveryInput {
            audio: vec![],
            source_lang: "en".to_string(),
            buffered_text: "we lost the".to_string(),
            next_partial_hint: None,
            next_final_hint: None,
        };
        let outcome = run_recovery(&mut stream, input, &RecoveryConfig::default()).await;
        assert_eq!(outcome.merged_text, "we lost the completely separate");
    }

    #[tokio::test]
    async fn falls_back_to_last_partial_when_no_final_arrives() {
        let mut stream = ScriptedStream::new(vec![RecoveryEvent::Partial("the missing words".to_string()), RecoveryEvent::End]);
        let input = RecoveryInput {
            audio: vec![],
            source_lang: "en".to_string(),
            buffered_text: "we lost".to_string(),
            next_partial_hint: None,
            next_final_hint: None,
        };
        let outcome = run_recovery(&mut stream, input, &RecoveryConfig::default()).await;
        assert_eq!(outcome.merged_text, "we lost the missing words");
    }

    #[tokio::test]
    async fn unready_stream_falls_back_without_writing() {
        let mut config = RecoveryConfig::default();
        config.ready_timeout = Duration::from_millis(20);
        config.ready_poll_interval = Duration::from_millis(5);
        let mut stream = ScriptedStream { ready: AtomicBool::new(false), events: VecDeque::new(), written: Vec::new(), closed: false };
        let input = RecoveryInput {
            audio: vec![9, 9, 9],
            source_lang: "en".to_string(),
            buffered_text: "we lost the words".to_string(),
            next_partial_hint: None,
            next_final_hint: None,
        };
        let outcome = run_recovery(&mut stream, input, &config).await;
        assert_eq!(outcome.merged_text, "we lost the words");
        assert!(stream.written.is_empty());
    }
}
