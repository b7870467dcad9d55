//! The commit path: everything that happens to a final once §4.3 or §4.5
//! hands it to the dispatcher. Owns the duplicate guard, cross-segment
//! dedup, grammar correction, anchor emission, and translation fan-out.

use crate::duplicate_guard::{is_duplicate, DuplicateGuardConfig};
use crate::grammar_cache::GrammarCache;
use relay_partial::{trim_leading_related_words, LastSentFinal};
use relay_providers::{GrammarWorker, TranslationWorker};
use relay_timeline::TimelineTracker;
use relay_transport::{TranslationMessage, TranslationTier};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub duplicate_guard: DuplicateGuardConfig,
    pub grammar_timeout: Duration,
    pub cross_segment_dedup_max_check: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            duplicate_guard: DuplicateGuardConfig::default(),
            grammar_timeout: Duration::from_millis(2000),
            cross_segment_dedup_max_check: 10,
        }
    }
}

/// A final ready to be committed, as handed off by the Finalization or
/// Forced Commit Engine.
#[derive(Debug, Clone)]
pub struct CommitInput {
    pub text: String,
    pub is_forced: bool,
    pub source_lang: String,
    pub target_langs: Vec<String>,
    pub session_id: String,
    /// The tier requested on the host's `init` frame, threaded through to
    /// the translation call unchanged.
    pub tier: TranslationTier,
    /// The prior segment's text to cross-segment-dedup against. Ordinarily
    /// `last_sent.original_text`; for a recovery commit this is the
    /// predecessor captured when the Forced Final Buffer opened, so dedup
    /// compares against the correct prior segment even if another final
    /// committed while recovery was in flight.
    pub predecessor_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitRejection {
    Duplicate,
    EmptyAfterCrossSegmentDedup,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub anchor: TranslationMessage,
    pub translations: Vec<TranslationMessage>,
}

fn server_timestamp_now() -> i64 {
    relay_timeline::ServerTimestamp::now().get()
}

/// A cache entry is only trustworthy when the correction is a plausible
/// edit of the original, not a runaway rewrite: corrected length must be
/// at most 3x the original's.
fn within_cacheable_length_ratio(original: &str, corrected: &str) -> bool {
    let original_len = original.chars().count();
    let corrected_len = corrected.chars().count();
    if original_len == 0 {
        return corrected_len == 0;
    }
    corrected_len <= original_len.saturating_mul(3)
}

/// Run the full commit path for one final. Returns `Err` when the guard or
/// the cross-segment dedup rejects the text outright (nothing is emitted,
/// `last_sent` is left untouched).
pub async fn commit_final(
    input: CommitInput,
    last_sent: &mut LastSentFinal,
    grammar_cache: &mut GrammarCache,
    timeline: &mut TimelineTracker,
    grammar: &dyn GrammarWorker,
    translator: &dyn TranslationWorker,
    config: &DispatchConfig,
    now: Instant,
) -> Result<CommitOutcome, CommitRejection> {
    // 1. Duplicate guard.
    if is_duplicate(&input.text, input.is_forced, last_sent, &config.duplicate_guard, now) {
        return Err(CommitRejection::Duplicate);
    }

    // 2. Cross-segment word deduplication.
    let words: Vec<String> = input.text.split_whitespace().map(str::to_string).collect();
    let overlap = trim_leading_related_words(&input.predecessor_text, &words, config.cross_segment_dedup_max_check);
    let deduped_text = words[overlap..].join(" ");
    if deduped_text.trim().is_empty() {
        return Err(CommitRejection::EmptyAfterCrossSegmentDedup);
    }

    // 3. Grammar correction: cache first, then a fresh worker call for English.
    let cache_applied = grammar_cache.apply(&deduped_text);
    let (corrected_text, has_correction) = if input.source_lang == "en" {
        match tokio::time::timeout(config.grammar_timeout, grammar.correct_final(&cache_applied)).await {
            Ok(Ok(corrected)) => {
                let changed = corrected != cache_applied;
                if changed && within_cacheable_length_ratio(&cache_applied, &corrected) {
                    grammar_cache.insert(deduped_text.clone(), corrected.clone());
                }
                (corrected, changed || cache_applied != deduped_text)
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "grammar correction failed, falling through to uncorrected text");
                (cache_applied.clone(), cache_applied != deduped_text)
            }
            Err(_) => {
                tracing::warn!("grammar correction timed out, falling through to uncorrected text");
                (cache_applied.clone(), cache_applied != deduped_text)
            }
        }
    } else {
        (cache_applied.clone(), cache_applied != deduped_text)
    };

    let now_ms = server_timestamp_now();

    // 4. Emit anchor.
    let anchor_seq_id = timeline.next_seq_id();
    let anchor = TranslationMessage::anchor(
        anchor_seq_id.get(),
        now_ms,
        false,
        input.source_lang.clone(),
        deduped_text.clone(),
        corrected_text.clone(),
        has_correction,
        None,
        input.is_forced,
    );

    // 5 & 6. Translation fan-out and per-language broadcast.
    let target_langs: Vec<String> = input.target_langs.iter().filter(|lang| **lang != input.source_lang).cloned().collect();
    let mut translations = Vec::with_capacity(target_langs.len());

    if !target_langs.is_empty() {
        let translated = translator
            .translate_to_multiple_languages(
                &corrected_text,
                &input.source_lang,
                &target_langs,
                &input.session_id,
                input.tier,
            )
            .await;

        for target_lang in &target_langs {
            let seq_id = timeline.next_seq_id();
            let message = match &translated {
                Ok(map) => match map.get(target_lang) {
                    Some(text) => TranslationMessage::translation(
                        seq_id.get(),
                        anchor_seq_id.get(),
                        now_ms,
                        false,
                        input.source_lang.clone(),
                        target_lang.clone(),
                        deduped_text.clone(),
                        Some(corrected_text.clone()),
                        Some(text.clone()),
                        true,
                        has_correction,
                        input.is_forced,
                        None,
                    ),
                    None => TranslationMessage::translation(
                        seq_id.get(),
                        anchor_seq_id.get(),
                        now_ms,
                        false,
                        input.source_lang.clone(),
                        target_lang.clone(),
                        deduped_text.clone(),
                        Some(corrected_text.clone()),
                        None,
                        false,
                        has_correction,
                        input.is_forced,
                        Some(true),
                    ),
                },
                Err(err) => {
                    tracing::warn!(error = %err, target_lang = %target_lang, "translation failed, emitting explicit failure");
                    TranslationMessage::translation(
                        seq_id.get(),
                        anchor_seq_id.get(),
                        now_ms,
                        false,
                        input.source_lang.clone(),
                        target_lang.clone(),
                        deduped_text.clone(),
                        Some(corrected_text.clone()),
                        None,
                        false,
                        has_correction,
                        input.is_forced,
                        Some(true),
                    )
                }
            };
            if message.validate().is_ok() {
                translations.push(message);
            } else {
                tracing::error!(target_lang = %target_lang, "dropping malformed translation message at emit time");
            }
        }
    }

    // 7. Update last-sent state.
    last_sent.record(&input.text, &corrected_text, anchor_seq_id.get(), now);

    Ok(CommitOutcome { anchor, translations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_providers::{RecordingTranslationWorker, ScriptedGrammarWorker};
    use std::collections::HashMap;

    fn translator_with(map: HashMap<String, String>) -> RecordingTranslationWorker {
        RecordingTranslationWorker::with_translations(map)
    }

    #[tokio::test]
    async fn commits_anchor_and_fans_out_translations() {
        let mut last_sent = LastSentFinal::new();
        let mut cache = GrammarCache::default();
        let mut timeline = TimelineTracker::new();
        let grammar = ScriptedGrammarWorker::passthrough();
        let mut translations = HashMap::new();
        translations.insert("es".to_string(), "hola mundo".to_string());
        let translator = translator_with(translations);

        let input = CommitInput {
            text: "hello world".to_string(),
            is_forced: false,
            source_lang: "en".to_string(),
            target_langs: vec!["en".to_string(), "es".to_string()],
            session_id: "s1".to_string(),
            tier: TranslationTier::Standard,
            predecessor_text: String::new(),
        };

        let outcome = commit_final(
            input,
            &mut last_sent,
            &mut cache,
            &mut timeline,
            &grammar,
            &translator,
            &DispatchConfig::default(),
            Instant::now(),
        )
        .await
        .expect("commit should succeed");

        assert_eq!(outcome.anchor.source_lang, "en");
        assert_eq!(outcome.anchor.target_lang, "en");
        assert!(outcome.anchor.validate().is_ok());
        assert_eq!(outcome.translations.len(), 1);
        assert_eq!(outcome.translations[0].translated_text, Some("hola mundo".to_string()));
        assert!(outcome.translations[0].validate().is_ok());
        assert_eq!(last_sent.final_text, "hello world");
    }

    #[tokio::test]
    async fn translation_failure_falls_through_to_explicit_error_flag() {
        let mut last_sent = LastSentFinal::new();
        let mut cache = GrammarCache::default();
        let mut timeline = TimelineTracker::new();
        let grammar = ScriptedGrammarWorker::passthrough();
        let translator = RecordingTranslationWorker::failing(relay_providers::TranslationErrorKind::Timeout);

        let input = CommitInput {
            text: "hello world".to_string(),
            is_forced: false,
            source_lang: "en".to_string(),
            target_langs: vec!["es".to_string()],
            session_id: "s1".to_string(),
            tier: TranslationTier::Standard,
            predecessor_text: String::new(),
        };

        let outcome = commit_final(
            input,
            &mut last_sent,
            &mut cache,
            &mut timeline,
            &grammar,
            &translator,
            &DispatchConfig::default(),
            Instant::now(),
        )
        .await
        .unwrap();

        let translation = &outcome.translations[0];
        assert!(!translation.has_translation);
        assert_eq!(translation.translation_error, Some(true));
        assert_eq!(translation.translated_text, None);
    }

    #[tokio::test]
    async fn cross_segment_dedup_trims_repeated_leading_words() {
        let mut last_sent = LastSentFinal::new();
        let mut cache = GrammarCache::default();
        let mut timeline = TimelineTracker::new();
        let grammar = ScriptedGrammarWorker::passthrough();
        let translator = translator_with(HashMap::new());

        let input = CommitInput {
            text: "Desires cordoned off from others.".to_string(),
            is_forced: false,
            source_lang: "en".to_string(),
            target_langs: vec!["en".to_string()],
            session_id: "s1".to_string(),
            tier: TranslationTier::Standard,
            predecessor_text: "self-centered desires".to_string(),
        };

        let outcome = commit_final(
            input,
            &mut last_sent,
            &mut cache,
            &mut timeline,
            &grammar,
            &translator,
            &DispatchConfig::default(),
            Instant::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.anchor.original_text, "cordoned off from others.");
    }

    #[tokio::test]
    async fn duplicate_final_is_rejected_without_mutating_state() {
        let mut last_sent = LastSentFinal::new();
        let now = Instant::now();
        last_sent.record("We should meet tomorrow.", "We should meet tomorrow.", 1, now);
        let mut cache = GrammarCache::default();
        let mut timeline = TimelineTracker::new();
        let grammar = ScriptedGrammarWorker::passthrough();
        let translator = translator_with(HashMap::new());

        let input = CommitInput {
            text: "We should meet tomorrow.".to_string(),
            is_forced: false,
            source_lang: "en".to_string(),
            target_langs: vec![],
            session_id: "s1".to_string(),
            tier: TranslationTier::Standard,
            predecessor_text: String::new(),
        };

        let result = commit_final(
            input,
            &mut last_sent,
            &mut cache,
            &mut timeline,
            &grammar,
            &translator,
            &DispatchConfig::default(),
            now + Duration::from_secs(1),
        )
        .await;

        assert_eq!(result.unwrap_err(), CommitRejection::Duplicate);
    }

    #[tokio::test]
    async fn runaway_correction_is_not_cached() {
        let mut last_sent = LastSentFinal::new();
        let mut cache = GrammarCache::default();
        let mut timeline = TimelineTracker::new();
        let grammar = ScriptedGrammarWorker::always_returns("x ".repeat(20));
        let translator = translator_with(HashMap::new());

        let input = CommitInput {
            text: "hi".to_string(),
            is_forced: false,
            source_lang: "en".to_string(),
            target_langs: vec![],
            session_id: "s1".to_string(),
            tier: TranslationTier::Standard,
            predecessor_text: String::new(),
        };

        commit_final(input, &mut last_sent, &mut cache, &mut timeline, &grammar, &translator, &DispatchConfig::default(), Instant::now())
            .await
            .unwrap();

        assert!(cache.is_empty());
    }
}
