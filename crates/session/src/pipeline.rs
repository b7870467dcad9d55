//! The async orchestrator loop: the one logical task per session that owns
//! every timer, provider call, and piece of mutable state. Every engine
//! (`relay-finalize`, `relay-forced`, `relay-recovery`, `relay-dispatch`) is
//! purely decision-returning; this loop is the only place a `tokio::select!`
//! or a real sleep ever appears.

use crate::engine::{SessionConfig, SessionEngine};
use base64::Engine as _;
use relay_dispatch::{commit_final, dispatch_partial, CommitInput, CommitRejection, PartialDispatchInput, PartialDispatchOutcome};
use relay_events::{event_names, EventBusRef, WarningEvent};
use relay_finalize::FinalizeDecision;
use relay_forced::ForcedDecision;
use relay_providers::{GrammarWorker, SttProvider, SttResult, TranslationWorker};
use relay_recovery::{run_recovery, RecoveryInput, RecoveryOutcome};
use relay_transport::{ErrorMessage, InboundFrame, SessionReadyMessage, TranslationMessage, TranslationTier, WarningMessage};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything a session emits toward the transport layer. The gateway owns
/// serialization and fan-out to the host/listener sockets; this loop only
/// decides what to send and in what order.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Ready(SessionReadyMessage),
    Translation(TranslationMessage),
    Warning(WarningMessage),
    Error(ErrorMessage),
}

/// The handles a gateway connection uses to drive one session loop.
pub struct SessionHandle {
    pub inbound_tx: mpsc::Sender<InboundFrame>,
    pub target_lang_tx: mpsc::Sender<String>,
    pub outbound_rx: mpsc::Receiver<OutboundEvent>,
    pub cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SessionHandle {
    /// Await the session loop's own teardown, after cancelling it.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

/// Spawn a session loop bound to one host connection's providers. Returns
/// immediately with the channels the gateway drives and drains.
pub fn spawn_session(
    session_id: impl Into<String>,
    source_lang: impl Into<String>,
    tier: TranslationTier,
    config: SessionConfig,
    stt: Box<dyn SttProvider + Send>,
    grammar: Arc<dyn GrammarWorker>,
    translator: Arc<dyn TranslationWorker>,
    events: EventBusRef,
) -> SessionHandle {
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (target_lang_tx, target_lang_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();

    let engine = SessionEngine::new(session_id, source_lang, tier, &config);
    let loop_cancel = cancel.clone();
    let join = tokio::spawn(async move {
        run_session(engine, config, inbound_rx, target_lang_rx, outbound_tx, stt, grammar, translator, events, loop_cancel).await;
    });

    SessionHandle { inbound_tx, target_lang_tx, outbound_rx, cancel, join }
}

fn decode_audio_chunk(audio_data: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD.decode(audio_data).ok()
}

async fn run_session(
    mut engine: SessionEngine,
    config: SessionConfig,
    mut inbound: mpsc::Receiver<InboundFrame>,
    mut target_lang_rx: mpsc::Receiver<String>,
    outbound: mpsc::Sender<OutboundEvent>,
    mut stt: Box<dyn SttProvider + Send>,
    grammar: Arc<dyn GrammarWorker>,
    translator: Arc<dyn TranslationWorker>,
    events: EventBusRef,
    cancel: CancellationToken,
) {
    let _ = outbound.send(OutboundEvent::Ready(SessionReadyMessage::new(engine.session_id.clone()))).await;

    let mut finalize_deadline: Option<Instant> = None;
    let mut phase2_deadline: Option<Instant> = None;
    let mut recovery_task: Option<JoinHandle<RecoveryOutcome>> = None;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                flush_on_close(&mut engine, &grammar, &translator, &config, &outbound).await;
                return;
            }

            lang = target_lang_rx.recv() => {
                match lang {
                    Some(lang) if lang != engine.source_lang && !engine.target_langs.iter().any(|l| l == &lang) => {
                        engine.target_langs.push(lang);
                    }
                    Some(_) => {}
                    None => {}
                }
            }

            frame = inbound.recv() => {
                let Some(frame) = frame else {
                    flush_on_close(&mut engine, &grammar, &translator, &config, &outbound).await;
                    return;
                };
                handle_inbound_frame(frame, &mut engine, &mut stt, &mut finalize_deadline, &grammar, &translator, &config, &outbound, &events).await;
            }

            result = stt.next_result() => {
                let Some(result) = result else {
                    flush_on_close(&mut engine, &grammar, &translator, &config, &outbound).await;
                    return;
                };
                handle_stt_result(result, &mut engine, &mut finalize_deadline, &mut phase2_deadline, &grammar, &translator, &config, &outbound).await;
            }

            _ = sleep_until_or_pending(finalize_deadline) => {
                let decision = engine.finalize.on_deadline_fire(&mut engine.partial_tracker, Instant::now());
                apply_finalize_decision(decision, &mut engine, &mut finalize_deadline, &grammar, &translator, &config, &outbound).await;
            }

            _ = sleep_until_or_pending(phase2_deadline) => {
                phase2_deadline = None;
                let decision = engine.forced.on_phase2_fire(&engine.partial_tracker, Instant::now());
                if let ForcedDecision::RequestCapture { window } = decision {
                    let total_ms = (window.pre + window.post).as_millis() as u64;
                    match stt.get_recent_audio(total_ms, None).await {
                        Ok(audio) if !audio.is_empty() => {
                            if let Ok(stream) = stt.open_recovery_stream(&engine.source_lang).await {
                                let predecessor_text = engine.forced.buffer().map(|b| b.predecessor.original_text.clone()).unwrap_or_default();
                                let buffered_text = engine.forced.buffer().map(|b| b.buffered_text.clone()).unwrap_or_default();
                                let source_lang = engine.source_lang.clone();
                                let recovery_config = config.recovery.clone();
                                recovery_task = Some(tokio::spawn(async move {
                                    let mut stream = stream;
                                    let input = RecoveryInput {
                                        audio,
                                        source_lang,
                                        buffered_text,
                                        next_partial_hint: None,
                                        next_final_hint: None,
                                    };
                                    let mut outcome = run_recovery(&mut stream, input, &recovery_config).await;
                                    outcome.predecessor_text = predecessor_text;
                                    outcome
                                }));
                            } else {
                                let predecessor = engine.forced.buffer().map(|b| b.predecessor.original_text.clone());
                                let decision = engine.forced.on_capture_empty();
                                apply_forced_decision(decision, predecessor, &mut engine, &grammar, &translator, &config, &outbound).await;
                            }
                        }
                        _ => {
                            let predecessor = engine.forced.buffer().map(|b| b.predecessor.original_text.clone());
                            let decision = engine.forced.on_capture_empty();
                            apply_forced_decision(decision, predecessor, &mut engine, &grammar, &translator, &config, &outbound).await;
                        }
                    }
                }
            }

            outcome = join_recovery(&mut recovery_task) => {
                recovery_task = None;
                let timed_out = outcome.merged_text == outcome.predecessor_text;
                events.emit(
                    event_names::RECOVERY_OUTCOME,
                    serde_json::to_value(relay_events::RecoveryOutcomeEvent {
                        session_id: engine.session_id.clone(),
                        segment_id: engine.segment.current(),
                        recovered_chars: outcome.merged_text.chars().count().saturating_sub(outcome.predecessor_text.chars().count()),
                        timed_out,
                    }).unwrap_or(serde_json::Value::Null),
                );
                let predecessor = Some(outcome.predecessor_text.clone());
                let decision = engine.forced.on_recovery_resolved(Some(outcome.merged_text));
                apply_forced_decision(decision, predecessor, &mut engine, &grammar, &translator, &config, &outbound).await;
            }
        }
    }
}

/// Resolves once `task` completes; stays pending forever when there is none,
/// so the `select!` arm above simply never fires.
async fn join_recovery(task: &mut Option<JoinHandle<RecoveryOutcome>>) -> RecoveryOutcome {
    match task {
        Some(handle) => match handle.await {
            Ok(outcome) => outcome,
            Err(_) => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

async fn sleep_until_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant.into()).await,
        None => std::future::pending().await,
    }
}

async fn handle_inbound_frame(
    frame: InboundFrame,
    engine: &mut SessionEngine,
    stt: &mut Box<dyn SttProvider + Send>,
    finalize_deadline: &mut Option<Instant>,
    grammar: &Arc<dyn GrammarWorker>,
    translator: &Arc<dyn TranslationWorker>,
    config: &SessionConfig,
    outbound: &mpsc::Sender<OutboundEvent>,
    events: &EventBusRef,
) {
    match frame {
        InboundFrame::Init { source_lang, tier } => {
            engine.source_lang = source_lang;
            engine.tier = tier;
        }
        InboundFrame::Audio { audio_data, .. } => {
            let Some(audio) = decode_audio_chunk(&audio_data) else {
                let _ = outbound.send(OutboundEvent::Error(ErrorMessage::new("audio chunk was not valid base64"))).await;
                events.emit(
                    event_names::WARNING,
                    serde_json::to_value(warn_event(&engine.session_id, "bad_audio_encoding", "audio chunk was not valid base64"))
                        .unwrap_or(serde_json::Value::Null),
                );
                return;
            };
            if let Err(err) = stt.send_audio(&audio).await {
                let _ = outbound
                    .send(OutboundEvent::Warning(WarningMessage::new(format!("audio send failed: {err}"), Some("stt_send_failed".to_string()))))
                    .await;
                events.emit(
                    event_names::WARNING,
                    serde_json::to_value(warn_event(&engine.session_id, "stt_send_failed", &err.to_string())).unwrap_or(serde_json::Value::Null),
                );
            }
        }
        InboundFrame::AudioEnd => {
            flush_on_close(engine, grammar, translator, config, outbound).await;
        }
        InboundFrame::ForceCommit => {
            if let Some(pending) = engine.finalize.pending().cloned() {
                *finalize_deadline = None;
                engine.finalize.clear();
                let outcome = commit_pending_text(pending.text, true, None, engine, grammar, translator, config).await;
                emit_commit_outcome(outcome, outbound).await;
            }
        }
    }
}

async fn handle_stt_result(
    result: SttResult,
    engine: &mut SessionEngine,
    finalize_deadline: &mut Option<Instant>,
    phase2_deadline: &mut Option<Instant>,
    grammar: &Arc<dyn GrammarWorker>,
    translator: &Arc<dyn TranslationWorker>,
    config: &SessionConfig,
    outbound: &mpsc::Sender<OutboundEvent>,
) {
    let now = Instant::now();

    if result.is_partial {
        engine.partial_tracker.update(&result.text, now);
        if engine.forced.is_active() {
            engine.forced.absorb_late_partial(&engine.partial_tracker, now);
        }
        let is_segment_start = engine.last_sent.final_text.is_empty() || !engine.last_sent.sent_within(std::time::Duration::from_secs(60), now);
        let outcome = dispatch_partial(
            PartialDispatchInput { text: result.text.clone(), is_segment_start },
            &mut engine.partial_dispatch_state,
            &engine.last_sent,
            &config.partial_dispatch,
            now,
        );
        if let PartialDispatchOutcome::Emit(text) = outcome {
            let anchor_seq_id = engine.timeline.next_seq_id();
            let now_ms = relay_timeline::ServerTimestamp::now().get();
            let anchor = TranslationMessage::anchor(
                anchor_seq_id.get(),
                now_ms,
                true,
                engine.source_lang.clone(),
                text.clone(),
                text.clone(),
                false,
                None,
                false,
            );
            let _ = outbound.send(OutboundEvent::Translation(anchor)).await;

            let target_langs: Vec<String> = engine.target_langs.iter().filter(|lang| **lang != engine.source_lang).cloned().collect();
            emit_partial_updates(&text, anchor_seq_id.get(), now_ms, engine, grammar, translator, target_langs, outbound).await;
        }
        return;
    }

    if result.forced {
        let (chosen, decision) = engine.forced.on_forced_final(&result.text, &engine.partial_tracker, &engine.last_sent, now);
        let _ = chosen;
        if let ForcedDecision::OpenedBuffer { cancel_pending_finalization } = decision {
            if cancel_pending_finalization {
                *finalize_deadline = None;
                engine.finalize.clear();
            }
            *phase2_deadline = Some(engine.forced.schedule_phase2(now));
        }
        return;
    }

    // Natural final.
    if engine.forced.is_active() && engine.forced.should_wait_for_recovery_on_new_final(&result.text) {
        // Fold the new final into the partial tracker so it rejoins once
        // the in-flight recovery resolves, instead of racing its own commit.
        engine.partial_tracker.update(&result.text, now);
        return;
    }

    let text = engine.finalize.detect_continuation(&result.text, &engine.last_sent, now).unwrap_or(result.text.clone());
    let decision = engine.finalize.on_stable(&text, &engine.partial_tracker, now);
    apply_finalize_decision(decision, engine, finalize_deadline, grammar, translator, config, outbound).await;
}

/// Grammar correction and translation run concurrently for a partial;
/// whichever resolves first is emitted first, tagged `update_type: grammar`
/// or carrying `has_translation=true`. Unlike the commit path, a failure or
/// a skipped call here is silent: the next throttled pass (or the eventual
/// final) carries the correction or translation instead.
#[allow(clippy::too_many_arguments)]
async fn emit_partial_updates(
    original_text: &str,
    anchor_seq_id: u64,
    server_timestamp: i64,
    engine: &mut SessionEngine,
    grammar: &Arc<dyn GrammarWorker>,
    translator: &Arc<dyn TranslationWorker>,
    target_langs: Vec<String>,
    outbound: &mpsc::Sender<OutboundEvent>,
) {
    let source_lang = engine.source_lang.clone();
    let session_id = engine.session_id.clone();
    let tier = engine.tier;

    let run_grammar = source_lang == "en";
    let run_translation = !target_langs.is_empty();
    if !run_grammar && !run_translation {
        return;
    }

    let grammar_call = async {
        if run_grammar {
            Some(grammar.correct_partial(original_text).await)
        } else {
            None
        }
    };
    let translation_call = async {
        if run_translation {
            Some(translator.translate_to_multiple_languages(original_text, &source_lang, &target_langs, &session_id, tier).await)
        } else {
            None
        }
    };
    tokio::pin!(grammar_call);
    tokio::pin!(translation_call);

    let mut grammar_left = run_grammar;
    let mut translation_left = run_translation;

    while grammar_left || translation_left {
        tokio::select! {
            result = &mut grammar_call, if grammar_left => {
                grammar_left = false;
                if let Some(Ok(corrected)) = result {
                    if corrected != original_text {
                        let msg = TranslationMessage::anchor(
                            anchor_seq_id,
                            server_timestamp,
                            true,
                            source_lang.clone(),
                            original_text.to_string(),
                            corrected,
                            true,
                            Some(relay_transport::UpdateType::Grammar),
                            false,
                        );
                        if msg.validate().is_ok() {
                            let _ = outbound.send(OutboundEvent::Translation(msg)).await;
                        }
                    }
                }
            }
            result = &mut translation_call, if translation_left => {
                translation_left = false;
                if let Some(Ok(map)) = result {
                    for target_lang in &target_langs {
                        if let Some(translated) = map.get(target_lang) {
                            let seq_id = engine.timeline.next_seq_id();
                            let msg = TranslationMessage::translation(
                                seq_id.get(),
                                anchor_seq_id,
                                server_timestamp,
                                true,
                                source_lang.clone(),
                                target_lang.clone(),
                                original_text.to_string(),
                                None,
                                Some(translated.clone()),
                                true,
                                false,
                                false,
                                None,
                            );
                            if msg.validate().is_ok() {
                                let _ = outbound.send(OutboundEvent::Translation(msg)).await;
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn apply_finalize_decision(
    decision: FinalizeDecision,
    engine: &mut SessionEngine,
    finalize_deadline: &mut Option<Instant>,
    grammar: &Arc<dyn GrammarWorker>,
    translator: &Arc<dyn TranslationWorker>,
    config: &SessionConfig,
    outbound: &mpsc::Sender<OutboundEvent>,
) {
    match decision {
        FinalizeDecision::Noop => {}
        FinalizeDecision::ArmDeadline { deadline, .. } => {
            *finalize_deadline = Some(deadline);
        }
        FinalizeDecision::Commit(text) => {
            *finalize_deadline = None;
            let outcome = commit_pending_text(text, false, None, engine, grammar, translator, config).await;
            emit_commit_outcome(outcome, outbound).await;
        }
    }
}

async fn apply_forced_decision(
    decision: ForcedDecision,
    predecessor_override: Option<String>,
    engine: &mut SessionEngine,
    grammar: &Arc<dyn GrammarWorker>,
    translator: &Arc<dyn TranslationWorker>,
    config: &SessionConfig,
    outbound: &mpsc::Sender<OutboundEvent>,
) {
    if let ForcedDecision::Commit(text) = decision {
        let outcome = commit_pending_text(text, true, predecessor_override, engine, grammar, translator, config).await;
        emit_commit_outcome(outcome, outbound).await;
    }
}

/// `predecessor_override` carries the predecessor captured when a forced
/// final buffer opened (or the one a recovery attempt resolved against),
/// so cross-segment dedup compares against the right prior segment even
/// if `engine.forced`'s buffer has already been taken by the engine call
/// that produced this commit decision.
async fn commit_pending_text(
    text: String,
    is_forced: bool,
    predecessor_override: Option<String>,
    engine: &mut SessionEngine,
    grammar: &Arc<dyn GrammarWorker>,
    translator: &Arc<dyn TranslationWorker>,
    config: &SessionConfig,
) -> Result<relay_dispatch::CommitOutcome, CommitRejection> {
    let predecessor_text = predecessor_override.unwrap_or_else(|| engine.last_sent.original_text.clone());

    let input = CommitInput {
        text,
        is_forced,
        source_lang: engine.source_lang.clone(),
        target_langs: engine.target_langs.clone(),
        session_id: engine.session_id.clone(),
        tier: engine.tier,
        predecessor_text,
    };

    let result = commit_final(
        input,
        &mut engine.last_sent,
        &mut engine.grammar_cache,
        &mut engine.timeline,
        grammar.as_ref(),
        translator.as_ref(),
        &config.dispatch,
        Instant::now(),
    )
    .await;

    if result.is_ok() {
        engine.close_segment();
    }
    result
}

async fn emit_commit_outcome(outcome: Result<relay_dispatch::CommitOutcome, CommitRejection>, outbound: &mpsc::Sender<OutboundEvent>) {
    match outcome {
        Ok(outcome) => {
            let _ = outbound.send(OutboundEvent::Translation(outcome.anchor)).await;
            for translation in outcome.translations {
                let _ = outbound.send(OutboundEvent::Translation(translation)).await;
            }
        }
        Err(CommitRejection::Duplicate) | Err(CommitRejection::EmptyAfterCrossSegmentDedup) => {
            tracing::debug!("commit rejected, nothing to emit");
        }
    }
}

/// Session close / connection drop: flush whatever is still buffered
/// instead of silently dropping it, per the no-data-loss property.
async fn flush_on_close(
    engine: &mut SessionEngine,
    grammar: &Arc<dyn GrammarWorker>,
    translator: &Arc<dyn TranslationWorker>,
    config: &SessionConfig,
    outbound: &mpsc::Sender<OutboundEvent>,
) {
    let predecessor = engine.forced.buffer().map(|b| b.predecessor.original_text.clone());
    if let ForcedDecision::Commit(text) = engine.forced.on_session_close() {
        let outcome = commit_pending_text(text, true, predecessor, engine, grammar, translator, config).await;
        emit_commit_outcome(outcome, outbound).await;
    }
    if let Some(pending) = engine.finalize.pending().cloned() {
        engine.finalize.clear();
        let outcome = commit_pending_text(pending.text, false, None, engine, grammar, translator, config).await;
        emit_commit_outcome(outcome, outbound).await;
    }
}

fn warn_event(session_id: &str, code: &str, detail: &str) -> WarningEvent {
    WarningEvent { session_id: session_id.to_string(), code: code.to_string(), detail: detail.to_string() }
}
