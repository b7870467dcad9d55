//! The host connection: one speaker's WebSocket, one [`relay_session`]
//! pipeline. Modeled on the split-sender/spawned-fan-out-task shape of a
//! voice-interpretation WebSocket bridge: read the browser's frames into
//! the session, relay the session's outbound events back to the browser
//! and to every registered listener.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use relay_session::{spawn_session, OutboundEvent};
use relay_transport::{ErrorMessage, InboundFrame};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::registry::{ListenerSender, SessionEntry};
use crate::state::GatewayState;

pub async fn handle_host_ws(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_host_connection(socket, state))
}

async fn handle_host_connection(socket: WebSocket, state: GatewayState) {
    let (mut sender, mut receiver) = socket.split();

    let (source_lang, tier) = match await_init_frame(&mut receiver, &mut sender).await {
        Some(init) => init,
        None => return,
    };

    let session_id = Uuid::new_v4().to_string();
    state.session_store.create_session(&session_id, &source_lang, tier).await;

    let stt = (state.stt_factory)(&source_lang);
    let mut handle = spawn_session(
        session_id.clone(),
        source_lang,
        tier,
        state.session_config.clone(),
        stt,
        Arc::clone(&state.grammar),
        Arc::clone(&state.translator),
        Arc::clone(&state.events),
    );

    let listeners = Arc::new(Mutex::new(HashMap::new()));
    state.registry.insert(
        session_id.clone(),
        SessionEntry {
            inbound_tx: handle.inbound_tx.clone(),
            target_lang_tx: handle.target_lang_tx.clone(),
            cancel: handle.cancel.clone(),
            listeners: Arc::clone(&listeners),
        },
    );

    loop {
        tokio::select! {
            event = handle.outbound_rx.recv() => {
                match event {
                    Some(event) => {
                        fanout_to_listeners(&event, &listeners);
                        if sender.send(Message::Text(to_json(&event).into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundFrame>(&text) {
                            Ok(frame) => {
                                if handle.inbound_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                let msg = ErrorMessage::new(format!("malformed frame: {err}"));
                                let _ = sender.send(Message::Text(serde_json::to_string(&msg).unwrap_or_default().into())).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(session_id = %session_id, error = %err, "host websocket error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.remove(&session_id);
    handle.shutdown().await;
}

/// Blocks until the first `init` frame arrives, or the connection closes
/// before sending one. Returns `None` on anything other than a clean init.
async fn await_init_frame(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> Option<(String, relay_transport::TranslationTier)> {
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<InboundFrame>(&text) {
                Ok(InboundFrame::Init { source_lang, tier }) => return Some((source_lang, tier)),
                Ok(_) => {
                    let msg = ErrorMessage::new("first frame must be init");
                    let _ = sender.send(Message::Text(serde_json::to_string(&msg).unwrap_or_default().into())).await;
                    return None;
                }
                Err(err) => {
                    let msg = ErrorMessage::new(format!("invalid init frame: {err}"));
                    let _ = sender.send(Message::Text(serde_json::to_string(&msg).unwrap_or_default().into())).await;
                    return None;
                }
            },
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return None,
        }
    }
}

/// Routes a translation event to every listener whose registered language
/// matches, dropping listeners whose channel has gone away. Disconnecting
/// listener A never touches listener B or the host (§8 scenario 5).
fn fanout_to_listeners(event: &OutboundEvent, listeners: &crate::registry::ListenerMap) {
    if let OutboundEvent::Translation(msg) = event {
        let mut guard = listeners.lock().unwrap();
        guard.retain(|_, listener: &mut ListenerSender| {
            if listener.target_lang != msg.target_lang {
                true
            } else {
                listener.tx.send(event.clone()).is_ok()
            }
        });
    }
}

fn to_json(event: &OutboundEvent) -> String {
    let value = match event {
        OutboundEvent::Ready(msg) => serde_json::to_value(msg),
        OutboundEvent::Translation(msg) => serde_json::to_value(msg),
        OutboundEvent::Warning(msg) => serde_json::to_value(msg),
        OutboundEvent::Error(msg) => serde_json::to_value(msg),
    };
    value.map(|v| v.to_string()).unwrap_or_default()
}
