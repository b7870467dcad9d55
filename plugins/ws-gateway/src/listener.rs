//! A listener connection: registers a target language against an
//! already-running session and receives that language's translation
//! stream until it disconnects. Losing a listener never touches the host
//! or any other listener (§8 scenario 5).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use relay_session::OutboundEvent;
use uuid::Uuid;

use crate::registry::ListenerSender;
use crate::state::GatewayState;

#[derive(serde::Deserialize)]
pub struct ListenerParams {
    session_id: String,
    target_lang: String,
}

pub async fn handle_listener_ws(
    State(state): State<GatewayState>,
    Query(params): Query<ListenerParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(entry) = state.registry.get(&params.session_id) else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    state.session_store.register_listener_language(&params.session_id, &params.target_lang).await;
    // Push the new language into the live engine so future commits
    // translate for it; registry-side bookkeeping alone wouldn't.
    let _ = entry.target_lang_tx.send(params.target_lang.clone()).await;

    ws.on_upgrade(move |socket| handle_listener_connection(socket, entry, params.target_lang)).into_response()
}

async fn handle_listener_connection(socket: WebSocket, entry: crate::registry::SessionEntry, target_lang: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let listener_id = Uuid::new_v4();

    entry.listeners.lock().unwrap().insert(listener_id, ListenerSender { target_lang, tx });

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(OutboundEvent::Translation(msg)) => {
                        let text = serde_json::to_string(&msg).unwrap_or_default();
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }

            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    entry.listeners.lock().unwrap().remove(&listener_id);
}
