pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::room::SessionEvent;
use crate::state::AppState;
use handlers::{ConnectionContext, Identity};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Messages a bound connection receives for one room update
async fn messages_for(state: &AppState, identity: &Identity, events: &[SessionEvent]) -> Vec<ServerMessage> {
    match state
        .view_for(&identity.room_code, &identity.participant_id, events)
        .await
    {
        Ok((visible, snapshot)) => visible
            .into_iter()
            .map(|event| ServerMessage::Event { event })
            .chain(std::iter::once(ServerMessage::Snapshot {
                snapshot: Box::new(snapshot),
            }))
            .collect(),
        Err(e) => vec![e.into()],
    }
}

async fn send_json<S>(sender: &mut S, msg: &ServerMessage) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode message: {}", e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut ctx = ConnectionContext::default();

    if !send_json(&mut sender, &ServerMessage::welcome()).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    let mut updates = state.broadcast.subscribe();

    loop {
        tokio::select! {
            update = updates.recv() => {
                let update = match update {
                    Ok(update) => update,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Connection lagged, skipped {} updates", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(identity) = ctx.identity.as_ref() else {
                    continue;
                };
                if update.code != identity.room_code {
                    continue;
                }
                let mut open = true;
                for msg in messages_for(&state, identity, &update.events).await {
                    if !send_json(&mut sender, &msg).await {
                        open = false;
                        break;
                    }
                }
                if !open {
                    break;
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let mut outgoing = Vec::new();
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let was_bound = ctx.identity.is_some();
                                outgoing.extend(handlers::handle_message(client_msg, &mut ctx, &state).await);
                                // A freshly bound connection gets the current room right away
                                if let (false, Some(identity)) = (was_bound, ctx.identity.as_ref()) {
                                    outgoing.extend(messages_for(&state, identity, &[]).await);
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                outgoing.push(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                    retryable: false,
                                });
                            }
                        }

                        let mut open = true;
                        for msg in &outgoing {
                            if !send_json(&mut sender, msg).await {
                                tracing::error!("Failed to send response");
                                open = false;
                                break;
                            }
                        }
                        if !open {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(
        "WebSocket connection closed for {:?}",
        ctx.identity.map(|i| i.participant_id)
    );
}
