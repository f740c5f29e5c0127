use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::service::CrewService;
use crate::session::SessionId;

const PONG_MESSAGE: &str = r#"{"type":"pong"}"#;

/// Upgrade to a per-session event stream. Events are pushed as JSON
/// objects; the client may send `{"type":"ping"}` liveness probes, which
/// get a matching pong. Anything else from the client is ignored.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<SessionId>,
    State(service): State<Arc<CrewService>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, id, service))
}

async fn handle_socket(socket: WebSocket, id: SessionId, service: Arc<CrewService>) {
    info!("WebSocket connected for session {}", id);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let generation = service.sink().connect(id, events_tx).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                match event {
                    Some(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                debug!("Failed to serialize event for session {}: {}", id, e);
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    // sender dropped: a newer connection replaced this one
                    None => {
                        debug!("Connection for session {} superseded", id);
                        break;
                    }
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if is_ping(&text)
                            && ws_tx.send(Message::Text(PONG_MESSAGE.to_string())).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket error for session {}: {}", id, e);
                        break;
                    }
                }
            }
        }
    }

    // generation-guarded: only removes this socket's own registration,
    // never a successor's
    service.sink().disconnect(id, generation).await;
    info!("WebSocket disconnected for session {}", id);
}

fn is_ping(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str().map(String::from)))
        .as_deref()
        == Some("ping")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ping() {
        assert!(is_ping(r#"{"type":"ping"}"#));
        assert!(!is_ping(r#"{"type":"pong"}"#));
        assert!(!is_ping("not json"));
        assert!(!is_ping(r#"{"other":"field"}"#));
    }
}
