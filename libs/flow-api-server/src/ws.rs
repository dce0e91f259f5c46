use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /ws, push-only event channel
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(socket, state))
}

async fn ws_connection(mut socket: WebSocket, state: AppState) {
    let mut events = state.hub.subscribe().await;
    let id = events.id();
    tracing::info!(subscriber = id, "client connected to websocket");

    loop {
        tokio::select! {
            biased;

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    // inbound frames carry nothing; commands go over HTTP
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(subscriber = id, error = %e, "websocket read error");
                        break;
                    }
                }
            }

            envelope = events.recv() => {
                match envelope {
                    Some(json) => {
                        if socket.send(Message::Text(json.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    // pruned by the hub
                    None => break,
                }
            }
        }
    }

    state.hub.unsubscribe(id).await;
    tracing::info!(subscriber = id, "client disconnected from websocket");
}
