//! WebSocket endpoint: registers the connection with the broadcaster and
//! pumps queued events out until either side hangs up.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::events::WsMessage;
use crate::web::AppState;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, mut events) = state.broadcaster.register().await;

    // Seed the new client with the current snapshot so it does not have to
    // wait for incremental updates to fill in
    for aircraft in state.tracker.store().get_all().await {
        state
            .broadcaster
            .send_to_client(client_id, &WsMessage::AircraftAdded(Box::new(aircraft)))
            .await;
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Inbound text/binary is ignored; the socket is one-way
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(client = %client_id, "websocket session ended");
    state.broadcaster.unregister(client_id).await;
}
