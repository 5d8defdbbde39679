//! WebSocket broadcaster and the worker draining the event queue.
//!
//! One registry of connected clients; the tick pipeline never touches
//! sockets directly. It pushes onto the bounded queue and this worker
//! fans out.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::events::WsMessage;

/// Registry of connected WebSocket clients keyed by connection id
#[derive(Default)]
pub struct WsBroadcaster {
    clients: RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>,
}

impl WsBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; the receiver feeds the socket's send half
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.write().await.insert(id, tx);
        let count = self.clients.read().await.len();
        info!(client = %id, connected = count, "websocket client connected");
        metrics::gauge!("socket.clients_connected").set(count as f64);
        (id, rx)
    }

    pub async fn unregister(&self, id: Uuid) {
        self.clients.write().await.remove(&id);
        let count = self.clients.read().await.len();
        info!(client = %id, connected = count, "websocket client disconnected");
        metrics::gauge!("socket.clients_connected").set(count as f64);
    }

    /// Send a message to every connected client. Clients whose channel is
    /// gone are pruned on the spot.
    pub async fn broadcast(&self, message: &WsMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("failed to serialize {} event: {e}", message.kind());
                return;
            }
        };

        let mut dead: Vec<Uuid> = Vec::new();
        {
            let clients = self.clients.read().await;
            for (id, tx) in clients.iter() {
                if tx.send(payload.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            self.unregister(id).await;
        }
        metrics::counter!("socket.broadcast_total", "kind" => message.kind()).increment(1);
    }

    /// Send to one client; false when the client is unknown or gone
    pub async fn send_to_client(&self, id: Uuid, message: &WsMessage) -> bool {
        let Ok(payload) = serde_json::to_string(message) else {
            return false;
        };
        let clients = self.clients.read().await;
        clients
            .get(&id)
            .map(|tx| tx.send(payload).is_ok())
            .unwrap_or(false)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Single consumer of the tick → broadcast queue
pub async fn run_broadcast_worker(
    mut rx: mpsc::Receiver<WsMessage>,
    broadcaster: Arc<WsBroadcaster>,
    cancel: CancellationToken,
) {
    info!("broadcast worker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => {
                match message {
                    Some(message) => {
                        trace!(kind = message.kind(), "broadcasting event");
                        broadcaster.broadcast(&message).await;
                    }
                    None => break,
                }
            }
        }
    }
    info!("broadcast worker stopped");
}
