//! WebSocket watch streams
//!
//! A GET on a data key that arrives as a WebSocket upgrade turns into a watch
//! stream: the client first receives a snapshot of the key (if it exists),
//! then one JSON event per matching change. A key matches when the event is
//! for the key itself or anything under `key/`.

use crate::audit::bearer::BEARER_PROTOCOL;
use crate::server::AppState;
use crate::storage::{KvEvent, KvOp};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::WebSocketUpgrade;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Accept the upgrade, echoing the `bearer` subprotocol clients offer.
pub fn watch(ws: WebSocketUpgrade, state: AppState, key: String) -> Response {
    ws.protocols([BEARER_PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state, key))
}

fn matches(event_key: &str, watched: &str) -> bool {
    event_key == watched || event_key.starts_with(&format!("{}/", watched))
}

async fn handle_socket(socket: WebSocket, state: AppState, key: String) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot read so no write can fall in the gap.
    let mut events = state.data.watch();

    debug!(conn_id = %conn_id, key = %key, "watch connected");

    if let Ok(value) = state.data.get(&key).await {
        let snapshot = json!({ "key": key, "op": "snapshot", "value": value });
        if sender
            .send(Message::Text(snapshot.to_string().into()))
            .await
            .is_err()
        {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(KvEvent { key: event_key, op, value }) => {
                    if !matches(&event_key, &key) {
                        continue;
                    }
                    let payload = match op {
                        KvOp::Set => json!({ "key": event_key, "op": "set", "value": value }),
                        KvOp::Delete => json!({ "key": event_key, "op": "delete" }),
                    };
                    if sender
                        .send(Message::Text(payload.to_string().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(conn_id = %conn_id, skipped, "watch stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Watch streams are one-way; ping/pong is handled by axum.
                }
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, error = %e, "watch socket error");
                    break;
                }
            },
        }
    }

    debug!(conn_id = %conn_id, key = %key, "watch disconnected");
}
