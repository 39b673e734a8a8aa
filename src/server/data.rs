//! Data-plane handlers
//!
//! Thin JSON handlers over the key/value store. All of these sit behind the
//! audit gate; by the time a request lands here the policy has already
//! allowed it. A GET that arrives as a WebSocket upgrade becomes a watch
//! stream instead of a one-shot read.

use crate::audit::Caller;
use crate::server::error::ApiError;
use crate::server::{websocket, AppState};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::json;
use tracing::{debug, info};

fn caller_account(caller: &Option<Extension<Caller>>) -> &str {
    caller.as_ref().map(|c| c.account.as_str()).unwrap_or("-")
}

/// GET /
pub async fn index(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let keys = state
        .data
        .keys("")
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({ "keys": keys })))
}

/// GET /{key...}, either a one-shot read or a watch upgrade.
pub async fn read(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    if let Ok(ws) = ws {
        return Ok(websocket::watch(ws, state, key));
    }

    let value = state.data.get(&key).await.map_err(|e| {
        debug!(key = %key, error = %e, "read miss");
        ApiError::not_found("item not found")
    })?;

    Ok(Json(json!({ "key": key, "value": value })).into_response())
}

/// POST /{key...}
pub async fn write(
    State(state): State<AppState>,
    Path(key): Path<String>,
    caller: Option<Extension<Caller>>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .data
        .set(&key, value)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    info!(key = %key, account = caller_account(&caller), "write");
    Ok(Json(json!({ "key": key })))
}

/// DELETE /{key...}
pub async fn remove(
    State(state): State<AppState>,
    Path(key): Path<String>,
    caller: Option<Extension<Caller>>,
) -> Result<StatusCode, ApiError> {
    use crate::storage::StorageError;

    match state.data.delete(&key).await {
        Ok(()) => {
            info!(key = %key, account = caller_account(&caller), "delete");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(StorageError::NotFound(_)) => Err(ApiError::not_found("item not found")),
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}
