//! Bearer token extraction
//!
//! Browser WebSocket clients cannot set `Authorization`, so they smuggle the
//! token through `Sec-WebSocket-Protocol: bearer, <token>`. On upgrade
//! requests we promote that value into a regular `Authorization` header
//! before the audit gate looks at the request.

use axum::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL, UPGRADE};
use axum::http::{HeaderMap, HeaderValue};

/// Subprotocol name clients offer alongside the token.
pub const BEARER_PROTOCOL: &str = "bearer";

/// Rewrite a WebSocket upgrade's subprotocol token into `Authorization`.
///
/// Only fires on `Upgrade: websocket` requests carrying a non-empty
/// `Sec-WebSocket-Protocol`. The leading `bearer, ` marker is stripped once;
/// a token that fails header validation is left out rather than erred on,
/// the audit gate then sees an anonymous request.
pub fn promote_websocket_bearer(headers: &mut HeaderMap) {
    let is_upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    if !is_upgrade {
        return;
    }

    let Some(proto) = headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };
    if proto.is_empty() {
        return;
    }

    let token = proto.replacen("bearer, ", "", 1);
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
        headers.insert(AUTHORIZATION, value);
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}
