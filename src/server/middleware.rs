//! Audit gate middleware
//!
//! Runs in front of every data-plane route: promotes a WebSocket subprotocol
//! token into `Authorization`, verifies the bearer token if one is present,
//! and asks the audit policy whether the request may proceed. An allowed
//! request carries the verified [`Caller`] as a request extension.

use crate::audit::bearer::{bearer_token, promote_websocket_bearer};
use crate::audit::Caller;
use crate::server::error::ApiError;
use crate::server::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

pub async fn audit_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    promote_websocket_bearer(request.headers_mut());

    let caller = match bearer_token(request.headers()) {
        Some(token) => match state.tokens.verify(token) {
            Ok(claims) => Some(Caller {
                account: claims.issuer,
                role: claims.role,
            }),
            Err(e) => {
                // Bad token is treated as no token; the policy decides.
                debug!(error = %e, "bearer token rejected");
                None
            }
        },
        None => None,
    };

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if !state.policy.decide(&method, &path, caller.as_ref()) {
        debug!(method = %method, path = %path, authenticated = caller.is_some(), "request denied");
        return Err(match caller {
            Some(_) => ApiError::forbidden("this request is not authorized"),
            None => ApiError::unauthorized(),
        });
    }

    if let Some(caller) = caller {
        request.extensions_mut().insert(caller);
    }

    Ok(next.run(request).await)
}
