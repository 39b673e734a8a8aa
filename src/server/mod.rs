//! HTTP and WebSocket server
//!
//! Two route groups share one [`AppState`]:
//!
//! - control plane: `/register`, `/authorize`, `/profile`, `/available`,
//!   `/users`, `/user/{account}`; handlers authenticate themselves
//! - data plane: `/` and `/{key...}` behind the audit gate middleware

pub mod data;
pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod websocket;

use crate::audit::AuditPolicy;
use crate::auth::users::CredentialStore;
use crate::auth::TokenSigner;
use crate::storage::Storage;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub users: CredentialStore,
    pub tokens: Arc<TokenSigner>,
    pub policy: Arc<AuditPolicy>,
    pub data: Arc<dyn Storage>,
    /// Accounts that register with the admin role.
    pub admin_accounts: Arc<Vec<String>>,
}

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let data_routes = Router::new()
        .route("/", get(data::index))
        .route(
            "/{*key}",
            get(data::read).post(data::write).delete(data::remove),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::audit_gate,
        ));

    let auth_routes = Router::new()
        .route("/register", post(endpoints::register))
        .route(
            "/authorize",
            post(endpoints::authorize).put(endpoints::refresh),
        )
        .route("/profile", get(endpoints::profile))
        .route("/available", get(endpoints::available))
        .route("/users", get(endpoints::list_users))
        .route(
            "/user/{account}",
            get(endpoints::get_user)
                .post(endpoints::update_user)
                .delete(endpoints::delete_user),
        );

    // Static auth paths outrank the data wildcard during matching.
    auth_routes.merge(data_routes).with_state(state)
}

/// Run the server until the task is cancelled.
pub async fn run(bind_addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
