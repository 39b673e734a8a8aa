//! Account and token endpoints
//!
//! The control plane: registration, credential verification, token refresh
//! and profile/admin account management. These routes sit outside the audit
//! gate; each handler does its own authentication where it needs one.

use crate::audit::bearer::bearer_token;
use crate::auth::tokens::TokenError;
use crate::auth::users::validate_registration;
use crate::auth::{hash_password, verify_password, Claims, Role, User};
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::storage::StorageError;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// Issued credentials, returned by register, authorize and refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub account: String,
    pub token: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub account: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub account: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    pub account: String,
}

/// Partial account update; absent fields keep their stored value.
#[derive(Debug, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

fn issue_credentials(state: &AppState, account: &str, role: Role) -> Credentials {
    Credentials {
        account: account.to_string(),
        token: state.tokens.issue(account, role),
        role,
    }
}

/// Verify the caller's bearer token, or 401.
fn authenticated_claims(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = bearer_token(headers).ok_or_else(ApiError::unauthorized)?;
    state.tokens.verify(token).map_err(|e| {
        debug!(error = %e, "token rejected");
        ApiError::unauthorized()
    })
}

/// Verify the caller's bearer token and require an elevated role.
fn elevated_claims(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let claims = authenticated_claims(state, headers)?;
    if !claims.role.is_elevated() {
        return Err(ApiError::unauthorized());
    }
    Ok(claims)
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Json(mut user): Json<User>,
) -> Result<Json<Credentials>, ApiError> {
    validate_registration(&user).map_err(|e| ApiError::bad_request(e.to_string()))?;

    user.role = if state.admin_accounts.contains(&user.account) {
        Role::Admin
    } else {
        Role::User
    };
    user.password =
        hash_password(&user.password).map_err(|e| ApiError::internal(e.to_string()))?;

    match state.users.insert(&user).await {
        Ok(()) => {}
        Err(StorageError::AlreadyExists(_)) => {
            return Err(ApiError::bad_request("account name taken"));
        }
        Err(e) => return Err(ApiError::internal(e.to_string())),
    }

    info!(account = %user.account, role = %user.role, "account registered");
    Ok(Json(issue_credentials(&state, &user.account, user.role)))
}

/// POST /authorize
pub async fn authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> Result<Json<Credentials>, ApiError> {
    // Unknown account and wrong password produce the same response; the
    // distinction stays in the debug log.
    let user = match state.users.get(&req.account).await {
        Ok(user) => user,
        Err(_) => {
            debug!(account = %req.account, "authorize for unknown account");
            return Err(ApiError::forbidden("invalid credentials"));
        }
    };

    if !verify_password(&req.password, &user.password) {
        debug!(account = %req.account, "authorize with wrong password");
        return Err(ApiError::forbidden("invalid credentials"));
    }

    Ok(Json(issue_credentials(&state, &user.account, user.role)))
}

/// PUT /authorize
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<Credentials>, ApiError> {
    let user = state
        .users
        .get(&req.account)
        .await
        .map_err(|_| ApiError::bad_request("invalid refresh request"))?;

    let token = state
        .tokens
        .refresh(&req.token, &user.account, user.role)
        .map_err(|e| match e {
            TokenError::StillValid => ApiError::not_modified("token not expired"),
            _ => ApiError::bad_request("invalid refresh request"),
        })?;

    Ok(Json(Credentials {
        account: user.account,
        token,
        role: user.role,
    }))
}

/// GET /profile
pub async fn profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let claims = authenticated_claims(&state, &headers)?;

    let user = state.users.get(&claims.issuer).await.map_err(|_| {
        ApiError::bad_request("bad token, couldn't find the issuer profile")
    })?;

    Ok(Json(user.redacted()))
}

/// GET /available?account=
pub async fn available(
    State(state): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.users.get(&query.account).await.is_ok() {
        return Err(ApiError::conflict("account taken"));
    }
    Ok(Json(json!({ "message": "account available" })))
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, ApiError> {
    elevated_claims(&state, &headers)?;

    let users = state
        .users
        .list()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(users.iter().map(User::redacted).collect()))
}

/// GET /user/{account}
pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account): Path<String>,
) -> Result<Json<User>, ApiError> {
    elevated_claims(&state, &headers)?;

    let user = state
        .users
        .get(&account)
        .await
        .map_err(|_| ApiError::not_found("user not found"))?;

    Ok(Json(user.redacted()))
}

/// POST /user/{account}
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    elevated_claims(&state, &headers)?;

    let mut user = state
        .users
        .get(&account)
        .await
        .map_err(|_| ApiError::not_found("user not found"))?;

    if let Some(name) = update.name {
        if name.is_empty() {
            return Err(ApiError::bad_request("name cannot be empty"));
        }
        user.name = name;
    }
    if let Some(email) = update.email {
        if !crate::auth::users::valid_email(&email) {
            return Err(ApiError::bad_request("invalid email address"));
        }
        user.email = email;
    }
    if let Some(phone) = update.phone {
        if !crate::auth::users::valid_phone(&phone) {
            return Err(ApiError::bad_request(
                "phone can only contain digits, '-' or '_' and must be between 6 and 15 characters",
            ));
        }
        user.phone = phone;
    }
    if let Some(password) = update.password {
        if !(3..=88).contains(&password.chars().count()) {
            return Err(ApiError::bad_request(
                "password must be between 3 and 88 characters",
            ));
        }
        user.password =
            hash_password(&password).map_err(|e| ApiError::internal(e.to_string()))?;
    }
    if let Some(role) = update.role {
        user.role = role;
    }

    state
        .users
        .put(&user)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    info!(account = %user.account, "account updated");
    Ok(Json(user.redacted()))
}

/// DELETE /user/{account}
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account): Path<String>,
) -> Result<axum::http::StatusCode, ApiError> {
    elevated_claims(&state, &headers)?;

    match state.users.delete(&account).await {
        Ok(()) => {
            info!(account = %account, "account deleted");
            Ok(axum::http::StatusCode::NO_CONTENT)
        }
        Err(StorageError::NotFound(_)) => Err(ApiError::not_found("user not found")),
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}
