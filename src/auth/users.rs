//! User records and credential storage
//!
//! Users live under the `users/` prefix of the auth store, keyed by account
//! name. The stored record carries the password hash; every outbound copy
//! goes through [`User::redacted`] first.

use crate::storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

const USER_PREFIX: &str = "users/";

/// Account role. Stored on the user record; `admin` and `root` bypass the
/// per-path audit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Root,
}

impl Role {
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Root)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
            Role::Root => write!(f, "root"),
        }
    }
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub account: String,
    /// Password hash at rest; blanked in responses.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

impl User {
    /// Copy with the password hash blanked, for response bodies.
    pub fn redacted(&self) -> User {
        User {
            password: String::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("new user data incomplete")]
    Incomplete,

    #[error("account can only contain letters, numbers or underscores and must be between 2 and 15 characters")]
    InvalidAccount,

    #[error("password must be between 3 and 88 characters")]
    InvalidPassword,

    #[error("phone can only contain digits, '-' or '_' and must be between 6 and 15 characters")]
    InvalidPhone,

    #[error("invalid email address")]
    InvalidEmail,
}

fn is_account_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn valid_account(s: &str) -> bool {
    (2..=15).contains(&s.chars().count()) && s.chars().all(is_account_char)
}

pub fn valid_phone(s: &str) -> bool {
    (6..=15).contains(&s.chars().count())
        && s.chars().all(|c| c.is_ascii_digit() || c == '-' || c == '_')
}

pub fn valid_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || ".!#$%&'*+/=?^_`{|}~-".contains(c))
    {
        return false;
    }
    // Domain: dot-separated labels of letters, digits and inner hyphens.
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Validate a registration payload, reporting the first failing field.
pub fn validate_registration(user: &User) -> Result<(), ValidationError> {
    if user.account.is_empty()
        || user.name.is_empty()
        || user.password.is_empty()
        || user.email.is_empty()
        || user.phone.is_empty()
    {
        return Err(ValidationError::Incomplete);
    }
    if !valid_account(&user.account) {
        return Err(ValidationError::InvalidAccount);
    }
    if !(3..=88).contains(&user.password.chars().count()) {
        return Err(ValidationError::InvalidPassword);
    }
    if !valid_phone(&user.phone) {
        return Err(ValidationError::InvalidPhone);
    }
    if !valid_email(&user.email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// User persistence over the abstract key/value store.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn Storage>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    fn key(account: &str) -> String {
        format!("{}{}", USER_PREFIX, account)
    }

    /// Fetch a user. A record that cannot be decoded counts as not found.
    pub async fn get(&self, account: &str) -> Result<User, StorageError> {
        let value = self.store.get(&Self::key(account)).await?;
        serde_json::from_value(value)
            .map_err(|_| StorageError::NotFound(format!("user {}", account)))
    }

    /// Insert a new user atomically; fails if the account already exists.
    pub async fn insert(&self, user: &User) -> Result<(), StorageError> {
        let value = serde_json::to_value(user)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set_if_absent(&Self::key(&user.account), value).await
    }

    /// Overwrite a user record unconditionally.
    pub async fn put(&self, user: &User) -> Result<(), StorageError> {
        let value = serde_json::to_value(user)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set(&Self::key(&user.account), value).await
    }

    pub async fn delete(&self, account: &str) -> Result<(), StorageError> {
        self.store.delete(&Self::key(account)).await
    }

    /// All users, in account order. Undecodable records are skipped.
    pub async fn list(&self) -> Result<Vec<User>, StorageError> {
        let keys = self.store.keys(USER_PREFIX).await?;
        let mut users = Vec::with_capacity(keys.len());
        for key in keys {
            if let Ok(value) = self.store.get(&key).await {
                if let Ok(user) = serde_json::from_value::<User>(value) {
                    users.push(user);
                }
            }
        }
        Ok(users)
    }
}
