//! Tether - authenticated gateway over a shared key/value store
//!
//! Clients register accounts, obtain HMAC-signed bearer tokens, and read or
//! write slash-delimited resource paths over HTTP and WebSocket. Every data
//! request passes through a declarative audit policy keyed on method, path
//! and the caller's role.

pub mod audit;
pub mod auth;
pub mod server;
pub mod storage;

pub use audit::{AuditPolicy, Caller};
pub use auth::{Claims, CredentialStore, Role, TokenSigner, User};
pub use server::AppState;
pub use storage::{MemoryStorage, Storage};
