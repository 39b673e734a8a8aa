//! Authentication: credentials, password hashing and signed tokens
//!
//! - `users`: account records, registration validation, credential storage
//! - `password`: Argon2id hashing and verification
//! - `tokens`: HMAC-signed bearer token issue / verify / refresh

pub mod password;
pub mod tokens;
pub mod users;

pub use password::{hash_password, verify_password, PasswordError};
pub use tokens::{Claims, TokenError, TokenSigner};
pub use users::{
    validate_registration, CredentialStore, Role, User, ValidationError,
};
