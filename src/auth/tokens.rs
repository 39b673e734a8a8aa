//! Signed bearer tokens
//!
//! Tokens are compact and self-contained: `base64url(claims JSON)` followed
//! by a dot and `base64url(HMAC-SHA256 signature)`. Nothing is stored server
//! side; a token is valid iff the signature checks out against the server
//! secret and the expiry has not passed.

use crate::auth::users::Role;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token decode error: {0}")]
    Decode(String),

    #[error("token expired")]
    Expired,

    #[error("empty token")]
    Empty,

    #[error("token not expired")]
    StillValid,

    #[error("token doesn't match the account")]
    AccountMismatch,
}

/// The facts embedded in a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer account name
    #[serde(rename = "iss")]
    pub issuer: String,
    /// Role at issuance time
    pub role: Role,
    /// Absolute expiry, seconds since epoch
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl Claims {
    /// Expiry comparison is strict: `now >= exp` means expired.
    pub fn is_expired(&self) -> bool {
        unix_now() >= self.expires_at
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Issues and verifies tokens with a symmetric secret and a fixed TTL.
///
/// Pure and stateless: safe to share across request handlers, the secret and
/// TTL are set once at construction.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    /// Mint a new token for `issuer` with `exp = now + TTL`.
    ///
    /// The token is a pure function of issuer, role and the expiry second:
    /// two issuances for the same account within one wall-clock second
    /// produce the same string.
    pub fn issue(&self, issuer: &str, role: Role) -> String {
        let claims = Claims {
            issuer: issuer.to_string(),
            role,
            expires_at: unix_now() + self.ttl.as_secs() as i64,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> String {
        let payload_json = serde_json::to_vec(claims).expect("serialize claims");
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload_json);

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload_b64.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", payload_b64, signature_b64)
    }

    /// Parse and signature-check a token, ignoring expiry.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
        if payload_b64.is_empty() || signature_b64.contains('.') {
            return Err(TokenError::Malformed);
        }

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload_b64.as_bytes());
        let expected = mac.finalize().into_bytes();
        let expected_b64 = URL_SAFE_NO_PAD.encode(expected);

        // Compare without short-circuiting to keep the timing uniform.
        if !constant_time_eq(signature_b64.as_bytes(), expected_b64.as_bytes()) {
            return Err(TokenError::InvalidSignature);
        }

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| TokenError::Decode(e.to_string()))?;

        serde_json::from_slice(&payload_json).map_err(|e| TokenError::Decode(e.to_string()))
    }

    /// Parse, signature-check and expiry-check a token.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.is_expired() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Mint a replacement for an expired token.
    ///
    /// The old token must carry a valid signature, must already be expired
    /// (a live token is never reissued early), and its issuer must match the
    /// claimed account. The new token carries the account's current `role`.
    pub fn refresh(&self, old: &str, account: &str, role: Role) -> Result<String, TokenError> {
        if old.is_empty() {
            return Err(TokenError::Empty);
        }

        let claims = self.decode(old)?;

        if !claims.is_expired() {
            return Err(TokenError::StillValid);
        }

        if claims.issuer != account {
            return Err(TokenError::AccountMismatch);
        }

        Ok(self.issue(account, role))
    }
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &[u8] = b"test-secret-key-for-signing";

    fn signer() -> TokenSigner {
        TokenSigner::new(TEST_SECRET, Duration::from_secs(600))
    }

    /// A signer whose tokens are born expired.
    fn expired_signer() -> TokenSigner {
        TokenSigner::new(TEST_SECRET, Duration::ZERO)
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let token = signer().issue("alice", Role::User);
        let claims = signer().verify(&token).unwrap();

        assert_eq!(claims.issuer, "alice");
        assert_eq!(claims.role, Role::User);
        assert!(claims.expires_at > unix_now());
    }

    #[test]
    fn test_verify_wrong_secret() {
        let token = signer().issue("alice", Role::User);
        let other = TokenSigner::new("wrong-secret", Duration::from_secs(600));

        assert!(matches!(
            other.verify(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_malformed() {
        assert!(matches!(
            signer().verify("not-a-token"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            signer().verify("a.b.c"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(signer().verify(""), Err(TokenError::Malformed)));
    }

    #[test]
    fn test_verify_tampered_payload() {
        let token = signer().issue("alice", Role::User);
        let (_, sig) = token.split_once('.').unwrap();

        let forged_claims = Claims {
            issuer: "alice".to_string(),
            role: Role::Admin,
            expires_at: unix_now() + 600,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());

        let forged = format!("{}.{}", forged_payload, sig);
        assert!(matches!(
            signer().verify(&forged),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        // One unit of time before expiry: accepted.
        let live = Claims {
            issuer: "alice".to_string(),
            role: Role::User,
            expires_at: unix_now() + 1,
        };
        let token = signer().sign(&live);
        assert!(signer().verify(&token).is_ok());

        // now >= exp: rejected.
        let expired = Claims {
            issuer: "alice".to_string(),
            role: Role::User,
            expires_at: unix_now(),
        };
        let token = signer().sign(&expired);
        assert!(matches!(signer().verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_signing_is_deterministic() {
        // No nonce in the claims: identical claims sign to identical strings,
        // so distinct tokens require distinct expiry seconds.
        let claims = Claims {
            issuer: "alice".to_string(),
            role: Role::User,
            expires_at: unix_now() + 600,
        };
        assert_eq!(signer().sign(&claims), signer().sign(&claims));

        let later = Claims {
            expires_at: claims.expires_at + 1,
            ..claims.clone()
        };
        assert_ne!(signer().sign(&claims), signer().sign(&later));
    }

    #[test]
    fn test_refresh_empty() {
        assert!(matches!(
            signer().refresh("", "alice", Role::User),
            Err(TokenError::Empty)
        ));
    }

    #[test]
    fn test_refresh_live_token_rejected() {
        let token = signer().issue("alice", Role::User);
        assert!(matches!(
            signer().refresh(&token, "alice", Role::User),
            Err(TokenError::StillValid)
        ));
    }

    #[test]
    fn test_refresh_account_mismatch() {
        let old = expired_signer().issue("alice", Role::User);
        assert!(matches!(
            signer().refresh(&old, "bob", Role::User),
            Err(TokenError::AccountMismatch)
        ));
    }

    #[test]
    fn test_refresh_expired_token() {
        let old = expired_signer().issue("alice", Role::User);
        let fresh = signer().refresh(&old, "alice", Role::Admin).unwrap();

        assert_ne!(old, fresh);
        let claims = signer().verify(&fresh).unwrap();
        assert_eq!(claims.issuer, "alice");
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_refresh_bad_signature() {
        let old = TokenSigner::new("wrong-secret", Duration::ZERO).issue("alice", Role::User);
        assert!(matches!(
            signer().refresh(&old, "alice", Role::User),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_signer_debug_redacts_secret() {
        let debug = format!("{:?}", signer());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("test-secret"));
    }
}
