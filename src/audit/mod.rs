//! Request audit: per-path, per-method access policy
//!
//! Every data-plane request passes through [`AuditPolicy::decide`] before it
//! reaches a handler. The decision works on the request method, the resource
//! path split into slash segments, and the caller identity recovered from the
//! bearer token (if any).
//!
//! Tiers, first match wins:
//!
//! 1. public table: allowed with or without a token
//! 2. no caller: denied
//! 3. root path: any authenticated caller
//! 4. elevated role (`admin` / `root`): allowed everywhere
//! 5. private table: any authenticated caller
//! 6. custom rules: predicate over the path segments and the caller
//! 7. default deny

pub mod bearer;

use crate::auth::Role;
use axum::http::Method;

/// The identity behind a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub account: String,
    pub role: Role,
}

/// Predicate over the path segments and the caller, for custom rules.
pub type Predicate = Box<dyn Fn(&[&str], &Caller) -> bool + Send + Sync>;

/// Access policy, matched on method and the first path segment.
pub struct AuditPolicy {
    public: Vec<(Method, String)>,
    private: Vec<(Method, String)>,
    rules: Vec<(Method, String, Predicate)>,
}

impl AuditPolicy {
    pub fn new() -> Self {
        Self {
            public: Vec::new(),
            private: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Allow `method` on paths under `head` without a token.
    pub fn public(mut self, method: Method, head: &str) -> Self {
        self.public.push((method, head.to_string()));
        self
    }

    /// Allow `method` on paths under `head` for any authenticated caller.
    pub fn private(mut self, method: Method, head: &str) -> Self {
        self.private.push((method, head.to_string()));
        self
    }

    /// Allow `method` on paths under `head` when `predicate` accepts the
    /// path segments and the caller.
    pub fn rule<F>(mut self, method: Method, head: &str, predicate: F) -> Self
    where
        F: Fn(&[&str], &Caller) -> bool + Send + Sync + 'static,
    {
        self.rules.push((method, head.to_string(), Box::new(predicate)));
        self
    }

    /// Decide whether `method` on `path` is allowed for `caller`.
    pub fn decide(&self, method: &Method, path: &str, caller: Option<&Caller>) -> bool {
        let path = path.trim_start_matches('/');
        let segments: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };
        let head = segments.first().copied().unwrap_or("");

        if self
            .public
            .iter()
            .any(|(m, h)| m == method && h == head)
        {
            return true;
        }

        let Some(caller) = caller else {
            return false;
        };

        // Any authenticated caller can hit the store root.
        if segments.is_empty() {
            return true;
        }

        if caller.role.is_elevated() {
            return true;
        }

        if self
            .private
            .iter()
            .any(|(m, h)| m == method && h == head)
        {
            return true;
        }

        self.rules
            .iter()
            .any(|(m, h, predicate)| m == method && h == head && predicate(&segments, caller))
    }
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// The stock policy the server ships with.
///
/// Read access to the catalog resources is open, mail drop-off is open, and
/// `things` entries are writable only under the caller's own account segment
/// (`things/{box}/{account}/...`).
pub fn default_policy() -> AuditPolicy {
    let owns_thing = |segments: &[&str], caller: &Caller| {
        segments.len() >= 3 && segments[2] == caller.account
    };

    AuditPolicy::new()
        .public(Method::GET, "boxes")
        .public(Method::GET, "things")
        .public(Method::GET, "posts")
        .public(Method::GET, "stocks")
        .public(Method::GET, "market")
        .public(Method::POST, "mails")
        .rule(Method::POST, "things", owns_thing)
        .rule(Method::DELETE, "things", owns_thing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(account: &str) -> Caller {
        Caller {
            account: account.to_string(),
            role: Role::User,
        }
    }

    fn admin() -> Caller {
        Caller {
            account: "admin".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_public_read_without_token() {
        let policy = default_policy();
        assert!(policy.decide(&Method::GET, "/boxes/b1", None));
        assert!(policy.decide(&Method::GET, "/things/b1/u1/i1", None));
        assert!(policy.decide(&Method::POST, "/mails/inbound", None));
    }

    #[test]
    fn test_unauthenticated_write_denied() {
        let policy = default_policy();
        assert!(!policy.decide(&Method::POST, "/boxes/b1", None));
        assert!(!policy.decide(&Method::DELETE, "/things/b1/u1/i1", None));
        assert!(!policy.decide(&Method::GET, "/", None));
    }

    #[test]
    fn test_root_path_any_caller() {
        let policy = default_policy();
        assert!(policy.decide(&Method::GET, "/", Some(&user("u1"))));
    }

    #[test]
    fn test_elevated_allowed_everywhere() {
        let policy = default_policy();
        let caller = admin();
        assert!(policy.decide(&Method::POST, "/boxes/b1", Some(&caller)));
        assert!(policy.decide(&Method::DELETE, "/market/m1", Some(&caller)));
        assert!(policy.decide(&Method::POST, "/things/b1/other/i1", Some(&caller)));
    }

    #[test]
    fn test_ownership_rule() {
        let policy = default_policy();
        let owner = user("u1");
        let stranger = user("u2");

        assert!(policy.decide(&Method::POST, "/things/b1/u1/i1", Some(&owner)));
        assert!(policy.decide(&Method::DELETE, "/things/b1/u1/i1", Some(&owner)));
        assert!(!policy.decide(&Method::POST, "/things/b1/u1/i1", Some(&stranger)));

        // Path too short for the account segment.
        assert!(!policy.decide(&Method::POST, "/things/b1", Some(&owner)));
    }

    #[test]
    fn test_default_deny() {
        let policy = default_policy();
        let caller = user("u1");
        assert!(!policy.decide(&Method::POST, "/boxes/b1", Some(&caller)));
        assert!(!policy.decide(&Method::GET, "/mails/m1", Some(&caller)));
        assert!(!policy.decide(&Method::PUT, "/boxes/b1", Some(&caller)));
    }

    #[test]
    fn test_private_table() {
        let policy = AuditPolicy::new().private(Method::GET, "notes");
        assert!(!policy.decide(&Method::GET, "/notes/n1", None));
        assert!(policy.decide(&Method::GET, "/notes/n1", Some(&user("u1"))));
        assert!(!policy.decide(&Method::POST, "/notes/n1", Some(&user("u1"))));
    }
}
