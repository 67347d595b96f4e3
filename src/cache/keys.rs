//! Cache key derivation.
//!
//! Two schemes coexist, both namespaced by resource:
//!
//! - list endpoints key on the request signature verbatim
//!   (`ns:METHOD:query:max-age=N`), so parameter order matters;
//! - explore endpoints key on a digest of the canonical request body
//!   plus the effective max-age (`ns:<sha256hex>`), so structurally
//!   identical requests collide regardless of wire formatting.
//!
//! The asymmetry is long-observed behavior; tests assert it rather than
//! unify it.

use axum::http::Method;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct CacheKeyDeriver {
    namespace: String,
}

impl CacheKeyDeriver {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Parameter-string-addressed key for list endpoints.
    pub fn list_key(&self, method: &Method, raw_query: &str, max_age: u64) -> String {
        format!(
            "{}:{}:{}:max-age={}",
            self.namespace, method, raw_query, max_age
        )
    }

    /// Content-addressed key for explore endpoints.
    pub fn content_key(&self, canonical_body: &[u8], max_age: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical_body);
        hasher.update(max_age.to_string().as_bytes());
        format!("{}:{}", self.namespace, hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_key_carries_the_raw_signature() {
        let keys = CacheKeyDeriver::new("exports");
        assert_eq!(
            keys.list_key(&Method::GET, "limit=10&search=rice", 300),
            "exports:GET:limit=10&search=rice:max-age=300"
        );
    }

    #[test]
    fn list_keys_are_parameter_order_sensitive() {
        // Documented inconsistency: semantically identical list requests
        // with reordered parameters derive different keys.
        let keys = CacheKeyDeriver::new("exports");
        let a = keys.list_key(&Method::GET, "limit=10&search=rice", 300);
        let b = keys.list_key(&Method::GET, "search=rice&limit=10", 300);
        assert_ne!(a, b);
    }

    #[test]
    fn content_key_is_deterministic_and_namespaced() {
        let keys = CacheKeyDeriver::new("exports");
        let a = keys.content_key(br#"{"columns":[{"name":"country"}]}"#, 300);
        let b = keys.content_key(br#"{"columns":[{"name":"country"}]}"#, 300);
        assert_eq!(a, b);
        assert!(a.starts_with("exports:"));
    }

    #[test]
    fn content_key_varies_with_max_age_and_body() {
        let keys = CacheKeyDeriver::new("exports");
        let base = keys.content_key(b"{}", 300);
        assert_ne!(base, keys.content_key(b"{}", 60));
        assert_ne!(base, keys.content_key(b"{ }", 300));
    }
}
