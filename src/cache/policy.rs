//! Request cache policy, parsed from the `Cache-Control` header.
//!
//! The directive is recognized by exact match of the whole header value;
//! the effective max-age is scanned independently from a `max-age=`
//! token. A missing, blank, or unparseable header yields the default
//! policy with a 300 second window.

/// Default freshness window in seconds.
pub const DEFAULT_MAX_AGE_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    /// Serve from cache when present, populate on miss.
    Default,
    /// Revalidate against the origin; the fresh payload is still written
    /// back to the cache store.
    NoCache,
    /// Never read or write the cache store.
    NoStore,
    /// Serve only from cache; 504 when absent.
    OnlyIfCached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub directive: CacheDirective,
    /// Effective freshness window in seconds.
    pub max_age: u64,
}

impl CachePolicy {
    /// Parse the request `Cache-Control` header value.
    pub fn parse(header: Option<&str>) -> Self {
        let header = header.unwrap_or("");
        let directive = match header {
            "no-cache" => CacheDirective::NoCache,
            "no-store" => CacheDirective::NoStore,
            "only-if-cached" => CacheDirective::OnlyIfCached,
            _ => CacheDirective::Default,
        };
        Self {
            directive,
            max_age: effective_max_age(header),
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            directive: CacheDirective::Default,
            max_age: DEFAULT_MAX_AGE_SECS,
        }
    }
}

/// Extract a positive `max-age=` token value; anything else falls back
/// to the default window.
fn effective_max_age(header: &str) -> u64 {
    let Some(index) = header.find("max-age=") else {
        return DEFAULT_MAX_AGE_SECS;
    };
    let token = &header[index + "max-age=".len()..];
    let token = token.split(',').next().unwrap_or("");
    match token.trim().parse::<i64>() {
        Ok(value) if value > 0 => value as u64,
        _ => DEFAULT_MAX_AGE_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_header_is_default_policy() {
        let policy = CachePolicy::parse(None);
        assert_eq!(policy.directive, CacheDirective::Default);
        assert_eq!(policy.max_age, 300);

        let policy = CachePolicy::parse(Some(""));
        assert_eq!(policy.directive, CacheDirective::Default);
    }

    #[test]
    fn recognizes_exact_directives() {
        assert_eq!(
            CachePolicy::parse(Some("no-cache")).directive,
            CacheDirective::NoCache
        );
        assert_eq!(
            CachePolicy::parse(Some("no-store")).directive,
            CacheDirective::NoStore
        );
        assert_eq!(
            CachePolicy::parse(Some("only-if-cached")).directive,
            CacheDirective::OnlyIfCached
        );
    }

    #[test]
    fn max_age_token_is_extracted() {
        assert_eq!(CachePolicy::parse(Some("max-age=60")).max_age, 60);
        assert_eq!(CachePolicy::parse(Some("public, max-age=120")).max_age, 120);
        assert_eq!(CachePolicy::parse(Some("max-age=60, public")).max_age, 60);
    }

    #[test]
    fn non_positive_or_garbled_max_age_falls_back() {
        assert_eq!(CachePolicy::parse(Some("max-age=0")).max_age, 300);
        assert_eq!(CachePolicy::parse(Some("max-age=-5")).max_age, 300);
        assert_eq!(CachePolicy::parse(Some("max-age=soon")).max_age, 300);
    }

    #[test]
    fn compound_directive_is_not_an_exact_match() {
        // Only the bare token selects a special directive; compounds fall
        // back to default while still honoring the max-age token.
        let policy = CachePolicy::parse(Some("no-cache, max-age=60"));
        assert_eq!(policy.directive, CacheDirective::Default);
        assert_eq!(policy.max_age, 60);
    }
}
