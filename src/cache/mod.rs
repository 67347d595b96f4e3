//! HTTP-semantics-aware response caching.
//!
//! The gate reconciles request `Cache-Control` directives with a
//! TTL-tracking key-value store: it decides hit/miss/bypass, derives
//! ETag/Age/Expires/Last-Modified on every read, and owns the critical
//! section around cache read-then-write so concurrent identical
//! requests trigger at most one origin query.

pub mod freshness;
pub mod gate;
pub mod keys;
pub(crate) mod lock;
pub mod policy;
pub mod store;

pub use freshness::{Freshness, compute_etag, http_date, last_modified};
pub use gate::{
    CacheOutcome, ConditionalCacheGate, GateError, GateRequest, GateResponse, QueryPlan,
    ResponseShape,
};
pub use keys::CacheKeyDeriver;
pub use policy::{CacheDirective, CachePolicy, DEFAULT_MAX_AGE_SECS};
pub use store::{CacheStore, CacheStoreError, MemoryCacheStore};
