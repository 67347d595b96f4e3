//! Gate state-machine tests over scripted collaborator fakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use serde_json::{Value, json};

use vetrina::cache::{
    CacheOutcome, CachePolicy, CacheStore, CacheStoreError, ConditionalCacheGate, GateError,
    GateRequest, MemoryCacheStore, QueryPlan, ResponseShape,
};
use vetrina::infra::docstore::{DocumentStore, FindOptions, StoreError};
use vetrina::query::AggregationExecutor;

/// Scripted document store that counts origin executions.
struct CountingStore {
    rows: Vec<Value>,
    calls: AtomicUsize,
}

impl CountingStore {
    fn new(rows: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn aggregate(&self, _pipeline: &[Value]) -> Result<Vec<Value>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }

    async fn find(
        &self,
        _predicate: &Value,
        _options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}

/// Cache store whose writes always fail.
struct WriteFailingCache;

#[async_trait]
impl CacheStore for WriteFailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheStoreError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: Bytes,
        _ttl: Duration,
    ) -> Result<(), CacheStoreError> {
        Err(CacheStoreError::Unavailable("write refused".to_string()))
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, CacheStoreError> {
        Ok(None)
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>, CacheStoreError> {
        Ok(Vec::new())
    }
}

fn sample_rows() -> Vec<Value> {
    vec![
        json!({"country": "Thailand", "valueUSD": 120, "updatedAt": "2023-02-11T09:30:00Z"}),
        json!({"country": "Laos", "valueUSD": 50, "updatedAt": "2023-03-06T12:00:00Z"}),
    ]
}

fn build_gate(
    documents: Arc<CountingStore>,
    cache: Arc<dyn CacheStore>,
) -> Arc<ConditionalCacheGate> {
    let executor = AggregationExecutor::new(documents, Duration::from_secs(10));
    Arc::new(ConditionalCacheGate::new(cache, executor))
}

fn request(key: &str, cache_control: Option<&str>) -> GateRequest {
    GateRequest {
        key: key.to_string(),
        policy: CachePolicy::parse(cache_control),
        if_none_match: None,
        if_modified_since: None,
        shape: ResponseShape::Rows,
        emit_validators: true,
    }
}

fn find_plan() -> QueryPlan {
    QueryPlan::Find {
        predicate: json!({}),
        options: FindOptions::default(),
    }
}

fn header<'a>(response: &'a vetrina::cache::GateResponse, name: &str) -> Option<&'a str> {
    response
        .headers
        .iter()
        .find(|(header, _)| *header == name)
        .map(|(_, value)| value.as_str())
}

#[tokio::test]
async fn only_if_cached_without_entry_is_gateway_timeout() {
    let documents = CountingStore::new(sample_rows());
    let gate = build_gate(documents.clone(), Arc::new(MemoryCacheStore::new()));

    let response = gate
        .handle(request("exports:fresh", Some("only-if-cached")), find_plan())
        .await
        .expect("gate response");

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.cache_status, CacheOutcome::Miss);
    assert_eq!(header(&response, "Cache-Control"), Some("no-store"));
    assert_eq!(header(&response, "Connection"), Some("close"));
    // The document store is never consulted.
    assert_eq!(documents.calls(), 0);
}

#[tokio::test]
async fn default_miss_populates_then_hits() {
    let documents = CountingStore::new(sample_rows());
    let cache = Arc::new(MemoryCacheStore::new());
    let gate = build_gate(documents.clone(), cache.clone());

    let miss = gate
        .handle(request("exports:list", None), find_plan())
        .await
        .expect("miss response");
    assert_eq!(miss.status, StatusCode::OK);
    assert_eq!(miss.cache_status, CacheOutcome::Miss);
    assert!(header(&miss, "Etag").is_some());
    assert!(header(&miss, "Expires").is_some());
    assert_eq!(
        header(&miss, "Last-Modified"),
        Some("Mon, 06 Mar 2023 12:00:00 GMT")
    );
    assert_eq!(
        header(&miss, "Cache-Control"),
        Some("public, max-age=300")
    );

    let hit = gate
        .handle(request("exports:list", None), find_plan())
        .await
        .expect("hit response");
    assert_eq!(hit.status, StatusCode::OK);
    assert_eq!(hit.cache_status, CacheOutcome::Hit);
    assert_eq!(hit.body, miss.body);
    assert_eq!(header(&hit, "Etag"), header(&miss, "Etag"));
    let age: i64 = header(&hit, "Age").expect("age header").parse().expect("age");
    assert!(age >= 0);

    assert_eq!(documents.calls(), 1);
}

#[tokio::test]
async fn no_store_never_reads_or_writes_the_cache() {
    let documents = CountingStore::new(sample_rows());
    let cache = Arc::new(MemoryCacheStore::new());
    let gate = build_gate(documents.clone(), cache.clone());

    for _ in 0..2 {
        let response = gate
            .handle(request("exports:list", Some("no-store")), find_plan())
            .await
            .expect("gate response");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.cache_status, CacheOutcome::Miss);
        assert_eq!(header(&response, "Cache-Control"), Some("no-store"));
        // List endpoints still emit freshly computed validators.
        assert!(header(&response, "Etag").is_some());
        assert!(header(&response, "Last-Modified").is_some());
    }

    // Both requests hit the origin; nothing was ever written.
    assert_eq!(documents.calls(), 2);
    assert!(cache.keys("*").await.expect("keys").is_empty());
}

#[tokio::test]
async fn no_cache_executes_fresh_but_writes_back() {
    let documents = CountingStore::new(sample_rows());
    let cache = Arc::new(MemoryCacheStore::new());
    let gate = build_gate(documents.clone(), cache.clone());

    let first = gate
        .handle(request("exports:list", Some("no-cache")), find_plan())
        .await
        .expect("gate response");
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.cache_status, CacheOutcome::Miss);
    assert_eq!(header(&first, "Cache-Control"), Some("no-cache"));
    let etag = header(&first, "Etag").expect("etag").to_string();

    // The fresh payload was persisted with the effective TTL.
    assert_eq!(cache.keys("exports:*").await.expect("keys").len(), 1);
    let remaining = cache
        .ttl("exports:list")
        .await
        .expect("ttl")
        .expect("live entry");
    assert!(remaining.as_secs() > 290);

    // Revalidation with a matching ETag short-circuits to 304, still a
    // miss because the origin ran.
    let mut revalidate = request("exports:list", Some("no-cache"));
    revalidate.if_none_match = Some(etag);
    let second = gate.handle(revalidate, find_plan()).await.expect("gate response");
    assert_eq!(second.status, StatusCode::NOT_MODIFIED);
    assert_eq!(second.cache_status, CacheOutcome::Miss);
    assert!(second.body.is_none());

    assert_eq!(documents.calls(), 2);
}

#[tokio::test]
async fn conditional_headers_yield_304_on_hit() {
    let documents = CountingStore::new(sample_rows());
    let gate = build_gate(documents.clone(), Arc::new(MemoryCacheStore::new()));

    let miss = gate
        .handle(request("exports:list", None), find_plan())
        .await
        .expect("miss response");
    let etag = header(&miss, "Etag").expect("etag").to_string();
    let last_modified = header(&miss, "Last-Modified").expect("last-modified").to_string();

    let mut conditional = request("exports:list", None);
    conditional.if_none_match = Some(etag);
    let not_modified = gate
        .handle(conditional, find_plan())
        .await
        .expect("304 response");
    assert_eq!(not_modified.status, StatusCode::NOT_MODIFIED);
    assert_eq!(not_modified.cache_status, CacheOutcome::Hit);
    assert!(not_modified.body.is_none());

    let mut conditional = request("exports:list", None);
    conditional.if_modified_since = Some(last_modified);
    let not_modified = gate
        .handle(conditional, find_plan())
        .await
        .expect("304 response");
    assert_eq!(not_modified.status, StatusCode::NOT_MODIFIED);
    assert_eq!(not_modified.cache_status, CacheOutcome::Hit);

    assert_eq!(documents.calls(), 1);
}

#[tokio::test]
async fn concurrent_identical_requests_execute_the_origin_once() {
    let documents = CountingStore::new(sample_rows());
    let gate = build_gate(documents.clone(), Arc::new(MemoryCacheStore::new()));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let gate = gate.clone();
        tasks.push(tokio::spawn(async move {
            gate.handle(request("exports:list", None), find_plan()).await
        }));
    }

    let mut outcomes = Vec::new();
    for task in tasks {
        let response = task.await.expect("join").expect("gate response");
        assert_eq!(response.status, StatusCode::OK);
        outcomes.push(response.cache_status);
    }

    // The critical section lets exactly one request through to the
    // origin; the rest are hits on the freshly written entry.
    assert_eq!(documents.calls(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| **outcome == CacheOutcome::Miss)
            .count(),
        1
    );
}

#[tokio::test]
async fn corrupt_cache_entry_surfaces_as_decode_error() {
    let documents = CountingStore::new(sample_rows());
    let cache = Arc::new(MemoryCacheStore::new());
    let gate = build_gate(documents.clone(), cache.clone());

    cache
        .set(
            "exports:list",
            Bytes::from_static(b"{not json"),
            Duration::from_secs(300),
        )
        .await
        .expect("seed corrupt entry");

    let err = gate
        .handle(request("exports:list", None), find_plan())
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::CacheDecode(_)));

    let err = gate
        .handle(request("exports:list", Some("only-if-cached")), find_plan())
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::CacheDecode(_)));

    assert_eq!(documents.calls(), 0);
}

#[tokio::test]
async fn failed_cache_write_does_not_abort_the_response() {
    let documents = CountingStore::new(sample_rows());
    let gate = build_gate(documents.clone(), Arc::new(WriteFailingCache));

    let response = gate
        .handle(request("exports:list", None), find_plan())
        .await
        .expect("gate response");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.cache_status, CacheOutcome::Miss);
    assert!(response.body.is_some());

    // Next request misses again (nothing was stored) but still succeeds.
    let response = gate
        .handle(request("exports:list", None), find_plan())
        .await
        .expect("gate response");
    assert_eq!(response.cache_status, CacheOutcome::Miss);
    assert_eq!(documents.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn age_reflects_time_spent_in_the_cache() {
    let documents = CountingStore::new(sample_rows());
    let gate = build_gate(documents.clone(), Arc::new(MemoryCacheStore::new()));

    gate.handle(request("exports:list", None), find_plan())
        .await
        .expect("populate");

    tokio::time::advance(Duration::from_secs(60)).await;

    let hit = gate
        .handle(request("exports:list", None), find_plan())
        .await
        .expect("hit response");
    assert_eq!(hit.cache_status, CacheOutcome::Hit);
    let age: i64 = header(&hit, "Age").expect("age header").parse().expect("age");
    assert_eq!(age, 60);
}

#[tokio::test]
async fn empty_result_sets_fall_back_to_the_zero_last_modified() {
    let documents = CountingStore::new(Vec::new());
    let gate = build_gate(documents.clone(), Arc::new(MemoryCacheStore::new()));

    let response = gate
        .handle(request("exports:list", None), find_plan())
        .await
        .expect("gate response");
    assert_eq!(
        header(&response, "Last-Modified"),
        Some("Thu, 01 Jan 1970 00:00:00 GMT")
    );
}
