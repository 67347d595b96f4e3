//! The conditional caching gate.
//!
//! One request flows RECEIVED → {ONLY_IF_CACHED, NO_STORE, NO_CACHE,
//! DEFAULT} → RESPONDED. The terminal state is always a fully written
//! response: origin failures surface as errors for the handler to map,
//! cache-store failures on best-effort paths are logged and degrade to
//! a miss.
//!
//! The whole "check cache → (miss) execute → write cache" sequence runs
//! under a single per-gate critical section, so no two requests can both
//! observe a miss for the same key and race to execute-then-write. The
//! gate never deletes entries; the store's TTL is authoritative.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use metrics::counter;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::infra::docstore::{FindOptions, StoreError};
use crate::query::{AggregationExecutor, CompiledPipeline};

use super::freshness::{Freshness, compute_etag, http_date, last_modified};
use super::policy::{CacheDirective, CachePolicy};
use super::store::CacheStore;

/// Value of the `X-Cache-Status` diagnostic header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "Hit",
            CacheOutcome::Miss => "Miss",
        }
    }
}

/// How rows serialize into (and decode out of) the cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Bare JSON array — list endpoints.
    Rows,
    /// `{"results": [...]}` — explore endpoints.
    Envelope,
}

impl ResponseShape {
    fn encode(self, rows: &[Value]) -> Bytes {
        let body = match self {
            ResponseShape::Rows => json!(rows),
            ResponseShape::Envelope => json!({"results": rows}),
        };
        Bytes::from(serde_json::to_vec(&body).unwrap_or_default())
    }

    fn decode(self, payload: &[u8]) -> Result<Vec<Value>, GateError> {
        let parsed: Value = serde_json::from_slice(payload)
            .map_err(|err| GateError::CacheDecode(err.to_string()))?;
        let rows = match self {
            ResponseShape::Rows => parsed.as_array().cloned(),
            ResponseShape::Envelope => parsed
                .get("results")
                .and_then(Value::as_array)
                .cloned(),
        };
        rows.ok_or_else(|| GateError::CacheDecode("unexpected payload shape".to_string()))
    }
}

/// Per-request inputs to the gate.
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub key: String,
    pub policy: CachePolicy,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub shape: ResponseShape,
    /// List endpoints emit freshly computed validators on the bypass
    /// paths too; explore endpoints only carry an ETag on `no-cache`.
    pub emit_validators: bool,
}

/// The origin query the gate runs on a miss. Consumed at most once.
pub enum QueryPlan {
    Aggregate(CompiledPipeline),
    Find {
        predicate: Value,
        options: FindOptions,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Corrupt payload read back from the cache store.
    #[error("cached payload could not be decoded: {0}")]
    CacheDecode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A fully decided response: status, freshness headers, optional body.
#[derive(Debug)]
pub struct GateResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub cache_status: CacheOutcome,
    pub body: Option<Bytes>,
}

impl IntoResponse for GateResponse {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            Some(body) => Response::new(Body::from(body)),
            None => Response::new(Body::empty()),
        };
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(self.cache_status.as_str()) {
            headers.insert(HeaderName::from_static("x-cache-status"), value);
        }
        response
    }
}

pub struct ConditionalCacheGate {
    cache: Arc<dyn CacheStore>,
    executor: AggregationExecutor,
    /// The single critical section serializing every cache-bearing
    /// request through this gate, hits and misses alike.
    critical: Mutex<()>,
}

impl ConditionalCacheGate {
    pub fn new(cache: Arc<dyn CacheStore>, executor: AggregationExecutor) -> Self {
        Self {
            cache,
            executor,
            critical: Mutex::new(()),
        }
    }

    /// Decide and build the response for one request.
    #[instrument(skip_all, fields(key = %request.key))]
    pub async fn handle(
        &self,
        request: GateRequest,
        plan: QueryPlan,
    ) -> Result<GateResponse, GateError> {
        let _serialized = self.critical.lock().await;

        match request.policy.directive {
            CacheDirective::OnlyIfCached => self.only_if_cached(&request).await,
            CacheDirective::NoStore => self.no_store(&request, plan).await,
            CacheDirective::NoCache => self.no_cache(&request, plan).await,
            CacheDirective::Default => self.default_flow(&request, plan).await,
        }
    }

    async fn only_if_cached(&self, request: &GateRequest) -> Result<GateResponse, GateError> {
        match self.read_entry(&request.key).await {
            Some(payload) => self.serve_cached(request, payload).await,
            None => {
                counter!("vetrina_cache_miss_total").increment(1);
                Ok(GateResponse {
                    status: StatusCode::GATEWAY_TIMEOUT,
                    headers: vec![
                        ("Cache-Control", "no-store".to_string()),
                        ("Connection", "close".to_string()),
                    ],
                    cache_status: CacheOutcome::Miss,
                    body: Some(Bytes::from(
                        serde_json::to_vec(&json!({
                            "message": "The resource is not in the cache, and the server could not retrieve it",
                        }))
                        .unwrap_or_default(),
                    )),
                })
            }
        }
    }

    async fn no_store(
        &self,
        request: &GateRequest,
        plan: QueryPlan,
    ) -> Result<GateResponse, GateError> {
        let rows = self.run_origin(plan).await?;
        let payload = request.shape.encode(&rows);

        let mut headers = vec![("Cache-Control", "no-store".to_string())];
        if request.emit_validators {
            headers.push(("Etag", compute_etag(&payload)));
            headers.push(("Last-Modified", http_date(last_modified(&rows))));
        }

        counter!("vetrina_cache_miss_total").increment(1);
        Ok(GateResponse {
            status: StatusCode::OK,
            headers,
            cache_status: CacheOutcome::Miss,
            body: Some(payload),
        })
    }

    async fn no_cache(
        &self,
        request: &GateRequest,
        plan: QueryPlan,
    ) -> Result<GateResponse, GateError> {
        let rows = self.run_origin(plan).await?;
        let payload = request.shape.encode(&rows);

        // Forced revalidation still refreshes the cache entry.
        self.write_entry(&request.key, &payload, request.policy.max_age)
            .await;

        let etag = compute_etag(&payload);
        let mut headers = vec![
            ("Cache-Control", "no-cache".to_string()),
            ("Etag", etag.clone()),
        ];
        if request.emit_validators {
            headers.push(("Last-Modified", http_date(last_modified(&rows))));
        }

        counter!("vetrina_cache_miss_total").increment(1);
        let revalidated = request.if_none_match.as_deref() == Some(etag.as_str());
        Ok(GateResponse {
            status: if revalidated {
                StatusCode::NOT_MODIFIED
            } else {
                StatusCode::OK
            },
            headers,
            cache_status: CacheOutcome::Miss,
            body: (!revalidated).then_some(payload),
        })
    }

    async fn default_flow(
        &self,
        request: &GateRequest,
        plan: QueryPlan,
    ) -> Result<GateResponse, GateError> {
        if let Some(payload) = self.read_entry(&request.key).await {
            return self.serve_cached(request, payload).await;
        }

        let rows = self.run_origin(plan).await?;
        let payload = request.shape.encode(&rows);

        self.write_entry(&request.key, &payload, request.policy.max_age)
            .await;

        let freshness = Freshness::for_fresh(&payload, &rows, request.policy.max_age);
        counter!("vetrina_cache_miss_total").increment(1);
        Ok(GateResponse {
            status: StatusCode::OK,
            headers: vec![
                ("Cache-Control", freshness.cache_control_header()),
                ("Etag", freshness.etag.clone()),
                ("Expires", freshness.expires_header()),
                ("Last-Modified", freshness.last_modified_header()),
            ],
            cache_status: CacheOutcome::Miss,
            body: Some(payload),
        })
    }

    /// Serve a payload read back from the cache store, honoring the
    /// conditional request headers.
    async fn serve_cached(
        &self,
        request: &GateRequest,
        payload: Bytes,
    ) -> Result<GateResponse, GateError> {
        let rows = request.shape.decode(&payload)?;

        let remaining = match self.cache.ttl(&request.key).await {
            Ok(remaining) => remaining.unwrap_or(Duration::ZERO),
            Err(err) => {
                warn!(error = %err, key = %request.key, "cache ttl lookup failed");
                Duration::ZERO
            }
        };

        let freshness = Freshness::for_cached(
            &payload,
            &rows,
            request.policy.max_age,
            time::Duration::seconds(remaining.as_secs() as i64),
        );

        let headers = vec![
            ("Age", freshness.age.to_string()),
            ("Cache-Control", freshness.cache_control_header()),
            ("Etag", freshness.etag.clone()),
            ("Expires", freshness.expires_header()),
            ("Last-Modified", freshness.last_modified_header()),
        ];

        let etag_matched = request.if_none_match.as_deref() == Some(freshness.etag.as_str());
        let date_matched = request.if_modified_since.as_deref()
            == Some(freshness.last_modified_header().as_str());

        counter!("vetrina_cache_hit_total").increment(1);
        debug!(key = %request.key, age = freshness.age, "serving cached payload");

        if etag_matched || date_matched {
            return Ok(GateResponse {
                status: StatusCode::NOT_MODIFIED,
                headers,
                cache_status: CacheOutcome::Hit,
                body: None,
            });
        }

        Ok(GateResponse {
            status: StatusCode::OK,
            headers,
            cache_status: CacheOutcome::Hit,
            body: Some(payload),
        })
    }

    async fn run_origin(&self, plan: QueryPlan) -> Result<Vec<Value>, GateError> {
        counter!("vetrina_origin_query_total").increment(1);
        let rows = match plan {
            QueryPlan::Aggregate(pipeline) => self.executor.execute(pipeline).await?,
            QueryPlan::Find { predicate, options } => {
                self.executor.find(&predicate, &options).await?
            }
        };
        Ok(rows)
    }

    /// A store read failure is logged and treated as a miss.
    async fn read_entry(&self, key: &str) -> Option<Bytes> {
        match self.cache.get(key).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, key, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Cache writes are best-effort; the response proceeds either way.
    async fn write_entry(&self, key: &str, payload: &Bytes, max_age: u64) {
        let ttl = Duration::from_secs(max_age);
        if let Err(err) = self.cache.set(key, payload.clone(), ttl).await {
            counter!("vetrina_cache_write_fail_total").increment(1);
            warn!(error = %err, key, "cache write failed, serving response anyway");
        }
    }
}
