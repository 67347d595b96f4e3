use axum::Json;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, Method, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use crate::cache::{CachePolicy, GateError, GateRequest, QueryPlan, ResponseShape};
use crate::domain::ExploreRequest;
use crate::infra::docstore::FindOptions;
use crate::query::{build_pipeline, compile_filter, compile_flat, flat::search_clauses};

use super::error::ApiError;
use super::models::{ListParams, RESERVED_PARAMS};
use super::state::AppState;

/// Fields the free-text `search` parameter matches against.
const SEARCH_FIELDS: &[&str] = &["productName", "category"];

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// `POST /api/v1/exports/explore` — recursive filter mode, grouped
/// aggregation, content-addressed cache key.
pub async fn explore_exports(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ExploreRequest>,
) -> Result<Response, ApiError> {
    // The canonical re-serialization feeds the content-addressed key, so
    // wire-level formatting differences do not fragment the cache.
    let canonical = serde_json::to_vec(&body).map_err(|err| {
        ApiError::bad_request("Request body could not be processed", Some(err.to_string()))
    })?;

    let predicate = match &body.filter {
        Some(filter) => {
            compile_filter(filter).map_err(|err| ApiError::invalid_filter(err.to_string()))?
        }
        None => Value::Object(Map::new()),
    };
    let pipeline = build_pipeline(&body, predicate);

    let policy = CachePolicy::parse(header_str(&headers, &header::CACHE_CONTROL));
    let key = state.keys.content_key(&canonical, policy.max_age);

    let request = GateRequest {
        key,
        policy,
        if_none_match: header_string(&headers, &header::IF_NONE_MATCH),
        if_modified_since: header_string(&headers, &header::IF_MODIFIED_SINCE),
        shape: ResponseShape::Envelope,
        emit_validators: false,
    };

    let response = state
        .gate
        .handle(request, QueryPlan::Aggregate(pipeline))
        .await
        .map_err(explore_gate_error)?;
    Ok(response.into_response())
}

/// `GET /api/v1/exports` — flat filter mode over query parameters,
/// parameter-string-addressed cache key.
pub async fn list_exports(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, ApiError> {
    let raw_query = raw_query.unwrap_or_default();
    let params = ListParams::parse(&raw_query)
        .map_err(|err| ApiError::bad_request("Invalid paging parameter", Some(err.to_string())))?;

    // Soft-deleted rows never surface.
    let mut predicate = Map::new();
    predicate.insert("deleted_at".to_string(), json!({"$exists": false}));

    let clauses = compile_flat(&params.pairs, RESERVED_PARAMS);
    if !clauses.is_empty() {
        predicate.insert("$and".to_string(), Value::Array(clauses));
    }

    if let Some(search) = &params.search {
        predicate.insert(
            "$or".to_string(),
            Value::Array(search_clauses(search, SEARCH_FIELDS)),
        );
    }

    let options = FindOptions {
        sort: params.sorts.clone(),
        skip: params.offset,
        limit: params.limit,
    };

    let policy = CachePolicy::parse(header_str(&headers, &header::CACHE_CONTROL));
    let key = state.keys.list_key(&Method::GET, &raw_query, policy.max_age);

    let request = GateRequest {
        key,
        policy,
        if_none_match: header_string(&headers, &header::IF_NONE_MATCH),
        if_modified_since: header_string(&headers, &header::IF_MODIFIED_SINCE),
        shape: ResponseShape::Rows,
        emit_validators: true,
    };

    let response = state
        .gate
        .handle(
            request,
            QueryPlan::Find {
                predicate: Value::Object(predicate),
                options,
            },
        )
        .await
        .map_err(list_gate_error)?;
    Ok(response.into_response())
}

fn explore_gate_error(err: GateError) -> ApiError {
    match err {
        GateError::CacheDecode(reason) => ApiError::cache_decode(reason),
        GateError::Store(err) => ApiError::explore_failed(err.to_string()),
    }
}

fn list_gate_error(err: GateError) -> ApiError {
    match err {
        GateError::CacheDecode(reason) => ApiError::cache_decode(reason),
        GateError::Store(err) => ApiError::list_failed(err.to_string()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn header_string(headers: &HeaderMap, name: &header::HeaderName) -> Option<String> {
    header_str(headers, name).map(str::to_string)
}
