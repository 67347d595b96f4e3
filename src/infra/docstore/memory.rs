//! In-memory reference document store.
//!
//! Evaluates the predicate and pipeline subset the query compilers emit
//! over a seeded JSON collection. Operators outside that subset are
//! execution errors — which is also where structurally valid but
//! nonsensical pipelines surface, since the builder defers validation
//! to execution.

use std::cmp::Ordering;
use std::sync::RwLock;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{Map, Value};

use crate::cache::lock::{rw_read, rw_write};

use super::{DocumentStore, FindOptions, StoreError};

const SOURCE: &str = "infra::docstore::memory";

/// A seedable in-memory document collection.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<Vec<Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(documents: Vec<Value>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }

    pub fn insert(&self, document: Value) {
        rw_write(&self.documents, SOURCE, "insert").push(document);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.documents, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn aggregate(&self, pipeline: &[Value]) -> Result<Vec<Value>, StoreError> {
        let mut rows = rw_read(&self.documents, SOURCE, "aggregate").clone();
        for stage in pipeline {
            rows = apply_stage(rows, stage)?;
        }
        Ok(rows)
    }

    async fn find(
        &self,
        predicate: &Value,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let documents = rw_read(&self.documents, SOURCE, "find").clone();
        let mut rows = Vec::new();
        for document in documents {
            if matches(&document, predicate)? {
                rows.push(document);
            }
        }

        if !options.sort.is_empty() {
            sort_rows(&mut rows, &options.sort);
        }

        let skip = options.skip.max(0) as usize;
        let mut rows: Vec<Value> = rows.into_iter().skip(skip).collect();
        if options.limit > 0 {
            rows.truncate(options.limit as usize);
        }
        Ok(rows)
    }
}

// ============================================================================
// Predicate evaluation
// ============================================================================

fn matches(document: &Value, predicate: &Value) -> Result<bool, StoreError> {
    let Some(predicate) = predicate.as_object() else {
        return Err(StoreError::execution("predicate must be an object"));
    };

    for (key, condition) in predicate {
        let matched = match key.as_str() {
            "$and" => combine(document, condition, true)?,
            "$or" => combine(document, condition, false)?,
            _ if key.starts_with('$') => {
                return Err(StoreError::execution(format!(
                    "unsupported predicate operator `{key}`"
                )));
            }
            path => field_matches(lookup(document, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn combine(document: &Value, clauses: &Value, conjunctive: bool) -> Result<bool, StoreError> {
    let Some(clauses) = clauses.as_array() else {
        return Err(StoreError::execution("$and/$or expects an array"));
    };
    for clause in clauses {
        let matched = matches(document, clause)?;
        if conjunctive && !matched {
            return Ok(false);
        }
        if !conjunctive && matched {
            return Ok(true);
        }
    }
    Ok(conjunctive)
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> Result<bool, StoreError> {
    let Some(operators) = operator_document(condition) else {
        // Bare literal: equality.
        return Ok(actual.is_some_and(|value| values_equal(value, condition)));
    };

    let case_insensitive = operators
        .get("$options")
        .and_then(Value::as_str)
        .is_some_and(|options| options.contains('i'));

    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => actual.is_some_and(|value| values_equal(value, operand)),
            "$ne" => !actual.is_some_and(|value| values_equal(value, operand)),
            "$gt" => ordered(actual, operand, |ord| ord == Ordering::Greater),
            "$gte" => ordered(actual, operand, |ord| ord != Ordering::Less),
            "$lt" => ordered(actual, operand, |ord| ord == Ordering::Less),
            "$lte" => ordered(actual, operand, |ord| ord != Ordering::Greater),
            "$exists" => operand.as_bool().unwrap_or(false) == actual.is_some(),
            "$regex" => regex_matches(actual, operand, case_insensitive)?,
            "$options" => continue,
            other => {
                return Err(StoreError::execution(format!(
                    "unsupported comparison operator `{other}`"
                )));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// A condition document counts as an operator document when every key is
/// `$`-prefixed; a plain object literal is an equality operand.
fn operator_document(condition: &Value) -> Option<&Map<String, Value>> {
    let object = condition.as_object()?;
    if !object.is_empty() && object.keys().all(|key| key.starts_with('$')) {
        Some(object)
    } else {
        None
    }
}

fn ordered(actual: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|value| compare_values(value, operand))
        .is_some_and(accept)
}

fn regex_matches(
    actual: Option<&Value>,
    pattern: &Value,
    case_insensitive: bool,
) -> Result<bool, StoreError> {
    let Some(pattern) = pattern.as_str() else {
        return Err(StoreError::execution("$regex expects a string pattern"));
    };
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| StoreError::execution(format!("invalid $regex pattern: {err}")))?;
    Ok(actual
        .and_then(Value::as_str)
        .is_some_and(|value| regex.is_match(value)))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a == b;
    }
    a == b
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return Some(a.cmp(b));
    }
    if let (Some(a), Some(b)) = (a.as_bool(), b.as_bool()) {
        return Some(a.cmp(&b));
    }
    None
}

/// Resolve a dotted path inside a document.
fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

// ============================================================================
// Pipeline stages
// ============================================================================

fn apply_stage(rows: Vec<Value>, stage: &Value) -> Result<Vec<Value>, StoreError> {
    let Some(stage) = stage.as_object() else {
        return Err(StoreError::execution("pipeline stage must be an object"));
    };
    let Some((name, spec)) = stage.iter().next() else {
        return Err(StoreError::execution("empty pipeline stage"));
    };

    match name.as_str() {
        "$match" => {
            let mut kept = Vec::new();
            for row in rows {
                if matches(&row, spec)? {
                    kept.push(row);
                }
            }
            Ok(kept)
        }
        "$group" => group_rows(rows, spec),
        "$project" => rows.into_iter().map(|row| project_row(&row, spec)).collect(),
        "$sort" => {
            let Some(spec) = spec.as_object() else {
                return Err(StoreError::execution("$sort expects an object"));
            };
            let keys: Vec<(String, i64)> = spec
                .iter()
                .map(|(key, dir)| (key.clone(), dir.as_i64().unwrap_or(1)))
                .collect();
            let mut rows = rows;
            sort_rows(&mut rows, &keys);
            Ok(rows)
        }
        "$skip" => {
            let skip = spec.as_i64().unwrap_or(0).max(0) as usize;
            Ok(rows.into_iter().skip(skip).collect())
        }
        "$limit" => {
            let limit = spec.as_i64().unwrap_or(0).max(0) as usize;
            let mut rows = rows;
            rows.truncate(limit);
            Ok(rows)
        }
        other => Err(StoreError::execution(format!(
            "unsupported pipeline stage `{other}`"
        ))),
    }
}

fn group_rows(rows: Vec<Value>, spec: &Value) -> Result<Vec<Value>, StoreError> {
    let Some(spec) = spec.as_object() else {
        return Err(StoreError::execution("$group expects an object"));
    };
    let key_spec = spec
        .get("_id")
        .ok_or_else(|| StoreError::execution("$group requires an _id key"))?;

    // Buckets keep first-seen order so output is deterministic.
    let mut buckets: Vec<(Value, Vec<Value>)> = Vec::new();
    for row in rows {
        let key = resolve_group_key(&row, key_spec)?;
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => buckets.push((key, vec![row])),
        }
    }

    // A null key groups everything, even an empty input, into one row
    // only when at least one row exists; an empty collection aggregates
    // to no rows, matching cursor semantics.
    let mut output = Vec::with_capacity(buckets.len());
    for (key, members) in buckets {
        let mut grouped = Map::new();
        grouped.insert("_id".to_string(), key);
        for (field, accumulator) in spec.iter().filter(|(field, _)| *field != "_id") {
            grouped.insert(field.clone(), accumulate(&members, accumulator)?);
        }
        output.push(Value::Object(grouped));
    }
    Ok(output)
}

fn resolve_group_key(row: &Value, key_spec: &Value) -> Result<Value, StoreError> {
    match key_spec {
        Value::Null => Ok(Value::Null),
        Value::Object(fields) => {
            let mut key = Map::new();
            for (name, reference) in fields {
                key.insert(name.clone(), resolve_reference(row, reference));
            }
            Ok(Value::Object(key))
        }
        other => Ok(resolve_reference(row, other)),
    }
}

fn resolve_reference(row: &Value, reference: &Value) -> Value {
    match reference.as_str() {
        Some(path) if path.starts_with('$') => lookup(row, &path[1..]).cloned().unwrap_or(Value::Null),
        _ => reference.clone(),
    }
}

fn accumulate(members: &[Value], accumulator: &Value) -> Result<Value, StoreError> {
    let Some(accumulator) = accumulator.as_object() else {
        return Err(StoreError::execution("accumulator must be an object"));
    };
    let Some((operator, operand)) = accumulator.iter().next() else {
        return Err(StoreError::execution("empty accumulator"));
    };

    match operator.as_str() {
        "$sum" => {
            let total: f64 = members
                .iter()
                .map(|row| resolve_reference(row, operand).as_f64().unwrap_or(0.0))
                .sum();
            Ok(number(total))
        }
        "$avg" => {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|row| resolve_reference(row, operand).as_f64())
                .collect();
            if values.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(number(values.iter().sum::<f64>() / values.len() as f64))
            }
        }
        "$min" | "$max" => {
            let mut extremum: Option<Value> = None;
            for row in members {
                let value = resolve_reference(row, operand);
                if value.is_null() {
                    continue;
                }
                extremum = Some(match extremum {
                    None => value,
                    Some(current) => {
                        let keep_new = match compare_values(&value, &current) {
                            Some(Ordering::Less) => operator == "$min",
                            Some(Ordering::Greater) => operator == "$max",
                            _ => false,
                        };
                        if keep_new { value } else { current }
                    }
                });
            }
            Ok(extremum.unwrap_or(Value::Null))
        }
        other => Err(StoreError::execution(format!(
            "unsupported accumulator `{other}`"
        ))),
    }
}

fn number(value: f64) -> Value {
    // Render whole results as integers so counts look like counts.
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn project_row(row: &Value, spec: &Value) -> Result<Value, StoreError> {
    let Some(spec) = spec.as_object() else {
        return Err(StoreError::execution("$project expects an object"));
    };

    let mut projected = Map::new();
    for (field, reference) in spec {
        if field == "_id" && reference.as_i64() == Some(0) {
            continue;
        }
        match reference {
            Value::String(path) if path.starts_with('$') => {
                if let Some(value) = lookup(row, &path[1..]) {
                    projected.insert(field.clone(), value.clone());
                }
            }
            Value::Number(flag) if flag.as_i64() == Some(1) => {
                if let Some(value) = lookup(row, field) {
                    projected.insert(field.clone(), value.clone());
                }
            }
            other => {
                return Err(StoreError::execution(format!(
                    "unsupported projection `{field}: {other}`"
                )));
            }
        }
    }
    Ok(Value::Object(projected))
}

fn sort_rows(rows: &mut [Value], keys: &[(String, i64)]) {
    rows.sort_by(|a, b| {
        for (key, direction) in keys {
            let left = lookup(a, key).unwrap_or(&Value::Null);
            let right = lookup(b, key).unwrap_or(&Value::Null);
            let ordering = compare_values(left, right).unwrap_or_else(|| rank(left).cmp(&rank(right)));
            if ordering != Ordering::Equal {
                return if *direction < 0 {
                    ordering.reverse()
                } else {
                    ordering
                };
            }
        }
        Ordering::Equal
    });
}

/// Cross-type ordering rank for sort stability when values are not
/// directly comparable.
fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}
