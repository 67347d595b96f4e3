//! Pipeline assembly for the explore endpoint.
//!
//! Stage order is fixed: match → group → project → sort → skip → limit.
//! The builder performs no cross-stage validation; a pipeline that
//! references an undeclared column is accepted here and fails at
//! execution.

use serde_json::{Map, Value, json};

use crate::domain::ExploreRequest;

use super::compiler::rewrite_id_segments;

/// Default page size when the request carries no limit.
pub const DEFAULT_LIMIT: i64 = 10;

/// An ordered, immutable stage list. Consumed exactly once by the
/// executor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPipeline {
    stages: Vec<Value>,
}

impl CompiledPipeline {
    pub fn stages(&self) -> &[Value] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<Value> {
        self.stages
    }
}

/// Flatten a dotted column path into a group-key field name.
fn flatten(path: &str) -> String {
    path.replace('.', "_")
}

/// Assemble the full pipeline from an explore request and an already
/// compiled match predicate (empty object when the request had no
/// filter).
pub fn build_pipeline(request: &ExploreRequest, match_predicate: Value) -> CompiledPipeline {
    let mut stages = Vec::with_capacity(6);

    if match_predicate.as_object().is_some_and(|m| !m.is_empty()) {
        stages.push(json!({"$match": match_predicate}));
    }

    stages.push(json!({"$group": group_stage(request)}));
    stages.push(json!({"$project": project_stage(request)}));
    stages.push(json!({"$sort": sort_stage(request)}));

    // Offset is only honored when a limit was explicitly supplied.
    let skip = if request.limit.is_some() {
        request.offset.unwrap_or(0)
    } else {
        0
    };
    let limit = request.limit.unwrap_or(DEFAULT_LIMIT);

    stages.push(json!({"$skip": skip}));
    stages.push(json!({"$limit": limit}));

    CompiledPipeline { stages }
}

fn group_stage(request: &ExploreRequest) -> Value {
    let mut group_key = Map::new();
    for column in &request.columns {
        group_key.insert(
            flatten(&column.name),
            Value::String(format!("${}", rewrite_id_segments(&column.name))),
        );
    }

    let mut group = Map::new();
    group.insert(
        "_id".to_string(),
        if group_key.is_empty() {
            // No columns: one aggregate group over all matched rows.
            Value::Null
        } else {
            Value::Object(group_key)
        },
    );

    for aggregate in &request.aggregates {
        let accumulator = if aggregate.function.eq_ignore_ascii_case("count") {
            json!({"$sum": 1})
        } else {
            let mut accumulator = Map::new();
            accumulator.insert(
                format!("${}", aggregate.function),
                Value::String(format!("${}", rewrite_id_segments(&aggregate.column))),
            );
            Value::Object(accumulator)
        };
        group.insert(flatten(&aggregate.column), accumulator);
    }

    Value::Object(group)
}

fn project_stage(request: &ExploreRequest) -> Value {
    let mut project = Map::new();
    project.insert("_id".to_string(), json!(0));

    for column in &request.columns {
        project.insert(
            column.effective_alias().to_string(),
            Value::String(format!("$_id.{}", flatten(&column.name))),
        );
    }

    for aggregate in &request.aggregates {
        project.insert(
            aggregate.effective_alias().to_string(),
            Value::String(format!("${}", flatten(&aggregate.column))),
        );
    }

    Value::Object(project)
}

fn sort_stage(request: &ExploreRequest) -> Value {
    let mut sort = Map::new();

    if request.sorts.is_empty() {
        // Default: ascending by each projected column alias in
        // declaration order.
        for column in &request.columns {
            sort.insert(column.effective_alias().to_string(), json!(1));
        }
    } else {
        for spec in &request.sorts {
            let direction = if spec.is_descending() { -1 } else { 1 };
            sort.insert(spec.column.clone(), json!(direction));
        }
    }

    Value::Object(sort)
}
