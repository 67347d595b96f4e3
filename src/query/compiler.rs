//! Recursive filter compilation.
//!
//! The wire filter (`domain::FilterSpec`, an untyped `{op, args}` tree)
//! is parsed exactly once into a typed [`FilterNode`] AST — unknown
//! shapes are rejected at parse time, not midway through compilation —
//! and then lowered into the predicate document the document store
//! consumes.

use serde_json::{Map, Value};

use crate::domain::FilterSpec;

use super::coerce::coerce_literal;
use super::error::FilterError;

/// Logical connectives. At least one child each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn keyword(self) -> &'static str {
        match self {
            LogicalOp::And => "$and",
            LogicalOp::Or => "$or",
        }
    }
}

/// Comparison operators. Always leaves, always binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn keyword(self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Gt => "$gt",
            CompareOp::Gte => "$gte",
            CompareOp::Lt => "$lt",
            CompareOp::Lte => "$lte",
        }
    }
}

/// Typed filter AST. Comparison nodes hold the property reference and
/// the still-uncoerced literal; coercion happens at compile time so the
/// error can name the property.
#[derive(Debug, Clone)]
pub enum FilterNode {
    Logical {
        op: LogicalOp,
        children: Vec<FilterNode>,
    },
    Compare {
        op: CompareOp,
        property: String,
        literal: Value,
    },
}

impl FilterNode {
    /// Parse the untyped wire tree into the AST.
    pub fn parse(spec: &FilterSpec) -> Result<Self, FilterError> {
        let operator = spec.op.to_lowercase();

        if let Some(op) = parse_logical(&operator) {
            if spec.args.is_empty() {
                return Err(FilterError::InvalidArguments(
                    "logical operator needs at least one argument object",
                ));
            }
            let children = spec
                .args
                .iter()
                .map(|arg| {
                    let child: FilterSpec = serde_json::from_value(arg.clone())
                        .map_err(|err| FilterError::InvalidFilterArgument(err.to_string()))?;
                    FilterNode::parse(&child)
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(FilterNode::Logical { op, children });
        }

        if let Some(op) = parse_compare(&operator) {
            if spec.args.len() != 2 {
                return Err(FilterError::InvalidArguments(
                    "comparison operator needs exactly two arguments",
                ));
            }
            let property = spec.args[0]
                .as_object()
                .and_then(|obj| obj.get("property"))
                .and_then(Value::as_str)
                .ok_or(FilterError::InvalidArguments(
                    "first argument must be an object with a `property` string",
                ))?;
            return Ok(FilterNode::Compare {
                op,
                property: property.to_string(),
                literal: spec.args[1].clone(),
            });
        }

        Err(FilterError::UnsupportedOperator(operator))
    }

    /// Lower the AST into a predicate document.
    pub fn compile(&self) -> Result<Value, FilterError> {
        match self {
            FilterNode::Logical { op, children } => {
                let compiled = children
                    .iter()
                    .map(FilterNode::compile)
                    .collect::<Result<Vec<_>, _>>()?;
                let mut predicate = Map::new();
                predicate.insert(op.keyword().to_string(), Value::Array(compiled));
                Ok(Value::Object(predicate))
            }
            FilterNode::Compare {
                op,
                property,
                literal,
            } => {
                let coerced = coerce_literal(property, literal)?;
                let mut clause = Map::new();
                clause.insert(op.keyword().to_string(), coerced);
                let mut predicate = Map::new();
                predicate.insert(rewrite_id_segments(property), Value::Object(clause));
                Ok(Value::Object(predicate))
            }
        }
    }
}

fn parse_logical(operator: &str) -> Option<LogicalOp> {
    match operator {
        "and" => Some(LogicalOp::And),
        "or" => Some(LogicalOp::Or),
        _ => None,
    }
}

fn parse_compare(operator: &str) -> Option<CompareOp> {
    match operator {
        "=" => Some(CompareOp::Eq),
        "!=" | "<>" => Some(CompareOp::Ne),
        ">" => Some(CompareOp::Gt),
        ">=" => Some(CompareOp::Gte),
        "<" => Some(CompareOp::Lt),
        "<=" => Some(CompareOp::Lte),
        _ => None,
    }
}

/// Rewrite dotted-path segments literally equal to `id` to the store's
/// internal identifier field, at every nesting level.
pub fn rewrite_id_segments(path: &str) -> String {
    path.split('.')
        .map(|segment| if segment == "id" { "_id" } else { segment })
        .collect::<Vec<_>>()
        .join(".")
}

/// Parse and compile a wire filter in one step.
pub fn compile_filter(spec: &FilterSpec) -> Result<Value, FilterError> {
    FilterNode::parse(spec)?.compile()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec(value: Value) -> FilterSpec {
        serde_json::from_value(value).expect("filter spec")
    }

    #[test]
    fn compiles_simple_equality() {
        let predicate = compile_filter(&spec(json!({
            "op": "=",
            "args": [{"property": "country"}, "Thailand"],
        })))
        .expect("compile");
        assert_eq!(predicate, json!({"country": {"$eq": "Thailand"}}));
    }

    #[test]
    fn compiles_conjunction_of_range_clauses() {
        let predicate = compile_filter(&spec(json!({
            "op": "and",
            "args": [
                {"op": ">", "args": [{"property": "year"}, "2020"]},
                {"op": "<", "args": [{"property": "year"}, "2023"]},
            ],
        })))
        .expect("compile");
        assert_eq!(
            predicate,
            json!({"$and": [
                {"year": {"$gt": "2020"}},
                {"year": {"$lt": "2023"}},
            ]})
        );
    }

    #[test]
    fn logical_node_keeps_child_count() {
        let predicate = compile_filter(&spec(json!({
            "op": "OR",
            "args": [
                {"op": "=", "args": [{"property": "country"}, "Thailand"]},
                {"op": "=", "args": [{"property": "country"}, "Laos"]},
                {"op": "=", "args": [{"property": "country"}, "Vietnam"]},
            ],
        })))
        .expect("compile");
        let children = predicate["$or"].as_array().expect("or array");
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn angle_bracket_alias_maps_to_ne() {
        let predicate = compile_filter(&spec(json!({
            "op": "<>",
            "args": [{"property": "category"}, "fruit"],
        })))
        .expect("compile");
        assert_eq!(predicate, json!({"category": {"$ne": "fruit"}}));
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = compile_filter(&spec(json!({
            "op": "like",
            "args": [{"property": "country"}, "Thai*"],
        })))
        .unwrap_err();
        assert_eq!(err, FilterError::UnsupportedOperator("like".to_string()));
    }

    #[test]
    fn rejects_logical_node_without_children() {
        let err = compile_filter(&spec(json!({"op": "and", "args": []}))).unwrap_err();
        assert!(matches!(err, FilterError::InvalidArguments(_)));
    }

    #[test]
    fn rejects_comparison_arity_mismatch() {
        let err = compile_filter(&spec(json!({
            "op": "=",
            "args": [{"property": "country"}],
        })))
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidArguments(_)));
    }

    #[test]
    fn rejects_property_argument_without_property_field() {
        let err = compile_filter(&spec(json!({
            "op": "=",
            "args": [{"field": "country"}, "Thailand"],
        })))
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidArguments(_)));
    }

    #[test]
    fn rejects_malformed_logical_child() {
        let err = compile_filter(&spec(json!({
            "op": "and",
            "args": ["not an object"],
        })))
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidFilterArgument(_)));
    }

    #[test]
    fn temporal_literal_is_coerced_or_rejected() {
        let predicate = compile_filter(&spec(json!({
            "op": ">=",
            "args": [{"property": "updatedAt"}, "2023-04-01T10:30:00Z"],
        })))
        .expect("compile");
        assert_eq!(predicate, json!({"updatedAt": {"$gte": "2023-04-01T10:30:00Z"}}));

        let err = compile_filter(&spec(json!({
            "op": ">=",
            "args": [{"property": "updatedAt"}, "yesterday"],
        })))
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidArgumentValue { .. }));
    }

    #[test]
    fn id_segments_are_rewritten_everywhere() {
        assert_eq!(rewrite_id_segments("id"), "_id");
        assert_eq!(rewrite_id_segments("service.id"), "service._id");
        assert_eq!(rewrite_id_segments("a.id.b.id"), "a._id.b._id");
        assert_eq!(rewrite_id_segments("identity"), "identity");

        let predicate = compile_filter(&spec(json!({
            "op": "=",
            "args": [{"property": "service.id"}, "64ab00112233445566778899"],
        })))
        .expect("compile");
        assert_eq!(
            predicate,
            json!({"service._id": {"$eq": "64ab00112233445566778899"}})
        );
    }

    #[test]
    fn compilation_is_idempotent() {
        let spec = spec(json!({
            "op": "and",
            "args": [
                {"op": "=", "args": [{"property": "country"}, "Thailand"]},
                {"op": ">", "args": [{"property": "year"}, "2020"]},
            ],
        }));
        let first = compile_filter(&spec).expect("first compile");
        let second = compile_filter(&spec).expect("second compile");
        assert_eq!(first, second);
    }
}
