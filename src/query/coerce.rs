//! Literal coercion for filter compilation.
//!
//! Comparison literals are coerced by an ordered table of field-name
//! rules (first match wins) before they land in a predicate. Flat-mode
//! equality candidates go through [`expand_candidates`], which keeps the
//! heterogeneous-OR expansion in one visible, independently tested
//! place: a raw value that parses under several types produces one
//! equality candidate per successful parse.

use serde_json::{Number, Value};
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::domain::DocId;

use super::error::FilterError;

/// Field names whose comparison literals are timestamps.
const TEMPORAL_FIELDS: &[&str] = &["time", "createdAt", "updatedAt", "datetime"];

/// Field names whose comparison literals are document identifiers.
const IDENTIFIER_FIELDS: &[&str] = &["userId", "apiKeyId", "createdBy", "updatedBy"];

/// The one accepted timestamp layout: `YYYY-MM-DDTHH:MM:SSZ`.
pub const TIMESTAMP_LAYOUT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// One entry of the coercion table.
pub struct CoercionRule {
    pub name: &'static str,
    applies: fn(&str) -> bool,
    coerce: fn(&str, &Value) -> Result<Value, FilterError>,
}

impl CoercionRule {
    pub fn applies_to(&self, property: &str) -> bool {
        (self.applies)(property)
    }

    pub fn coerce(&self, property: &str, literal: &Value) -> Result<Value, FilterError> {
        (self.coerce)(property, literal)
    }
}

/// The ordered coercion table. New field categories are added here as
/// data, not as branches in the compiler.
pub const COERCION_RULES: &[CoercionRule] = &[
    CoercionRule {
        name: "temporal",
        applies: is_temporal_field,
        coerce: coerce_timestamp,
    },
    CoercionRule {
        name: "identifier",
        applies: is_identifier_field,
        coerce: coerce_doc_id,
    },
];

fn is_temporal_field(property: &str) -> bool {
    TEMPORAL_FIELDS.contains(&property)
}

fn is_identifier_field(property: &str) -> bool {
    IDENTIFIER_FIELDS.contains(&property) || property.contains(".id")
}

fn literal_str<'a>(property: &str, literal: &'a Value) -> Result<&'a str, FilterError> {
    literal
        .as_str()
        .ok_or_else(|| FilterError::invalid_value(property, "expected a string literal"))
}

fn coerce_timestamp(property: &str, literal: &Value) -> Result<Value, FilterError> {
    let raw = literal_str(property, literal)?;
    let parsed = PrimitiveDateTime::parse(raw, TIMESTAMP_LAYOUT)
        .map_err(|_| FilterError::invalid_value(property, "expected `YYYY-MM-DDTHH:MM:SSZ`"))?;
    let canonical = parsed
        .format(TIMESTAMP_LAYOUT)
        .map_err(|err| FilterError::invalid_value(property, err.to_string()))?;
    Ok(Value::String(canonical))
}

fn coerce_doc_id(property: &str, literal: &Value) -> Result<Value, FilterError> {
    let raw = literal_str(property, literal)?;
    let id: DocId = raw
        .parse()
        .map_err(|_| FilterError::invalid_value(property, "expected a document id"))?;
    Ok(Value::String(id.to_string()))
}

/// Coerce a comparison literal through the table; literals on fields no
/// rule claims pass through unchanged.
pub fn coerce_literal(property: &str, literal: &Value) -> Result<Value, FilterError> {
    for rule in COERCION_RULES {
        if rule.applies_to(property) {
            return rule.coerce(property, literal);
        }
    }
    Ok(literal.clone())
}

/// Boolean tokens accepted by flat-mode candidate expansion.
pub fn parse_bool_token(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Expand a raw flat-filter value into every equality candidate it can
/// represent: the string itself, plus numeric, identifier, and boolean
/// readings when they parse. The candidates are OR'd by the flat
/// compiler, so a value that parses under several types matches rows of
/// any of those types.
pub fn expand_candidates(raw: &str) -> Vec<Value> {
    let mut candidates = vec![Value::String(raw.to_string())];

    if let Ok(number) = raw.parse::<f64>()
        && let Some(number) = Number::from_f64(number)
    {
        candidates.push(Value::Number(number));
    }

    if let Ok(id) = raw.parse::<DocId>() {
        candidates.push(Value::String(id.to_string()));
    }

    if let Some(flag) = parse_bool_token(raw) {
        candidates.push(Value::Bool(flag));
    }

    candidates
}
