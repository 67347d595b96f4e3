//! Wire representation of the explore filter expression.
//!
//! A filter arrives as an untyped `{op, args}` tree. The query layer
//! parses it once into a typed AST (`query::compiler::FilterNode`);
//! this module only carries the raw shape across the HTTP boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Untyped filter node as received on the wire.
///
/// `args` holds either nested filter objects (logical operators) or a
/// `{property}` reference followed by a literal (comparison operators).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl FilterSpec {
    pub fn new(op: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            op: op.into(),
            args,
        }
    }
}
