use thiserror::Error;

/// Failures raised while parsing or compiling a filter expression.
///
/// All variants are client errors: the offending reason is surfaced in
/// the 400 response body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(&'static str),
    #[error("invalid filter argument: {0}")]
    InvalidFilterArgument(String),
    #[error("invalid argument value for `{property}`: {reason}")]
    InvalidArgumentValue { property: String, reason: String },
}

impl FilterError {
    pub fn invalid_value(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgumentValue {
            property: property.into(),
            reason: reason.into(),
        }
    }
}
