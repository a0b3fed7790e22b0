//! Mesh UI Model: Errors

use thiserror::Error;

/// Failures raised while decoding or validating model data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("malformed data source {input:?}: {reason}")]
    MalformedDataSource { input: String, reason: String },
    #[error("malformed filter clause {0:?}")]
    MalformedFilter(String),
    #[error("malformed property binding {0:?}: expected <ownerId>;<propertyName>")]
    MalformedBinding(String),
    #[error("invariant violation: [{rule}] {detail}")]
    InvariantViolation { rule: &'static str, detail: String },
}

pub type ModelResult<T> = Result<T, ModelError>;
