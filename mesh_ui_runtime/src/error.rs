//! Runtime error types.
//!
//! Only `SyncError` crosses the dispatch boundary; everything below it
//! converts with `?`.

use std::io;

use mesh_ui_model::ModelError;
use thiserror::Error;

/// Failure inside a record store invocation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store {store:?} rejected {operation} of {id:?}: {reason}")]
    Rejected {
        store: String,
        operation: &'static str,
        id: String,
        reason: String,
    },
}

/// Wire decoding failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("malformed {opcode} body {body:?}")]
    MalformedBody { opcode: String, body: String },
    #[error("invalid escape sequence in {0:?}")]
    BadEscape(String),
    #[error("assignment {0:?} is not name=value")]
    MalformedAssignment(String),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Umbrella error for the runtime.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unknown descriptor {kind} {id:?}")]
    UnknownDescriptor { kind: String, id: String },
    #[error("no store registered for {0:?}")]
    MissingStore(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
