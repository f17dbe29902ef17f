use thiserror::Error;

use crate::schema::RecordType;

/// Errors surfaced by the conversation core.
///
/// Extraction never fails: an utterance that yields nothing is an empty
/// result, not an error.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("field `{field}` is not declared in the {record_type} schema")]
    SchemaViolation {
        record_type: RecordType,
        field: String,
    },

    #[error("could not read a value for `{field}` from {text:?}")]
    UnreadableValue { field: String, text: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("no record collection is in progress")]
    NoActiveCollection,

    #[error("record store failure: {0}")]
    Persistence(String),

    #[error("responder failure: {0}")]
    Responder(String),
}

pub type Result<T> = std::result::Result<T, IntakeError>;
