use quire_types::ObjectId;
use thiserror::Error;

/// Errors produced by object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("object {expected} read back with id {actual}")]
    ObjectIdMismatch { expected: ObjectId, actual: ObjectId },

    #[error("malformed object {id}: {reason}")]
    Format { id: ObjectId, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
