use quire_store::StoreError;
use quire_types::ObjectId;
use thiserror::Error;

/// Errors produced by B-tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("tree node {0} not found")]
    NodeNotFound(ObjectId),

    #[error("malformed tree: {0}")]
    Malformed(String),

    #[error("node serialization error: {0}")]
    Serialization(String),

    #[error("change stream not strictly ascending at key {0:?}")]
    UnsortedChanges(String),
}

pub type TreeResult<T> = Result<T, TreeError>;
