use quire_btree::TreeError;
use quire_store::StoreError;
use quire_types::CommitId;
use thiserror::Error;

/// Errors produced by commit graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("commit {0} not found")]
    CommitNotFound(CommitId),

    #[error("commit {commit} references unknown parent {parent}")]
    MissingParent { commit: CommitId, parent: CommitId },

    #[error("commit serialization error: {0}")]
    Serialization(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
