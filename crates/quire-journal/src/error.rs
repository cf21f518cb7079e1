use quire_btree::TreeError;
use quire_graph::GraphError;
use quire_store::StoreError;
use thiserror::Error;

/// Errors produced by journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("key not found")]
    KeyNotFound,
}

pub type JournalResult<T> = Result<T, JournalError>;
