use quire_btree::TreeError;
use quire_graph::GraphError;
use quire_journal::JournalError;
use quire_store::StoreError;
use thiserror::Error;

/// Errors produced while resolving conflicts.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}

pub type MergeResult<T> = Result<T, MergeError>;
