use quire_btree::TreeError;
use quire_graph::GraphError;
use quire_journal::JournalError;
use quire_store::StoreError;
use quire_types::ObjectId;
use thiserror::Error;

/// Client-visible status of a page operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("i/o error: {0}")]
    Io(String),

    #[error("not found")]
    NotFound,

    #[error("referenced object not found")]
    ReferenceNotFound,

    #[error("key not found")]
    KeyNotFound,

    #[error("no transaction in progress")]
    NoTransactionInProgress,

    #[error("transaction already in progress")]
    TransactionAlreadyInProgress,

    #[error("malformed object: {0}")]
    Format(String),

    #[error("object {expected} read back with id {actual}")]
    ObjectIdMismatch { expected: ObjectId, actual: ObjectId },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type PageResult<T> = Result<T, PageError>;

impl From<StoreError> for PageError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(_) | StoreError::SizeMismatch { .. } => PageError::Io(e.to_string()),
            StoreError::ObjectIdMismatch { expected, actual } => {
                PageError::ObjectIdMismatch { expected, actual }
            }
            StoreError::Format { .. } => PageError::Format(e.to_string()),
        }
    }
}

impl From<TreeError> for PageError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::Store(inner) => inner.into(),
            TreeError::Malformed(_) | TreeError::Serialization(_) => {
                PageError::Format(e.to_string())
            }
            TreeError::NodeNotFound(_) | TreeError::UnsortedChanges(_) => {
                PageError::Internal(e.to_string())
            }
        }
    }
}

impl From<GraphError> for PageError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Store(inner) => inner.into(),
            GraphError::Tree(inner) => inner.into(),
            GraphError::Serialization(_) => PageError::Format(e.to_string()),
            GraphError::CommitNotFound(_) | GraphError::MissingParent { .. } => {
                PageError::Internal(e.to_string())
            }
        }
    }
}

impl From<JournalError> for PageError {
    fn from(e: JournalError) -> Self {
        match e {
            JournalError::Store(inner) => inner.into(),
            JournalError::Tree(inner) => inner.into(),
            JournalError::Graph(inner) => inner.into(),
            JournalError::KeyNotFound => PageError::KeyNotFound,
        }
    }
}
