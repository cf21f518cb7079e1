//! Content-addressed object storage for the Quire page store.
//!
//! Every persisted artifact -- values, B-tree nodes, commit records -- is an
//! immutable object identified by a domain-separated BLAKE3 hash of its
//! bytes, truncated to the system id width. Commits, tree nodes and values
//! share one id space and are distinguished by a kind tag in their framing.
//!
//! # Object kinds
//!
//! - [`ObjectKind::Value`] -- opaque client value bytes
//! - [`ObjectKind::TreeNode`] -- serialized B-tree node
//! - [`ObjectKind::Commit`] -- serialized commit record
//!
//! # Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileObjectStore`] -- flat directory of blobs named by hex id, with
//!   atomic publish (temp file + rename) and hash verification on read
//!
//! # Design rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes are idempotent: the same bytes always produce the same id.
//! 3. Concurrent reads are always safe; stores are shared across pages.
//! 4. The store never interprets object payloads beyond the kind tag.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod hasher;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FileObjectStore;
pub use hasher::ContentHasher;
pub use memory::InMemoryObjectStore;
pub use object::{ObjectKind, StoredObject};
pub use traits::ObjectStore;
