//! Shared types for the Quire page store.
//!
//! Quire is a local, content-addressed, versioned key-value store organized
//! as independent *pages*. This crate holds the vocabulary every other crate
//! speaks:
//!
//! - [`ObjectId`] -- 16-byte content-derived identifier naming every stored
//!   blob (values, tree nodes, commits share one id space)
//! - [`PageId`] -- 16-byte identifier of a page
//! - [`CommitId`] -- alias of [`ObjectId`]; commits are content-addressed too
//! - [`Entry`] / [`EntryChange`] -- a key→value binding and a diff element
//! - [`KeyPriority`] -- eager/lazy value availability hint
//! - [`Clock`] -- injectable millisecond time source for commit timestamps

pub mod clock;
pub mod entry;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{ChangeSource, Entry, EntryChange, JournalType, KeyPriority};
pub use error::TypeError;
pub use id::{CommitId, ObjectId, PageId, ID_SIZE};
