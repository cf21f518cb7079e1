//! Page handles for the Quire store.
//!
//! A *page* is an independently versioned key→value map. [`PageCore`] holds
//! the per-page engine state (object store, commit graph, configuration);
//! any number of [`Page`] handles can be opened on one core, each with its
//! own [`BranchTracker`] following one branch of the commit graph.
//!
//! Clients read through [`Snapshot`]s bound to a commit, write through the
//! page's implicit or explicit transactions, and observe live changes by
//! registering a [`PageWatcher`].

pub mod config;
pub mod error;
pub mod page;
pub mod snapshot;
pub mod tracker;
pub mod value;
pub mod watcher;

pub use config::PageConfig;
pub use error::{PageError, PageResult};
pub use page::{Page, PageCore};
pub use snapshot::{PageToken, Snapshot, SnapshotEntry};
pub use tracker::BranchTracker;
pub use value::{Reference, Value, ValueHandle};
pub use watcher::{ChangedEntry, PageChange, PageWatcher, PageWatcherId, WatcherAck};
