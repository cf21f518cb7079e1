//! The commit graph of a page.
//!
//! Commits are immutable, content-addressed records (root tree id, parents,
//! timestamp, generation) written to the object store; the mutable piece of
//! state is the page's **head set**, the commits with no known children.
//!
//! [`CommitGraph`] serializes head-set mutation, dispatches `(commits,
//! source)` notifications to registered [`CommitWatcher`]s through a queued
//! pump (never recursively), and answers ancestry queries with the
//! generation-ordered frontier search of [`CommitGraph::find_common_ancestor`].

pub mod commit;
pub mod error;
pub mod graph;

pub use commit::Commit;
pub use error::{GraphError, GraphResult};
pub use graph::{CommitGraph, CommitWatcher, WatcherId};
