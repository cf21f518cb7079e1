//! Conflict resolution for divergent page heads.
//!
//! A page accumulates more than one head when writers commit against a
//! parent that already has another child (or when remote commits are
//! ingested). The [`MergeResolver`] watches the commit graph and, whenever
//! the head count exceeds one, runs the current [`MergeStrategy`] against
//! the two newest heads and their common ancestor, committing a merge that
//! collapses them. Repeated pairwise merges reduce any number of heads to
//! one.
//!
//! Strategies:
//!
//! - [`LastOneWinsStrategy`] -- three-way merge at entry granularity; when
//!   both sides changed a key, the commit with the larger timestamp wins
//! - [`CustomStrategy`] -- delegates to an application [`ConflictResolver`]
//!
//! [`MergeManager`] owns the default strategy and the per-page resolvers,
//! and propagates strategy replacement to them; it must outlive the
//! resolvers it hands out.

pub mod custom;
pub mod error;
pub mod last_one_wins;
pub mod manager;
pub mod resolver;
pub mod strategy;

pub use custom::{ConflictResolver, CustomStrategy};
pub use error::{MergeError, MergeResult};
pub use last_one_wins::LastOneWinsStrategy;
pub use manager::MergeManager;
pub use resolver::MergeResolver;
pub use strategy::{MergeContext, MergeOutcome, MergeStrategy, MergeStrategyFactory};
