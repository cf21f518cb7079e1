use std::sync::Arc;

use quire_graph::{Commit, CommitGraph};
use quire_types::Clock;

use crate::error::MergeResult;

/// Everything a strategy needs to read trees and commit a merge.
pub struct MergeContext {
    pub graph: Arc<CommitGraph>,
    pub clock: Arc<dyn Clock>,
    pub max_entries_per_node: usize,
}

/// How a merge invocation ended.
#[derive(Clone, Debug)]
pub enum MergeOutcome {
    /// The merge commit that collapsed the two heads.
    Merged(Commit),
    /// The strategy observed a cancellation; the head set is untouched.
    Cancelled,
}

/// A policy that collapses two divergent heads into one merge commit.
///
/// `merge` runs on the page's task loop. Implementations must check for
/// cancellation between phases and bail out with [`MergeOutcome::Cancelled`]
/// without updating the head set; tree nodes already written by a cancelled
/// merge are unreferenced garbage, which is safe.
pub trait MergeStrategy: Send + Sync {
    /// Merge `head1` and `head2`, whose lowest common ancestor is
    /// `ancestor`, and commit the result with both heads as parents.
    fn merge(
        &self,
        ctx: &MergeContext,
        head1: &Commit,
        head2: &Commit,
        ancestor: &Commit,
    ) -> MergeResult<MergeOutcome>;

    /// Request cooperative cancellation of an in-flight merge.
    fn cancel(&self);
}

/// Produces a fresh strategy instance per resolver.
///
/// Cancellation is sticky on a strategy instance, so resolvers never share
/// one; the manager shares the factory instead and must outlive the
/// resolvers holding it.
pub trait MergeStrategyFactory: Send + Sync {
    fn make_strategy(&self) -> Arc<dyn MergeStrategy>;
}

impl<F> MergeStrategyFactory for F
where
    F: Fn() -> Arc<dyn MergeStrategy> + Send + Sync,
{
    fn make_strategy(&self) -> Arc<dyn MergeStrategy> {
        self()
    }
}
