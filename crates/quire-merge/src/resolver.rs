use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use quire_graph::{Commit, CommitGraph, CommitWatcher, WatcherId};
use quire_types::{ChangeSource, Clock};

use crate::error::MergeResult;
use crate::strategy::{MergeContext, MergeOutcome, MergeStrategy};

/// Resolver phase.
///
/// `StrategyChangePending` means a merge is still in flight but a strategy
/// replacement was requested: the active strategy has been cancelled and
/// the queued one installs when the merge completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    MergeInFlight,
    StrategyChangePending,
}

struct ResolverState {
    phase: Phase,
    strategy: Option<Arc<dyn MergeStrategy>>,
    next_strategy: Option<Arc<dyn MergeStrategy>>,
}

/// Watches a page's commit graph and collapses divergent heads.
///
/// Whenever the head count exceeds one and a strategy is installed, the
/// resolver selects the two newest heads (by timestamp, ids breaking ties),
/// finds their common ancestor and runs the strategy. Each successful merge
/// re-checks for conflicts, so any number of heads converges to one.
pub struct MergeResolver {
    ctx: MergeContext,
    registration: WatcherId,
    state: Mutex<ResolverState>,
}

impl MergeResolver {
    /// Create a resolver for a page and register it on the commit graph.
    pub fn register(
        graph: Arc<CommitGraph>,
        clock: Arc<dyn Clock>,
        max_entries_per_node: usize,
    ) -> Arc<Self> {
        let resolver = Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let as_watcher: std::sync::Weak<dyn CommitWatcher> = weak.clone();
            let registration = graph.add_weak_commit_watcher(as_watcher);
            Self {
                ctx: MergeContext {
                    graph: graph.clone(),
                    clock,
                    max_entries_per_node,
                },
                registration,
                state: Mutex::new(ResolverState {
                    phase: Phase::Idle,
                    strategy: None,
                    next_strategy: None,
                }),
            }
        });
        resolver.check_conflicts();
        resolver
    }

    /// Detach from the commit graph; no further conflict checks fire.
    pub fn detach(&self) {
        self.ctx.graph.remove_commit_watcher(self.registration);
    }

    /// Returns `true` if no merge is currently in flight.
    pub fn is_idle(&self) -> bool {
        self.state.lock().expect("lock poisoned").phase == Phase::Idle
    }

    /// Install, replace or clear the merge strategy.
    ///
    /// While a merge is in flight the replacement does not apply
    /// immediately: the active strategy is cancelled and the new one takes
    /// over once the merge completes.
    pub fn set_strategy(&self, strategy: Option<Arc<dyn MergeStrategy>>) {
        let (to_cancel, run_check) = {
            let mut state = self.state.lock().expect("lock poisoned");
            match state.phase {
                Phase::Idle => {
                    state.strategy = strategy.clone();
                    (None, strategy.is_some())
                }
                Phase::MergeInFlight | Phase::StrategyChangePending => {
                    state.next_strategy = strategy;
                    state.phase = Phase::StrategyChangePending;
                    (state.strategy.clone(), false)
                }
            }
        };
        if let Some(active) = to_cancel {
            active.cancel();
        }
        if run_check {
            self.check_conflicts();
        }
    }

    /// Look for divergent heads and merge until the page converges, the
    /// strategy defers, or an error postpones the attempt.
    pub fn check_conflicts(&self) {
        loop {
            let strategy = {
                let mut state = self.state.lock().expect("lock poisoned");
                if state.phase != Phase::Idle {
                    // A merge is already running further up the stack.
                    return;
                }
                let Some(strategy) = state.strategy.clone() else {
                    return;
                };
                if self.ctx.graph.head_count() <= 1 {
                    return;
                }
                state.phase = Phase::MergeInFlight;
                strategy
            };

            let outcome = self.resolve_once(&*strategy);

            let strategy_changed = {
                let mut state = self.state.lock().expect("lock poisoned");
                let changed = state.phase == Phase::StrategyChangePending;
                if changed {
                    state.strategy = state.next_strategy.take();
                }
                state.phase = Phase::Idle;
                changed
            };

            match outcome {
                Ok(MergeOutcome::Merged(commit)) => {
                    debug!(merge = %commit.id().short_hex(), "conflict resolved");
                }
                Ok(MergeOutcome::Cancelled) => {
                    if !strategy_changed {
                        // Cancelled with nothing new installed; wait for the
                        // next commit event rather than spinning.
                        return;
                    }
                }
                Err(e) => {
                    // Heads are intact; the next check-conflicts retries.
                    warn!("merge attempt failed: {e}");
                    return;
                }
            }
        }
    }

    /// Merge the two newest heads once.
    fn resolve_once(&self, strategy: &dyn MergeStrategy) -> MergeResult<MergeOutcome> {
        let heads = self.ctx.graph.head_ids();
        if heads.len() < 2 {
            return Ok(MergeOutcome::Cancelled);
        }
        // Heads are ordered (timestamp asc, id asc); last-writer-wins wants
        // the two most recent.
        let head1 = self.ctx.graph.get_commit(&heads[heads.len() - 2])?;
        let head2 = self.ctx.graph.get_commit(&heads[heads.len() - 1])?;
        let ancestor = self.ctx.graph.find_common_ancestor(&head1.id(), &head2.id())?;
        debug!(
            head1 = %head1.id().short_hex(),
            head2 = %head2.id().short_hex(),
            ancestor = %ancestor.id().short_hex(),
            "merging divergent heads"
        );
        strategy.merge(&self.ctx, &head1, &head2, &ancestor)
    }
}

impl CommitWatcher for MergeResolver {
    fn on_new_commits(&self, _commits: &[Commit], _source: ChangeSource) {
        self.check_conflicts();
    }
}

impl std::fmt::Debug for MergeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock poisoned");
        f.debug_struct("MergeResolver")
            .field("phase", &state.phase)
            .field("has_strategy", &state.strategy.is_some())
            .finish()
    }
}
