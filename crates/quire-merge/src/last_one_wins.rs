use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use quire_btree::for_each_diff;
use quire_graph::Commit;
use quire_journal::Journal;
use quire_types::EntryChange;

use crate::error::MergeResult;
use crate::strategy::{MergeContext, MergeOutcome, MergeStrategy};

/// Merges commits with a last-one-wins policy.
///
/// The merge is three-way at entry granularity: a key changed on only one
/// side takes that side's change; a key changed on both sides takes the
/// side whose commit has the larger timestamp (ties broken on commit id).
#[derive(Debug, Default)]
pub struct LastOneWinsStrategy {
    cancelled: AtomicBool,
}

impl LastOneWinsStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl MergeStrategy for LastOneWinsStrategy {
    fn merge(
        &self,
        ctx: &MergeContext,
        head1: &Commit,
        head2: &Commit,
        ancestor: &Commit,
    ) -> MergeResult<MergeOutcome> {
        let store = ctx.graph.store().clone();

        // The winner's tree is the merge base: its own changes are already
        // in place, and it wins every double-sided conflict.
        let (winner, loser) = if (head2.timestamp(), head2.id()) >= (head1.timestamp(), head1.id())
        {
            (head2, head1)
        } else {
            (head1, head2)
        };

        let mut winner_keys: BTreeSet<Vec<u8>> = BTreeSet::new();
        for_each_diff(&*store, ancestor.root_id(), winner.root_id(), |change| {
            winner_keys.insert(change.entry.key);
            true
        })?;
        if self.is_cancelled() {
            return Ok(MergeOutcome::Cancelled);
        }

        let mut loser_changes: Vec<EntryChange> = Vec::new();
        for_each_diff(&*store, ancestor.root_id(), loser.root_id(), |change| {
            loser_changes.push(change);
            true
        })?;
        if self.is_cancelled() {
            return Ok(MergeOutcome::Cancelled);
        }

        let mut journal = Journal::new_merge(
            ctx.graph.clone(),
            ctx.clock.clone(),
            winner.clone(),
            loser.clone(),
            ctx.max_entries_per_node,
        );
        for change in loser_changes {
            if winner_keys.contains(&change.entry.key) {
                // Changed on both sides; the winner's version stands.
                continue;
            }
            if change.deleted {
                journal.delete(change.entry.key)?;
            } else {
                journal.put(
                    change.entry.key,
                    change.entry.object_id,
                    change.entry.priority,
                );
            }
        }
        if self.is_cancelled() {
            journal.rollback();
            return Ok(MergeOutcome::Cancelled);
        }

        let commit = journal.commit()?;
        debug!(
            merge = %commit.id().short_hex(),
            winner = %winner.id().short_hex(),
            loser = %loser.id().short_hex(),
            "last-one-wins merge committed"
        );
        Ok(MergeOutcome::Merged(commit))
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use quire_graph::CommitGraph;
    use quire_store::{InMemoryObjectStore, ObjectKind, ObjectStore, StoredObject};
    use quire_types::{Clock, JournalType, KeyPriority, ManualClock, ObjectId};

    const TEST_NODE_SIZE: usize = 4;

    struct Fixture {
        graph: Arc<CommitGraph>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
            Self {
                graph: CommitGraph::open(store).unwrap(),
                clock: Arc::new(ManualClock::new(1_000)),
            }
        }

        fn ctx(&self) -> MergeContext {
            MergeContext {
                graph: self.graph.clone(),
                clock: self.clock.clone() as Arc<dyn Clock>,
                max_entries_per_node: TEST_NODE_SIZE,
            }
        }

        fn value(&self, content: &[u8]) -> ObjectId {
            self.graph
                .store()
                .put(&StoredObject::new(ObjectKind::Value, content.to_vec()))
                .unwrap()
        }

        /// Commit `puts`/`deletes` on top of `parent`.
        fn commit_on(
            &self,
            parent: &Commit,
            puts: &[(&str, &[u8])],
            deletes: &[&str],
        ) -> Commit {
            let mut journal = Journal::new(
                self.graph.clone(),
                self.clock.clone(),
                JournalType::Explicit,
                parent.clone(),
                TEST_NODE_SIZE,
            );
            for (key, content) in puts {
                journal.put(key.as_bytes(), self.value(content), KeyPriority::Eager);
            }
            for key in deletes {
                journal.delete(key.as_bytes()).unwrap();
            }
            journal.commit().unwrap()
        }

        fn lookup(&self, commit: &Commit, key: &str) -> Option<ObjectId> {
            quire_btree::get_entry(&**self.graph.store(), commit.root_id(), key.as_bytes())
                .unwrap()
                .map(|e| e.object_id)
        }
    }

    #[test]
    fn disjoint_changes_both_survive() {
        let fx = Fixture::new();
        let base = fx.commit_on(fx.graph.root_commit(), &[("shared", b"s")], &[]);
        let h1 = fx.commit_on(&base, &[("left", b"l")], &[]);
        let h2 = fx.commit_on(&base, &[("right", b"r")], &[]);

        let strategy = LastOneWinsStrategy::new();
        let outcome = strategy.merge(&fx.ctx(), &h1, &h2, &base).unwrap();
        let MergeOutcome::Merged(merged) = outcome else {
            panic!("merge should complete");
        };

        assert_eq!(merged.parent_ids().len(), 2);
        assert!(fx.lookup(&merged, "left").is_some());
        assert!(fx.lookup(&merged, "right").is_some());
        assert!(fx.lookup(&merged, "shared").is_some());
        assert_eq!(fx.graph.head_ids(), vec![merged.id()]);
    }

    #[test]
    fn conflicting_key_takes_the_newer_commit() {
        let fx = Fixture::new();
        let base = fx.commit_on(fx.graph.root_commit(), &[("k", b"base")], &[]);
        let older = fx.commit_on(&base, &[("k", b"older")], &[]);
        let newer = fx.commit_on(&base, &[("k", b"newer")], &[]);
        assert!(newer.timestamp() > older.timestamp());

        let strategy = LastOneWinsStrategy::new();
        // Argument order must not matter.
        let MergeOutcome::Merged(merged) =
            strategy.merge(&fx.ctx(), &newer, &older, &base).unwrap()
        else {
            panic!("merge should complete");
        };
        assert_eq!(fx.lookup(&merged, "k"), Some(fx.value(b"newer")));
    }

    #[test]
    fn single_sided_delete_propagates() {
        let fx = Fixture::new();
        let base = fx.commit_on(
            fx.graph.root_commit(),
            &[("doomed", b"d"), ("kept", b"k")],
            &[],
        );
        let h1 = fx.commit_on(&base, &[], &["doomed"]);
        let h2 = fx.commit_on(&base, &[("kept", b"k2")], &[]);

        let strategy = LastOneWinsStrategy::new();
        let MergeOutcome::Merged(merged) = strategy.merge(&fx.ctx(), &h1, &h2, &base).unwrap()
        else {
            panic!("merge should complete");
        };
        assert!(fx.lookup(&merged, "doomed").is_none());
        assert_eq!(fx.lookup(&merged, "kept"), Some(fx.value(b"k2")));
    }

    #[test]
    fn cancelled_merge_leaves_heads_alone() {
        let fx = Fixture::new();
        let base = fx.commit_on(fx.graph.root_commit(), &[("k", b"base")], &[]);
        let h1 = fx.commit_on(&base, &[("k", b"one")], &[]);
        let h2 = fx.commit_on(&base, &[("k", b"two")], &[]);
        let heads_before = fx.graph.head_ids();
        assert_eq!(heads_before.len(), 2);

        let strategy = LastOneWinsStrategy::new();
        strategy.cancel();
        let outcome = strategy.merge(&fx.ctx(), &h1, &h2, &base).unwrap();

        assert!(matches!(outcome, MergeOutcome::Cancelled));
        assert_eq!(fx.graph.head_ids(), heads_before);
    }
}
