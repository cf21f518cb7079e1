use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quire_btree::for_each_entry;
use quire_graph::Commit;
use quire_journal::Journal;
use quire_store::ObjectStore;
use quire_types::{Entry, ObjectId};

use crate::error::MergeResult;
use crate::strategy::{MergeContext, MergeOutcome, MergeStrategy};

/// Application callout deciding the merged contents of two divergent heads.
///
/// The resolver receives the full entry sets of the common ancestor and of
/// both heads, in key order, and returns the merged entry set. The caller
/// turns the result into a merge commit.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, ancestor: &[Entry], left: &[Entry], right: &[Entry]) -> Vec<Entry>;
}

/// Strategy delegating conflict resolution to a [`ConflictResolver`].
pub struct CustomStrategy {
    resolver: Arc<dyn ConflictResolver>,
    cancelled: AtomicBool,
}

impl CustomStrategy {
    pub fn new(resolver: Arc<dyn ConflictResolver>) -> Self {
        Self {
            resolver,
            cancelled: AtomicBool::new(false),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

fn collect_entries(store: &dyn ObjectStore, root_id: ObjectId) -> MergeResult<Vec<Entry>> {
    let mut entries = Vec::new();
    for_each_entry(store, root_id, b"", |entry| {
        entries.push(entry.clone());
        true
    })?;
    Ok(entries)
}

impl MergeStrategy for CustomStrategy {
    fn merge(
        &self,
        ctx: &MergeContext,
        head1: &Commit,
        head2: &Commit,
        ancestor: &Commit,
    ) -> MergeResult<MergeOutcome> {
        let store = ctx.graph.store().clone();

        let base = collect_entries(&*store, ancestor.root_id())?;
        let left = collect_entries(&*store, head1.root_id())?;
        let right = collect_entries(&*store, head2.root_id())?;
        if self.is_cancelled() {
            return Ok(MergeOutcome::Cancelled);
        }

        let mut merged = self.resolver.resolve(&base, &left, &right);
        merged.sort_by(|a, b| a.key.cmp(&b.key));
        if self.is_cancelled() {
            return Ok(MergeOutcome::Cancelled);
        }

        // Turn head1's tree into the merged set.
        let mut journal = Journal::new_merge(
            ctx.graph.clone(),
            ctx.clock.clone(),
            head1.clone(),
            head2.clone(),
            ctx.max_entries_per_node,
        );
        let mut merged_iter = merged.iter().peekable();
        for current in &left {
            while let Some(next) = merged_iter.peek() {
                if next.key < current.key {
                    journal.put(next.key.clone(), next.object_id, next.priority);
                    merged_iter.next();
                } else {
                    break;
                }
            }
            match merged_iter.peek() {
                Some(next) if next.key == current.key => {
                    if **next != *current {
                        journal.put(next.key.clone(), next.object_id, next.priority);
                    }
                    merged_iter.next();
                }
                _ => journal.delete(current.key.clone())?,
            }
        }
        for rest in merged_iter {
            journal.put(rest.key.clone(), rest.object_id, rest.priority);
        }

        if self.is_cancelled() {
            journal.rollback();
            return Ok(MergeOutcome::Cancelled);
        }
        Ok(MergeOutcome::Merged(journal.commit()?))
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
