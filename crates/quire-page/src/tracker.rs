use std::sync::{Arc, Mutex};

use tracing::error;

use quire_btree::for_each_diff;
use quire_graph::{Commit, CommitGraph, CommitWatcher};
use quire_types::{ChangeSource, CommitId, EntryChange};

use crate::config::PageConfig;
use crate::error::{PageError, PageResult};
use crate::snapshot::Snapshot;
use crate::value::{Value, ValueHandle};
use crate::watcher::{ChangedEntry, PageChange, PageWatcher, PageWatcherId, WatcherAck};

/// Follows one branch of a page's commit graph for one page handle and keeps
/// that handle's watchers in sync with it.
///
/// The tracker listens to commit-graph notifications: a new commit advances
/// `current_commit` only if it is a child of it; commits on other branches
/// are ignored (the merge resolver deals with them), and nothing moves while
/// the handle has a transaction open.
pub struct BranchTracker {
    graph: Arc<CommitGraph>,
    config: PageConfig,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    current_commit: CommitId,
    transaction_in_progress: bool,
    watchers: Vec<WatcherRecord>,
    next_watcher_id: u64,
}

/// Per-watcher delivery state.
///
/// `last_commit` is the cursor: the commit whose contents the watcher has
/// acknowledged. While `change_in_flight` is set no further delivery is
/// attempted; head advances in the meantime coalesce into one diff from the
/// cursor once the watcher acknowledges.
struct WatcherRecord {
    id: PageWatcherId,
    watcher: Arc<dyn PageWatcher>,
    last_commit: CommitId,
    in_flight_target: Option<CommitId>,
    change_in_flight: bool,
}

impl BranchTracker {
    pub(crate) fn new(graph: Arc<CommitGraph>, config: PageConfig) -> PageResult<Arc<Self>> {
        let head = graph
            .head_ids()
            .into_iter()
            .next()
            .ok_or_else(|| PageError::Internal("page has no head commit".to_string()))?;
        Ok(Arc::new(Self {
            graph,
            config,
            state: Mutex::new(TrackerState {
                current_commit: head,
                transaction_in_progress: false,
                watchers: Vec::new(),
                next_watcher_id: 0,
            }),
        }))
    }

    /// The commit this handle currently reads and writes against.
    pub fn branch_head(&self) -> CommitId {
        self.state.lock().expect("lock poisoned").current_commit
    }

    /// Point the branch at `commit_id` (after a successful local commit) and
    /// bring watchers up to date.
    pub fn set_branch_head(&self, commit_id: &CommitId) {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.current_commit = *commit_id;
        }
        self.reconcile_with_heads();
        self.update_watchers();
    }

    /// Toggle the transaction flag; leaving a transaction delivers whatever
    /// the watchers missed while it was open.
    pub fn set_transaction_in_progress(&self, in_progress: bool) {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.transaction_in_progress == in_progress {
                return;
            }
            state.transaction_in_progress = in_progress;
            if in_progress {
                return;
            }
        }
        self.reconcile_with_heads();
        self.update_watchers();
    }

    /// Catch up with head-set changes that were dispatched while this
    /// tracker ignored them (a merge landing during our own transaction,
    /// say). The branch adopts a head only if the current commit is its
    /// ancestor; sibling branches stay ignored.
    fn reconcile_with_heads(&self) {
        let current = self.branch_head();
        let heads = self.graph.head_ids();
        if heads.contains(&current) {
            return;
        }
        for head in heads {
            if let Ok(true) = self.graph.is_ancestor(&current, &head) {
                let mut state = self.state.lock().expect("lock poisoned");
                state.current_commit = head;
                return;
            }
        }
    }

    /// Register a watcher: fires `on_initial_state` with a snapshot of the
    /// current branch head before any change is delivered.
    pub(crate) fn register_watcher(
        &self,
        watcher: Arc<dyn PageWatcher>,
    ) -> PageResult<PageWatcherId> {
        let (id, base) = {
            let mut state = self.state.lock().expect("lock poisoned");
            let id = PageWatcherId(state.next_watcher_id);
            state.next_watcher_id += 1;
            let base = state.current_commit;
            state.watchers.push(WatcherRecord {
                id,
                watcher: watcher.clone(),
                last_commit: base,
                in_flight_target: None,
                change_in_flight: true,
            });
            (id, base)
        };

        let commit = self.graph.get_commit(&base)?;
        let snapshot = Snapshot::new(self.graph.store().clone(), commit, self.config);
        match watcher.on_initial_state(snapshot) {
            WatcherAck::Ack { .. } => {
                self.finish_delivery(id);
                self.send_commit(id);
            }
            WatcherAck::Defer => {}
        }
        Ok(id)
    }

    /// Drop a watcher; no further deliveries reach it.
    pub fn remove_watcher(&self, id: PageWatcherId) {
        self.state
            .lock()
            .expect("lock poisoned")
            .watchers
            .retain(|rec| rec.id != id);
    }

    /// Complete a deferred acknowledgement and resume deliveries.
    pub(crate) fn acknowledge(
        &self,
        id: PageWatcherId,
        request_snapshot: bool,
    ) -> PageResult<()> {
        {
            let state = self.state.lock().expect("lock poisoned");
            if !state.watchers.iter().any(|rec| rec.id == id) {
                return Err(PageError::NotFound);
            }
        }
        let delivered = self.finish_delivery(id);
        if request_snapshot {
            if let Some(commit_id) = delivered {
                self.deliver_snapshot(id, &commit_id)?;
            }
        }
        self.send_commit(id);
        Ok(())
    }

    /// Deliver pending changes to every watcher.
    fn update_watchers(&self) {
        let ids: Vec<PageWatcherId> = {
            let state = self.state.lock().expect("lock poisoned");
            state.watchers.iter().map(|rec| rec.id).collect()
        };
        for id in ids {
            self.send_commit(id);
        }
    }

    /// Push the branch head to one watcher, coalescing multiple advances
    /// into a single diff from the watcher's cursor. Loops until the watcher
    /// is caught up or defers.
    fn send_commit(&self, id: PageWatcherId) {
        loop {
            let (watcher, from, to) = {
                let mut state = self.state.lock().expect("lock poisoned");
                let current = state.current_commit;
                let Some(rec) = state.watchers.iter_mut().find(|rec| rec.id == id) else {
                    return;
                };
                if rec.change_in_flight || rec.last_commit == current {
                    return;
                }
                rec.change_in_flight = true;
                rec.in_flight_target = Some(current);
                (rec.watcher.clone(), rec.last_commit, current)
            };

            let change = match self.build_page_change(&from, &to) {
                Ok(change) => change,
                Err(e) => {
                    // This notification cycle is abandoned; the cursor stays
                    // put and the next advance covers this change too.
                    error!("unable to compute watcher change: {e}");
                    self.abort_delivery(id);
                    return;
                }
            };

            if change.is_empty() {
                // Nothing to tell the watcher; silently move the cursor.
                self.finish_delivery(id);
                continue;
            }

            match watcher.on_change(change) {
                WatcherAck::Ack { request_snapshot } => {
                    self.finish_delivery(id);
                    if request_snapshot {
                        if let Err(e) = self.deliver_snapshot(id, &to) {
                            error!("unable to deliver requested snapshot: {e}");
                        }
                    }
                }
                WatcherAck::Defer => return,
            }
        }
    }

    /// Clear the in-flight flag, advancing the cursor if a delivery was
    /// outstanding. Returns the commit the cursor moved to, if any.
    fn finish_delivery(&self, id: PageWatcherId) -> Option<CommitId> {
        let mut state = self.state.lock().expect("lock poisoned");
        let rec = state.watchers.iter_mut().find(|rec| rec.id == id)?;
        rec.change_in_flight = false;
        let target = rec.in_flight_target.take()?;
        rec.last_commit = target;
        Some(target)
    }

    fn abort_delivery(&self, id: PageWatcherId) {
        let mut state = self.state.lock().expect("lock poisoned");
        if let Some(rec) = state.watchers.iter_mut().find(|rec| rec.id == id) {
            rec.change_in_flight = false;
            rec.in_flight_target = None;
        }
    }

    fn deliver_snapshot(&self, id: PageWatcherId, commit_id: &CommitId) -> PageResult<()> {
        let watcher = {
            let state = self.state.lock().expect("lock poisoned");
            state
                .watchers
                .iter()
                .find(|rec| rec.id == id)
                .map(|rec| rec.watcher.clone())
        };
        let Some(watcher) = watcher else {
            return Ok(());
        };
        let commit = self.graph.get_commit(commit_id)?;
        watcher.on_snapshot(Snapshot::new(
            self.graph.store().clone(),
            commit,
            self.config,
        ));
        Ok(())
    }

    /// Diff the trees of `from` and `to` and inflate changed values.
    fn build_page_change(&self, from: &CommitId, to: &CommitId) -> PageResult<PageChange> {
        let from_commit = self.graph.get_commit(from)?;
        let to_commit = self.graph.get_commit(to)?;
        let store = self.graph.store();

        let mut raw: Vec<EntryChange> = Vec::new();
        for_each_diff(
            &**store,
            from_commit.root_id(),
            to_commit.root_id(),
            |change| {
                raw.push(change);
                true
            },
        )?;

        let mut changes = Vec::new();
        let mut deleted_keys = Vec::new();
        for change in raw {
            if change.deleted {
                deleted_keys.push(change.entry.key);
                continue;
            }
            let object = store.get(&change.entry.object_id)?.ok_or_else(|| {
                PageError::Internal(format!(
                    "value object {} missing while notifying",
                    change.entry.object_id
                ))
            })?;
            let value = if object.data.len() <= self.config.max_inline_value_size {
                Value::Bytes(object.data)
            } else {
                Value::Handle(ValueHandle {
                    object_id: change.entry.object_id,
                    size: object.size(),
                })
            };
            changes.push(ChangedEntry {
                key: change.entry.key,
                value,
                priority: change.entry.priority,
            });
        }

        Ok(PageChange {
            timestamp: to_commit.timestamp(),
            changes,
            deleted_keys,
        })
    }
}

impl CommitWatcher for BranchTracker {
    fn on_new_commits(&self, commits: &[Commit], _source: ChangeSource) {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.transaction_in_progress {
                return;
            }
            // Commits may arrive in any partial order: keep adopting any
            // commit whose parent is the current head until none applies.
            // Whatever never applies belongs to another branch.
            let mut changed = false;
            loop {
                let mut advanced = false;
                for commit in commits {
                    if commit.id() != state.current_commit
                        && commit.has_parent(&state.current_commit)
                    {
                        state.current_commit = commit.id();
                        advanced = true;
                        changed = true;
                    }
                }
                if !advanced {
                    break;
                }
            }
            if !changed {
                return;
            }
        }
        self.update_watchers();
    }
}

impl std::fmt::Debug for BranchTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock poisoned");
        f.debug_struct("BranchTracker")
            .field("current_commit", &state.current_commit)
            .field("transaction_in_progress", &state.transaction_in_progress)
            .field("watchers", &state.watchers.len())
            .finish()
    }
}
