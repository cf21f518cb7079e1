use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use quire_btree::TreeNode;
use quire_store::ObjectStore;
use quire_types::{ChangeSource, CommitId};

use crate::commit::Commit;
use crate::error::{GraphError, GraphResult};

/// Observer of head-set changes.
///
/// Branch trackers and merge resolvers implement this; they are invoked from
/// the graph's notification pump with each batch of new commits and its
/// source.
pub trait CommitWatcher: Send + Sync {
    fn on_new_commits(&self, commits: &[Commit], source: ChangeSource);
}

/// Handle for removing a registered [`CommitWatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

/// The per-page commit graph: immutable commit records in the object store
/// plus the mutable head set.
///
/// All head-set mutation goes through this type. Watcher dispatch is
/// serialized through an internal queue: a commit created inside a
/// notification (a merge, say) is enqueued and delivered after the current
/// batch, never recursively. Per the page scheduling model, a page's
/// operations run on one task loop; the queue keeps observer ordering
/// deterministic on that loop.
pub struct CommitGraph {
    store: Arc<dyn ObjectStore>,
    root_commit: Commit,
    heads: Mutex<HashMap<CommitId, i64>>,
    watchers: Mutex<Vec<(WatcherId, Weak<dyn CommitWatcher>)>>,
    next_watcher_id: AtomicU64,
    queue: Mutex<VecDeque<(Vec<Commit>, ChangeSource)>>,
    draining: AtomicBool,
}

impl CommitGraph {
    /// Open the commit graph of a page over `store`.
    ///
    /// Writes the empty tree node and the root commit (both content-derived,
    /// so reopening an existing store is a no-op) and seeds the head set
    /// with the root commit.
    pub fn open(store: Arc<dyn ObjectStore>) -> GraphResult<Arc<Self>> {
        let empty_tree_id = TreeNode::write_empty(&*store)?;
        let root_commit = Commit::root(empty_tree_id);
        store.put(&root_commit.to_stored_object()?)?;

        let mut heads = HashMap::new();
        heads.insert(root_commit.id(), root_commit.timestamp());
        Ok(Arc::new(Self {
            store,
            root_commit,
            heads: Mutex::new(heads),
            watchers: Mutex::new(Vec::new()),
            next_watcher_id: AtomicU64::new(0),
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }))
    }

    /// The object store this graph writes into.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The page's root commit.
    pub fn root_commit(&self) -> &Commit {
        &self.root_commit
    }

    /// Fetch a commit by id.
    pub fn get_commit(&self, id: &CommitId) -> GraphResult<Commit> {
        let obj = self
            .store
            .get(id)?
            .ok_or(GraphError::CommitNotFound(*id))?;
        let commit = Commit::from_stored_object(&obj)?;
        if commit.id() != *id {
            return Err(GraphError::Store(quire_store::StoreError::ObjectIdMismatch {
                expected: *id,
                actual: commit.id(),
            }));
        }
        Ok(commit)
    }

    /// The current head commit ids, ordered by `(timestamp asc, id asc)`.
    pub fn head_ids(&self) -> Vec<CommitId> {
        let heads = self.heads.lock().expect("lock poisoned");
        let mut ordered: Vec<(i64, CommitId)> =
            heads.iter().map(|(id, ts)| (*ts, *id)).collect();
        ordered.sort();
        ordered.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of current heads. Always at least 1.
    pub fn head_count(&self) -> usize {
        self.heads.lock().expect("lock poisoned").len()
    }

    /// Record a locally created commit: write it, swap its parents out of
    /// the head set, and notify watchers with [`ChangeSource::Local`].
    ///
    /// If a parent is no longer a head (another writer advanced first) the
    /// commit still becomes a new head, creating a divergent branch for the
    /// merge resolver to collapse.
    pub fn record_commit(&self, commit: Commit) -> GraphResult<()> {
        self.insert(commit, ChangeSource::Local)
    }

    /// Ingest commits that arrived out of band (remote sync), in the order
    /// given. Each commit's parents must already be present.
    pub fn record_commits_from_sync(&self, commits: Vec<Commit>) -> GraphResult<()> {
        for commit in commits {
            self.insert(commit, ChangeSource::Sync)?;
        }
        Ok(())
    }

    fn insert(&self, commit: Commit, source: ChangeSource) -> GraphResult<()> {
        for parent in commit.parent_ids() {
            if !self.store.contains(parent)? {
                return Err(GraphError::MissingParent {
                    commit: commit.id(),
                    parent: *parent,
                });
            }
        }
        // The record is durable before the head set points at it.
        self.store.put(&commit.to_stored_object()?)?;
        {
            let mut heads = self.heads.lock().expect("lock poisoned");
            for parent in commit.parent_ids() {
                heads.remove(parent);
            }
            heads.insert(commit.id(), commit.timestamp());
            debug!(
                commit = %commit.id().short_hex(),
                generation = commit.generation(),
                heads = heads.len(),
                ?source,
                "head set updated"
            );
        }
        self.publish(vec![commit], source);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Watchers
    // -----------------------------------------------------------------

    /// Register a watcher; it is held weakly and pruned once dropped.
    pub fn add_commit_watcher(&self, watcher: &Arc<dyn CommitWatcher>) -> WatcherId {
        self.add_weak_commit_watcher(Arc::downgrade(watcher))
    }

    /// Register a watcher by weak reference; used by watchers that register
    /// themselves during their own construction.
    pub fn add_weak_commit_watcher(&self, watcher: Weak<dyn CommitWatcher>) -> WatcherId {
        let id = WatcherId(self.next_watcher_id.fetch_add(1, Ordering::Relaxed));
        self.watchers
            .lock()
            .expect("lock poisoned")
            .push((id, watcher));
        id
    }

    /// Remove a previously registered watcher.
    pub fn remove_commit_watcher(&self, id: WatcherId) {
        self.watchers
            .lock()
            .expect("lock poisoned")
            .retain(|(wid, _)| *wid != id);
    }

    /// Queue a notification and drain the queue unless a drain is already
    /// running higher up the stack.
    fn publish(&self, commits: Vec<Commit>, source: ChangeSource) {
        self.queue
            .lock()
            .expect("lock poisoned")
            .push_back((commits, source));
        if self.draining.swap(true, Ordering::AcqRel) {
            // The active drain loop will pick this batch up.
            return;
        }
        loop {
            loop {
                let next = self.queue.lock().expect("lock poisoned").pop_front();
                let Some((commits, source)) = next else { break };
                let watchers: Vec<Arc<dyn CommitWatcher>> = {
                    let mut list = self.watchers.lock().expect("lock poisoned");
                    list.retain(|(_, w)| w.strong_count() > 0);
                    list.iter().filter_map(|(_, w)| w.upgrade()).collect()
                };
                for watcher in watchers {
                    watcher.on_new_commits(&commits, source);
                }
            }
            self.draining.store(false, Ordering::Release);
            if self.queue.lock().expect("lock poisoned").is_empty() {
                break;
            }
            if self.draining.swap(true, Ordering::AcqRel) {
                break;
            }
        }
    }

    // -----------------------------------------------------------------
    // Ancestry
    // -----------------------------------------------------------------

    /// Returns `true` if `ancestor` is `descendant` or one of its
    /// ancestors.
    ///
    /// Walks parents from `descendant`, pruning paths once their generation
    /// drops to the target's; generations make the walk terminate without
    /// visiting the whole graph.
    pub fn is_ancestor(
        &self,
        ancestor: &CommitId,
        descendant: &CommitId,
    ) -> GraphResult<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        let target_generation = self.get_commit(ancestor)?.generation();
        let mut pending = vec![self.get_commit(descendant)?];
        let mut visited: BTreeSet<CommitId> = BTreeSet::new();
        while let Some(commit) = pending.pop() {
            for parent_id in commit.parent_ids() {
                if parent_id == ancestor {
                    return Ok(true);
                }
                if !visited.insert(*parent_id) {
                    continue;
                }
                let parent = self.get_commit(parent_id)?;
                if parent.generation() > target_generation {
                    pending.push(parent);
                }
            }
        }
        Ok(false)
    }

    /// Find the lowest common ancestor of two commits.
    ///
    /// Keeps a frontier ordered by `(generation desc, id asc)`, seeded with
    /// both commits; while more than one commit remains, the deepest is
    /// replaced by its parents. Because every commit's generation exceeds
    /// its parents', the frontier converges on the unique closest common
    /// ancestor.
    pub fn find_common_ancestor(
        &self,
        first: &CommitId,
        second: &CommitId,
    ) -> GraphResult<Commit> {
        let mut commits: HashMap<CommitId, Commit> = HashMap::new();
        let mut frontier: BTreeSet<FrontierKey> = BTreeSet::new();

        for id in [first, second] {
            let commit = self.get_commit(id)?;
            frontier.insert(FrontierKey::of(&commit));
            commits.insert(commit.id(), commit);
        }

        while frontier.len() > 1 {
            let Some(deepest) = frontier.pop_first() else {
                break;
            };
            let Some(commit) = commits.remove(&deepest.id) else {
                continue;
            };
            for parent_id in commit.parent_ids() {
                if commits.contains_key(parent_id) {
                    continue;
                }
                let parent = self.get_commit(parent_id)?;
                frontier.insert(FrontierKey::of(&parent));
                commits.insert(parent.id(), parent);
            }
        }

        frontier
            .pop_first()
            .and_then(|key| commits.remove(&key.id))
            .ok_or(GraphError::CommitNotFound(*first))
    }
}

impl std::fmt::Debug for CommitGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitGraph")
            .field("heads", &self.head_count())
            .finish()
    }
}

/// Frontier ordering for the common-ancestor search: deepest generation
/// first, ties broken by ascending id.
#[derive(PartialEq, Eq)]
struct FrontierKey {
    generation: u64,
    id: CommitId,
}

impl FrontierKey {
    fn of(commit: &Commit) -> Self {
        Self {
            generation: commit.generation(),
            id: commit.id(),
        }
    }
}

impl Ord for FrontierKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .generation
            .cmp(&self.generation)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for FrontierKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
