use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use quire_btree::apply_changes;
use quire_graph::{Commit, CommitGraph};
use quire_types::{Clock, Entry, EntryChange, JournalType, KeyPriority, ObjectId};

use crate::error::{JournalError, JournalResult};

/// One pending mutation; the last write to a key within a journal wins.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Pending {
    Put {
        object_id: ObjectId,
        priority: KeyPriority,
    },
    Delete,
}

/// A journal of pending mutations on top of one parent commit (two for
/// merges).
///
/// Journals are exclusively owned by the session that opened them and are
/// disjoint from the commit graph until committed. `commit` and `rollback`
/// consume the journal; any failure inside `commit` discards it.
pub struct Journal {
    graph: Arc<CommitGraph>,
    clock: Arc<dyn Clock>,
    journal_type: JournalType,
    parents: Vec<Commit>,
    pending: BTreeMap<Vec<u8>, Pending>,
    max_entries_per_node: usize,
}

impl Journal {
    /// Open a journal on top of `parent`.
    pub fn new(
        graph: Arc<CommitGraph>,
        clock: Arc<dyn Clock>,
        journal_type: JournalType,
        parent: Commit,
        max_entries_per_node: usize,
    ) -> Self {
        Self {
            graph,
            clock,
            journal_type,
            parents: vec![parent],
            pending: BTreeMap::new(),
            max_entries_per_node,
        }
    }

    /// Open a merge journal whose commit will carry both parents.
    ///
    /// The pending changes are applied to `base`'s tree; committing removes
    /// both parents from the head set.
    pub fn new_merge(
        graph: Arc<CommitGraph>,
        clock: Arc<dyn Clock>,
        base: Commit,
        other: Commit,
        max_entries_per_node: usize,
    ) -> Self {
        Self {
            graph,
            clock,
            journal_type: JournalType::Implicit,
            parents: vec![base, other],
            pending: BTreeMap::new(),
            max_entries_per_node,
        }
    }

    /// How this journal was opened.
    pub fn journal_type(&self) -> JournalType {
        self.journal_type
    }

    /// The commit this journal's changes apply against.
    pub fn parent(&self) -> &Commit {
        &self.parents[0]
    }

    /// Number of pending mutations (per key; later writes replace earlier).
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no mutations are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record a put of `key` → the value object `object_id`.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, object_id: ObjectId, priority: KeyPriority) {
        self.pending.insert(
            key.into(),
            Pending::Put {
                object_id,
                priority,
            },
        );
    }

    /// Record a deletion of `key`.
    ///
    /// Fails with [`JournalError::KeyNotFound`] if the key is neither
    /// pending in this journal nor present in the parent's tree.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> JournalResult<()> {
        let key = key.into();
        match self.pending.get(&key) {
            Some(Pending::Put { .. }) => {}
            Some(Pending::Delete) => return Err(JournalError::KeyNotFound),
            None => {
                let store = self.graph.store();
                let in_parent =
                    quire_btree::get_entry(&**store, self.parents[0].root_id(), &key)?;
                if in_parent.is_none() {
                    return Err(JournalError::KeyNotFound);
                }
            }
        }
        self.pending.insert(key, Pending::Delete);
        Ok(())
    }

    /// The pending mutations as a key-sorted change stream.
    pub fn changes(&self) -> Vec<EntryChange> {
        self.pending
            .iter()
            .map(|(key, pending)| match pending {
                Pending::Put {
                    object_id,
                    priority,
                } => EntryChange::put(Entry::new(key.clone(), *object_id, *priority)),
                Pending::Delete => EntryChange::delete(Entry::new(
                    key.clone(),
                    ObjectId::null(),
                    KeyPriority::Eager,
                )),
            })
            .collect()
    }

    /// Apply the pending mutations and produce a new commit.
    ///
    /// On success the head set has swapped the parent(s) for the new commit
    /// and watchers have been notified. On failure the journal is gone, the
    /// pending mutations are discarded and the heads are untouched.
    pub fn commit(self) -> JournalResult<Commit> {
        let store = self.graph.store().clone();
        let (new_root, _new_nodes) = apply_changes(
            &*store,
            self.parents[0].root_id(),
            self.max_entries_per_node,
            self.changes(),
        )?;
        let commit = Commit::from_parents(new_root, &self.parents, self.clock.now_ms());
        self.graph.record_commit(commit.clone())?;
        debug!(
            commit = %commit.id().short_hex(),
            mutations = self.pending.len(),
            journal_type = ?self.journal_type,
            "journal committed"
        );
        Ok(commit)
    }

    /// Discard the journal without committing. Always succeeds.
    pub fn rollback(self) {
        debug!(
            mutations = self.pending.len(),
            journal_type = ?self.journal_type,
            "journal rolled back"
        );
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("type", &self.journal_type)
            .field("parent", &self.parents[0].id())
            .field("pending", &self.pending.len())
            .finish()
    }
}
