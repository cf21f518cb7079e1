use std::io::Read;
use std::sync::Arc;

use quire_graph::{CommitGraph, CommitWatcher, WatcherId};
use quire_journal::Journal;
use quire_store::{ObjectKind, ObjectStore, StoredObject};
use quire_types::{Clock, CommitId, JournalType, KeyPriority, PageId};

use crate::config::PageConfig;
use crate::error::{PageError, PageResult};
use crate::snapshot::Snapshot;
use crate::tracker::BranchTracker;
use crate::value::Reference;
use crate::watcher::{PageWatcher, PageWatcherId};

/// The shared per-page engine state: object store, commit graph, clock and
/// configuration. Any number of [`Page`] handles can be opened on one core.
pub struct PageCore {
    id: PageId,
    graph: Arc<CommitGraph>,
    clock: Arc<dyn Clock>,
    config: PageConfig,
}

impl PageCore {
    /// Open (or create) the page `id` over `store`.
    pub fn open(
        id: PageId,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        config: PageConfig,
    ) -> PageResult<Arc<Self>> {
        let graph = CommitGraph::open(store)?;
        Ok(Arc::new(Self {
            id,
            graph,
            clock,
            config,
        }))
    }

    /// This page's id.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// The page's commit graph.
    pub fn graph(&self) -> &Arc<CommitGraph> {
        &self.graph
    }

    /// The object store backing this page.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        self.graph.store()
    }

    /// The clock commits are stamped with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The page's storage tunables.
    pub fn config(&self) -> PageConfig {
        self.config
    }
}

/// A client handle onto a page.
///
/// Each handle follows one branch of the page through its own
/// [`BranchTracker`] and owns at most one explicit transaction at a time.
/// Mutations outside a transaction are wrapped in an implicit journal and
/// committed immediately.
pub struct Page {
    core: Arc<PageCore>,
    tracker: Arc<BranchTracker>,
    tracker_registration: WatcherId,
    journal: Option<Journal>,
}

impl Page {
    /// Open a new handle on `core`.
    pub fn new(core: Arc<PageCore>) -> PageResult<Self> {
        let tracker = BranchTracker::new(core.graph().clone(), core.config())?;
        let as_watcher: Arc<dyn CommitWatcher> = tracker.clone();
        let tracker_registration = core.graph().add_commit_watcher(&as_watcher);
        Ok(Self {
            core,
            tracker,
            tracker_registration,
            journal: None,
        })
    }

    /// This page's id.
    pub fn id(&self) -> PageId {
        self.core.id()
    }

    /// The branch tracker of this handle.
    pub fn tracker(&self) -> &Arc<BranchTracker> {
        &self.tracker
    }

    /// The commit this handle currently operates against: the open
    /// transaction's parent if one exists, else the branch head.
    fn current_commit_id(&self) -> CommitId {
        match &self.journal {
            Some(journal) => journal.parent().id(),
            None => self.tracker.branch_head(),
        }
    }

    /// Bind a snapshot to the current commit.
    pub fn get_snapshot(&self) -> PageResult<Snapshot> {
        let commit = self.core.graph().get_commit(&self.current_commit_id())?;
        Ok(Snapshot::new(
            self.core.store().clone(),
            commit,
            self.core.config(),
        ))
    }

    /// Register a watcher on this handle's branch; it receives an initial
    /// snapshot, then one change per acknowledged head advancement.
    pub fn watch(&self, watcher: Arc<dyn PageWatcher>) -> PageResult<PageWatcherId> {
        self.tracker.register_watcher(watcher)
    }

    /// Complete a watcher's deferred acknowledgement.
    pub fn acknowledge_watcher(
        &self,
        id: PageWatcherId,
        request_snapshot: bool,
    ) -> PageResult<()> {
        self.tracker.acknowledge(id, request_snapshot)
    }

    /// Remove a watcher from this handle.
    pub fn unwatch(&self, id: PageWatcherId) {
        self.tracker.remove_watcher(id);
    }

    // -----------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------

    /// Store `value` under `key` with eager priority.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> PageResult<()> {
        self.put_with_priority(key, value, KeyPriority::Eager)
    }

    /// Store `value` under `key`.
    pub fn put_with_priority(
        &mut self,
        key: &[u8],
        value: &[u8],
        priority: KeyPriority,
    ) -> PageResult<()> {
        let object_id = self
            .core
            .store()
            .put(&StoredObject::new(ObjectKind::Value, value.to_vec()))?;
        self.run_in_transaction(|journal| {
            journal.put(key, object_id, priority);
            Ok(())
        })
    }

    /// Bind `key` to an already-stored value object.
    ///
    /// Fails with [`PageError::ReferenceNotFound`] if the referenced object
    /// is not in the store.
    pub fn put_reference(
        &mut self,
        key: &[u8],
        reference: &Reference,
        priority: KeyPriority,
    ) -> PageResult<()> {
        if !self.core.store().contains(&reference.object_id())? {
            return Err(PageError::ReferenceNotFound);
        }
        let object_id = reference.object_id();
        self.run_in_transaction(|journal| {
            journal.put(key, object_id, priority);
            Ok(())
        })
    }

    /// Delete `key`. Fails with [`PageError::KeyNotFound`] if the key is not
    /// present in the current view.
    pub fn delete(&mut self, key: &[u8]) -> PageResult<()> {
        self.run_in_transaction(|journal| journal.delete(key).map_err(PageError::from))
    }

    /// Stream exactly `size` bytes into the object store and return an
    /// opaque reference to the stored value.
    pub fn create_reference(
        &self,
        size: u64,
        data: &mut dyn Read,
    ) -> PageResult<Reference> {
        let object_id = self
            .core
            .store()
            .put_from_reader(ObjectKind::Value, data, size)?;
        Ok(Reference::from_object_id(object_id))
    }

    // -----------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------

    /// Open an explicit transaction on the current branch head.
    pub fn start_transaction(&mut self) -> PageResult<()> {
        if self.journal.is_some() {
            return Err(PageError::TransactionAlreadyInProgress);
        }
        self.tracker.set_transaction_in_progress(true);
        let parent = self.core.graph().get_commit(&self.tracker.branch_head())?;
        self.journal = Some(Journal::new(
            self.core.graph().clone(),
            self.core.clock().clone(),
            JournalType::Explicit,
            parent,
            self.core.config().max_entries_per_node,
        ));
        Ok(())
    }

    /// Commit the open explicit transaction.
    pub fn commit(&mut self) -> PageResult<()> {
        let journal = self
            .journal
            .take()
            .ok_or(PageError::NoTransactionInProgress)?;
        let result = journal.commit();
        self.tracker.set_transaction_in_progress(false);
        match result {
            Ok(commit) => {
                self.tracker.set_branch_head(&commit.id());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Discard the open explicit transaction.
    pub fn rollback(&mut self) -> PageResult<()> {
        let journal = self
            .journal
            .take()
            .ok_or(PageError::NoTransactionInProgress)?;
        journal.rollback();
        self.tracker.set_transaction_in_progress(false);
        Ok(())
    }

    /// Run `mutate` against the open transaction, or wrap it in an implicit
    /// journal committed immediately. A failed implicit journal is rolled
    /// back and nothing is committed.
    fn run_in_transaction(
        &mut self,
        mutate: impl FnOnce(&mut Journal) -> PageResult<()>,
    ) -> PageResult<()> {
        if let Some(journal) = self.journal.as_mut() {
            // A mutation error inside an explicit transaction does not roll
            // it back; the client decides.
            return mutate(journal);
        }

        let parent = self.core.graph().get_commit(&self.tracker.branch_head())?;
        let mut journal = Journal::new(
            self.core.graph().clone(),
            self.core.clock().clone(),
            JournalType::Implicit,
            parent,
            self.core.config().max_entries_per_node,
        );
        match mutate(&mut journal) {
            Ok(()) => self.commit_journal(journal),
            Err(e) => {
                journal.rollback();
                Err(e)
            }
        }
    }

    fn commit_journal(&mut self, journal: Journal) -> PageResult<()> {
        let commit = journal.commit()?;
        self.tracker.set_branch_head(&commit.id());
        Ok(())
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.core
            .graph()
            .remove_commit_watcher(self.tracker_registration);
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.core.id())
            .field("transaction_open", &self.journal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use quire_store::InMemoryObjectStore;
    use quire_types::{ManualClock, ID_SIZE};

    use crate::value::Value;
    use crate::watcher::{PageChange, WatcherAck};

    fn test_config() -> PageConfig {
        PageConfig {
            max_entries_per_node: 4,
            max_inline_value_size: 64,
            max_fetch_entries: 100,
        }
    }

    fn open_core_with(config: PageConfig) -> Arc<PageCore> {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000));
        PageCore::open(PageId::from_raw([b'a'; ID_SIZE]), store, clock, config).unwrap()
    }

    fn open_core() -> Arc<PageCore> {
        open_core_with(test_config())
    }

    fn inline_bytes(value: &Value) -> &[u8] {
        value.bytes().expect("value should be inlined")
    }

    // -----------------------------------------------------------------
    // Basic operations
    // -----------------------------------------------------------------

    #[test]
    fn get_id() {
        let core = open_core();
        let page = Page::new(core).unwrap();
        assert_eq!(page.id(), PageId::from_raw([b'a'; ID_SIZE]));
    }

    #[test]
    fn put_then_read_back_through_snapshot() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        page.put(b"some_key", b"a small value").unwrap();

        let snapshot = page.get_snapshot().unwrap();
        let value = snapshot.get(b"some_key").unwrap().expect("key present");
        assert_eq!(inline_bytes(&value), b"a small value");

        // The implicit commit stored the entry with eager priority.
        let (entries, token) = snapshot.get_entries(b"", None).unwrap();
        assert!(token.is_none());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, b"some_key");
        assert_eq!(entries[0].priority, KeyPriority::Eager);
    }

    #[test]
    fn put_reference_binds_existing_object() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        let reference = page
            .create_reference(13, &mut &b"a small value"[..])
            .unwrap();

        page.put_reference(b"some_key", &reference, KeyPriority::Lazy)
            .unwrap();

        let snapshot = page.get_snapshot().unwrap();
        let (entries, _) = snapshot.get_entries(b"", None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].priority, KeyPriority::Lazy);
        assert_eq!(inline_bytes(&entries[0].value), b"a small value");
    }

    #[test]
    fn put_reference_to_missing_object_fails() {
        let core = open_core();
        let mut page = Page::new(core.clone()).unwrap();
        let bogus = Reference::from_object_id(quire_types::ObjectId::from_bytes(b"nope"));

        let err = page
            .put_reference(b"some_key", &bogus, KeyPriority::Eager)
            .unwrap_err();
        assert_eq!(err, PageError::ReferenceNotFound);
        // No commit was added.
        assert_eq!(
            core.graph().head_ids(),
            vec![core.graph().root_commit().id()]
        );
    }

    #[test]
    fn delete_existing_key() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        page.put(b"some_key", b"v").unwrap();
        page.delete(b"some_key").unwrap();

        let snapshot = page.get_snapshot().unwrap();
        assert!(snapshot.get(b"some_key").unwrap().is_none());
    }

    #[test]
    fn delete_missing_key_fails_without_commit() {
        let core = open_core();
        let mut page = Page::new(core.clone()).unwrap();
        let err = page.delete(b"missing").unwrap_err();
        assert_eq!(err, PageError::KeyNotFound);
        assert_eq!(
            core.graph().head_ids(),
            vec![core.graph().root_commit().id()]
        );
    }

    #[test]
    fn create_reference_size_mismatch_is_io_error() {
        let core = open_core();
        let page = Page::new(core).unwrap();
        let err = page
            .create_reference(100, &mut &b"short"[..])
            .unwrap_err();
        assert!(matches!(err, PageError::Io(_)));
    }

    // -----------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------

    #[test]
    fn transaction_commit_applies_all_mutations() {
        let core = open_core();
        let mut page = Page::new(core.clone()).unwrap();
        let reference = page.create_reference(4, &mut &b"refd"[..]).unwrap();

        page.start_transaction().unwrap();
        page.put(b"some_key1", b"a small value").unwrap();
        page.put_reference(b"some_key2", &reference, KeyPriority::Lazy)
            .unwrap();
        page.delete(b"some_key2").unwrap();

        // Nothing committed yet.
        assert_eq!(
            core.graph().head_ids(),
            vec![core.graph().root_commit().id()]
        );

        page.commit().unwrap();

        let snapshot = page.get_snapshot().unwrap();
        let (keys, token) = snapshot.get_keys(b"", None).unwrap();
        assert!(token.is_none());
        assert_eq!(keys, vec![b"some_key1".to_vec()]);
        assert_ne!(
            core.graph().head_ids(),
            vec![core.graph().root_commit().id()]
        );
    }

    #[test]
    fn rollback_discards_everything() {
        let core = open_core();
        let mut page = Page::new(core.clone()).unwrap();
        let heads_before = core.graph().head_ids();

        page.start_transaction().unwrap();
        page.put(b"some_key", b"v").unwrap();
        page.rollback().unwrap();

        assert_eq!(core.graph().head_ids(), heads_before);
        // A second rollback has no transaction to act on.
        assert_eq!(
            page.rollback().unwrap_err(),
            PageError::NoTransactionInProgress
        );
    }

    #[test]
    fn nested_transaction_is_rejected() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        page.start_transaction().unwrap();
        assert_eq!(
            page.start_transaction().unwrap_err(),
            PageError::TransactionAlreadyInProgress
        );
    }

    #[test]
    fn commit_without_transaction_is_rejected() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        assert_eq!(
            page.commit().unwrap_err(),
            PageError::NoTransactionInProgress
        );
    }

    #[test]
    fn snapshot_inside_transaction_binds_to_parent() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        page.put(b"k", b"v1").unwrap();

        page.start_transaction().unwrap();
        page.put(b"k", b"v2").unwrap();

        // The transaction's view of the page is its parent commit.
        let snapshot = page.get_snapshot().unwrap();
        let value = snapshot.get(b"k").unwrap().unwrap();
        assert_eq!(inline_bytes(&value), b"v1");

        page.commit().unwrap();
        let snapshot = page.get_snapshot().unwrap();
        let value = snapshot.get(b"k").unwrap().unwrap();
        assert_eq!(inline_bytes(&value), b"v2");
    }

    // -----------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------

    #[test]
    fn large_values_come_back_as_handles() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        let big = vec![b'a'; 65];
        page.put(b"some_key", &big).unwrap();

        let snapshot = page.get_snapshot().unwrap();
        let value = snapshot.get(b"some_key").unwrap().unwrap();
        let handle = value.handle().expect("value should be a handle");
        assert_eq!(handle.size, 65);

        let mut reader = snapshot.stream_value(handle).unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, big);
    }

    #[test]
    fn get_partial_slices_the_value() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        page.put(b"some_key", b"a small value").unwrap();

        let snapshot = page.get_snapshot().unwrap();
        let slice = snapshot.get_partial(b"some_key", 2, 5).unwrap().unwrap();
        assert_eq!(slice, b"small");

        // Offset past the end yields an empty slice, not an error.
        let empty = snapshot.get_partial(b"some_key", 100, 5).unwrap().unwrap();
        assert!(empty.is_empty());
        assert!(snapshot.get_partial(b"missing", 0, 5).unwrap().is_none());
    }

    #[test]
    fn listings_paginate_with_tokens() {
        let mut config = test_config();
        config.max_fetch_entries = 2;
        let core = open_core_with(config);
        let mut page = Page::new(core).unwrap();
        for i in 0..5 {
            page.put(format!("key{i}").as_bytes(), b"v").unwrap();
        }

        let snapshot = page.get_snapshot().unwrap();
        let mut keys = Vec::new();
        let mut token = None;
        let mut pages = 0;
        loop {
            let (batch, next) = snapshot.get_keys(b"", token.as_ref()).unwrap();
            keys.extend(batch);
            pages += 1;
            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(pages, 3);
        let expected: Vec<Vec<u8>> = (0..5).map(|i| format!("key{i}").into_bytes()).collect();
        assert_eq!(keys, expected);
    }

    // -----------------------------------------------------------------
    // Watchers
    // -----------------------------------------------------------------

    struct TestWatcher {
        initial_keys: Mutex<Vec<Vec<Vec<u8>>>>,
        changes: Mutex<Vec<PageChange>>,
        snapshots: Mutex<Vec<CommitId>>,
        change_ack: WatcherAck,
    }

    impl TestWatcher {
        fn new(change_ack: WatcherAck) -> Arc<Self> {
            Arc::new(Self {
                initial_keys: Mutex::new(Vec::new()),
                changes: Mutex::new(Vec::new()),
                snapshots: Mutex::new(Vec::new()),
                change_ack,
            })
        }

        fn change_count(&self) -> usize {
            self.changes.lock().unwrap().len()
        }
    }

    impl PageWatcher for TestWatcher {
        fn on_initial_state(&self, snapshot: Snapshot) -> WatcherAck {
            let (keys, _) = snapshot.get_keys(b"", None).unwrap();
            self.initial_keys.lock().unwrap().push(keys);
            WatcherAck::ack()
        }

        fn on_change(&self, change: PageChange) -> WatcherAck {
            self.changes.lock().unwrap().push(change);
            self.change_ack
        }

        fn on_snapshot(&self, snapshot: Snapshot) {
            self.snapshots.lock().unwrap().push(snapshot.commit_id());
        }
    }

    #[test]
    fn watcher_receives_initial_state_then_changes() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        page.put(b"existing", b"before").unwrap();

        let watcher = TestWatcher::new(WatcherAck::ack());
        page.watch(watcher.clone()).unwrap();
        assert_eq!(
            watcher.initial_keys.lock().unwrap()[0],
            vec![b"existing".to_vec()]
        );

        page.put(b"some_key", b"a small value").unwrap();
        page.delete(b"existing").unwrap();

        let changes = watcher.changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].changes.len(), 1);
        assert_eq!(changes[0].changes[0].key, b"some_key");
        assert_eq!(
            inline_bytes(&changes[0].changes[0].value),
            b"a small value"
        );
        assert_eq!(changes[1].deleted_keys, vec![b"existing".to_vec()]);
    }

    #[test]
    fn deferred_watcher_coalesces_advances() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        let watcher = TestWatcher::new(WatcherAck::Defer);
        let id = page.watch(watcher.clone()).unwrap();

        page.put(b"key1", b"v1").unwrap();
        assert_eq!(watcher.change_count(), 1);

        // Deliveries stall while the first change is unacknowledged.
        page.put(b"key2", b"v2").unwrap();
        page.put(b"key3", b"v3").unwrap();
        assert_eq!(watcher.change_count(), 1);

        // Acknowledging drains the backlog as one combined change.
        page.acknowledge_watcher(id, false).unwrap();
        let changes = watcher.changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        let combined: Vec<&[u8]> = changes[1]
            .changes
            .iter()
            .map(|c| c.key.as_slice())
            .collect();
        assert_eq!(combined, vec![&b"key2"[..], &b"key3"[..]]);
    }

    #[test]
    fn transaction_suppresses_watchers_until_commit() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        let watcher = TestWatcher::new(WatcherAck::ack());
        page.watch(watcher.clone()).unwrap();

        page.start_transaction().unwrap();
        page.put(b"key1", b"v1").unwrap();
        page.put(b"key2", b"v2").unwrap();
        assert_eq!(watcher.change_count(), 0);

        page.commit().unwrap();
        let changes = watcher.changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].changes.len(), 2);
    }

    #[test]
    fn acknowledgement_can_request_a_snapshot() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        let watcher = TestWatcher::new(WatcherAck::Ack {
            request_snapshot: true,
        });
        page.watch(watcher.clone()).unwrap();

        page.put(b"some_key", b"v").unwrap();

        let snapshots = watcher.snapshots.lock().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0], page.tracker().branch_head());
    }

    #[test]
    fn removed_watcher_gets_nothing() {
        let core = open_core();
        let mut page = Page::new(core).unwrap();
        let watcher = TestWatcher::new(WatcherAck::ack());
        let id = page.watch(watcher.clone()).unwrap();
        page.unwatch(id);

        page.put(b"some_key", b"v").unwrap();
        assert_eq!(watcher.change_count(), 0);
    }

    // -----------------------------------------------------------------
    // Multiple handles
    // -----------------------------------------------------------------

    #[test]
    fn second_handle_follows_the_same_branch() {
        let core = open_core();
        let mut writer = Page::new(core.clone()).unwrap();
        let reader = Page::new(core).unwrap();

        writer.put(b"k", b"v").unwrap();

        // The reader's tracker adopted the writer's commit.
        let snapshot = reader.get_snapshot().unwrap();
        let value = snapshot.get(b"k").unwrap().unwrap();
        assert_eq!(inline_bytes(&value), b"v");
    }

    #[test]
    fn parallel_transactions_diverge_into_two_heads() {
        let core = open_core();
        let mut a = Page::new(core.clone()).unwrap();
        let mut b = Page::new(core.clone()).unwrap();

        a.start_transaction().unwrap();
        b.start_transaction().unwrap();
        a.put(b"k", b"v1").unwrap();
        b.put(b"k", b"v2").unwrap();
        a.commit().unwrap();
        b.commit().unwrap();

        // Divergent branches: two heads, and each handle keeps its own view.
        assert_eq!(core.graph().head_count(), 2);
        let value_a = a.get_snapshot().unwrap().get(b"k").unwrap().unwrap();
        let value_b = b.get_snapshot().unwrap().get(b"k").unwrap().unwrap();
        assert_eq!(inline_bytes(&value_a), b"v1");
        assert_eq!(inline_bytes(&value_b), b"v2");
    }
}
