use quire_types::KeyPriority;

use crate::snapshot::Snapshot;
use crate::value::Value;

/// Handle identifying a watcher registered on a branch tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageWatcherId(pub(crate) u64);

/// A watcher's response to a delivery.
///
/// `Ack` completes the delivery immediately; `Defer` leaves it in flight
/// until the client calls `Page::acknowledge_watcher`, during which further
/// head advances coalesce into the next notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherAck {
    Ack { request_snapshot: bool },
    Defer,
}

impl WatcherAck {
    /// Plain acknowledgement with no snapshot request.
    pub fn ack() -> Self {
        WatcherAck::Ack {
            request_snapshot: false,
        }
    }
}

/// Observer of one page handle's branch.
///
/// Deliveries are strictly ordered per watcher: the initial state first,
/// then one `on_change` per acknowledged advancement of the branch head.
pub trait PageWatcher: Send + Sync {
    /// Fired once at registration with a snapshot of the base commit.
    fn on_initial_state(&self, snapshot: Snapshot) -> WatcherAck;

    /// Fired for each committed advancement of the branch head (possibly
    /// coalescing several commits into one delivery).
    fn on_change(&self, change: PageChange) -> WatcherAck;

    /// Delivers the snapshot requested by an acknowledgement, bound to the
    /// commit that was just delivered.
    fn on_snapshot(&self, _snapshot: Snapshot) {}
}

/// The difference delivered to a watcher when its branch advances.
#[derive(Clone, Debug)]
pub struct PageChange {
    /// Timestamp of the commit this change leads to (milliseconds).
    pub timestamp: i64,
    /// Added or updated entries, in ascending key order.
    pub changes: Vec<ChangedEntry>,
    /// Deleted keys, in ascending key order.
    pub deleted_keys: Vec<Vec<u8>>,
}

impl PageChange {
    /// Returns `true` if the change carries no mutations.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.deleted_keys.is_empty()
    }
}

/// One added or updated entry in a [`PageChange`].
#[derive(Clone, Debug)]
pub struct ChangedEntry {
    pub key: Vec<u8>,
    pub value: Value,
    pub priority: KeyPriority,
}
