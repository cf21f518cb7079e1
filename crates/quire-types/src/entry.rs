use serde::{Deserialize, Serialize};

use crate::id::ObjectId;

/// The priority at which a value must be available locally.
///
/// `Eager` values are pre-fetched whenever the entry is reachable from a
/// head; `Lazy` values may be fetched on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPriority {
    Eager,
    Lazy,
}

/// An entry in a commit's key→value map.
///
/// The value itself lives in the object store; the entry carries its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Opaque byte-string key. Keys are unique within a tree.
    pub key: Vec<u8>,
    /// Id of the value object in the object store.
    pub object_id: ObjectId,
    /// Availability hint for the value object.
    pub priority: KeyPriority,
}

impl Entry {
    /// Create a new entry.
    pub fn new(key: impl Into<Vec<u8>>, object_id: ObjectId, priority: KeyPriority) -> Self {
        Self {
            key: key.into(),
            object_id,
            priority,
        }
    }
}

/// A single element of the difference between two commit contents.
///
/// `deleted == false` covers both additions and updates; the receiver
/// distinguishes them by whether the key was present on its side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryChange {
    pub entry: Entry,
    pub deleted: bool,
}

impl EntryChange {
    /// An insertion or update of `entry`.
    pub fn put(entry: Entry) -> Self {
        Self {
            entry,
            deleted: false,
        }
    }

    /// A deletion of `entry`'s key.
    pub fn delete(entry: Entry) -> Self {
        Self {
            entry,
            deleted: true,
        }
    }
}

/// Where a batch of new commits came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeSource {
    /// Committed by a local writer on this page.
    Local,
    /// Ingested from a remote backend.
    Sync,
}

/// How a journal was opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JournalType {
    /// Created internally to wrap a single mutation; auto-committed.
    Implicit,
    /// Opened by the client; requires a matching commit or rollback.
    Explicit,
}
