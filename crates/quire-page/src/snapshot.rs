use std::io::Read;
use std::sync::Arc;

use quire_btree::{for_each_entry, get_entry};
use quire_graph::Commit;
use quire_store::ObjectStore;
use quire_types::{CommitId, Entry, KeyPriority};

use crate::config::PageConfig;
use crate::error::{PageError, PageResult};
use crate::value::{Value, ValueHandle};

/// Continuation token for paginated snapshot listings; opaque to clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageToken(pub(crate) Vec<u8>);

/// One entry of a snapshot listing.
#[derive(Clone, Debug)]
pub struct SnapshotEntry {
    pub key: Vec<u8>,
    pub value: Value,
    pub priority: KeyPriority,
}

/// A read-only view of a page bound to one commit.
///
/// Snapshots stay valid for as long as they are held: the tree and value
/// objects they reference are immutable.
pub struct Snapshot {
    store: Arc<dyn ObjectStore>,
    commit: Commit,
    config: PageConfig,
}

impl Snapshot {
    pub(crate) fn new(store: Arc<dyn ObjectStore>, commit: Commit, config: PageConfig) -> Self {
        Self {
            store,
            commit,
            config,
        }
    }

    /// The commit this snapshot is bound to.
    pub fn commit_id(&self) -> CommitId {
        self.commit.id()
    }

    /// Look up `key`. Values at or below the inline threshold come back as
    /// bytes, larger ones as a streaming handle.
    pub fn get(&self, key: &[u8]) -> PageResult<Option<Value>> {
        let Some(entry) = get_entry(&*self.store, self.commit.root_id(), key)? else {
            return Ok(None);
        };
        self.load_value(&entry).map(Some)
    }

    /// Read at most `max_size` bytes of `key`'s value starting at `offset`.
    pub fn get_partial(
        &self,
        key: &[u8],
        offset: u64,
        max_size: u64,
    ) -> PageResult<Option<Vec<u8>>> {
        let Some(entry) = get_entry(&*self.store, self.commit.root_id(), key)? else {
            return Ok(None);
        };
        let object = self
            .store
            .get(&entry.object_id)?
            .ok_or_else(|| missing_value(&entry))?;
        let start = (offset as usize).min(object.data.len());
        let end = start.saturating_add(max_size as usize).min(object.data.len());
        Ok(Some(object.data[start..end].to_vec()))
    }

    /// List entries with key >= `min_key`, at most a page at a time.
    ///
    /// A returned token means more entries follow; pass it back to continue.
    pub fn get_entries(
        &self,
        min_key: &[u8],
        token: Option<&PageToken>,
    ) -> PageResult<(Vec<SnapshotEntry>, Option<PageToken>)> {
        let (raw, next) = self.list_page(min_key, token)?;
        let mut entries = Vec::with_capacity(raw.len());
        for entry in raw {
            let value = self.load_value(&entry)?;
            entries.push(SnapshotEntry {
                key: entry.key,
                value,
                priority: entry.priority,
            });
        }
        Ok((entries, next))
    }

    /// List keys >= `min_key`, at most a page at a time.
    pub fn get_keys(
        &self,
        min_key: &[u8],
        token: Option<&PageToken>,
    ) -> PageResult<(Vec<Vec<u8>>, Option<PageToken>)> {
        let (raw, next) = self.list_page(min_key, token)?;
        Ok((raw.into_iter().map(|e| e.key).collect(), next))
    }

    /// Open a streaming reader over a large value.
    pub fn stream_value(&self, handle: &ValueHandle) -> PageResult<Box<dyn Read + Send>> {
        self.store
            .get_stream(&handle.object_id)?
            .ok_or(PageError::NotFound)
    }

    /// Collect up to one page of raw entries starting at the token (or
    /// `min_key`); the token of the following page is the first key left out.
    fn list_page(
        &self,
        min_key: &[u8],
        token: Option<&PageToken>,
    ) -> PageResult<(Vec<Entry>, Option<PageToken>)> {
        let start = token.map(|t| t.0.as_slice()).unwrap_or(min_key);
        let limit = self.config.max_fetch_entries;
        let mut entries: Vec<Entry> = Vec::new();
        let mut next = None;
        for_each_entry(&*self.store, self.commit.root_id(), start, |entry| {
            if entries.len() == limit {
                next = Some(PageToken(entry.key.clone()));
                return false;
            }
            entries.push(entry.clone());
            true
        })?;
        Ok((entries, next))
    }

    fn load_value(&self, entry: &Entry) -> PageResult<Value> {
        let object = self
            .store
            .get(&entry.object_id)?
            .ok_or_else(|| missing_value(entry))?;
        if object.data.len() <= self.config.max_inline_value_size {
            Ok(Value::Bytes(object.data))
        } else {
            Ok(Value::Handle(ValueHandle {
                object_id: entry.object_id,
                size: object.size(),
            }))
        }
    }
}

fn missing_value(entry: &Entry) -> PageError {
    PageError::Internal(format!(
        "value object {} missing for key {:?}",
        entry.object_id,
        String::from_utf8_lossy(&entry.key)
    ))
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("commit", &self.commit.id())
            .finish()
    }
}
