use std::collections::HashMap;
use std::sync::RwLock;

use quire_types::ObjectId;

use crate::error::StoreResult;
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access across pages.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total payload bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|obj| obj.size())
            .sum()
    }

    /// Return a sorted list of all object ids in the store.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let mut map = self.objects.write().expect("lock poisoned");
        // Idempotent: if already present, keep the existing bytes.
        map.entry(id).or_insert_with(|| object.clone());
        Ok(id)
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::object::ObjectKind;

    fn value(content: &[u8]) -> StoredObject {
        StoredObject::new(ObjectKind::Value, content.to_vec())
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let store = InMemoryObjectStore::new();
        let obj = value(b"hello world");
        let id = store.put(&obj).unwrap();

        let read_back = store.get(&id).unwrap().expect("should exist");
        assert_eq!(read_back, obj);
    }

    #[test]
    fn get_missing_returns_none() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_bytes(b"missing");
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn contains_tracks_presence() {
        let store = InMemoryObjectStore::new();
        let id = store.put(&value(b"present")).unwrap();
        assert!(store.contains(&id).unwrap());
        assert!(!store.contains(&ObjectId::from_bytes(b"absent")).unwrap());
    }

    // -----------------------------------------------------------------------
    // Content addressing
    // -----------------------------------------------------------------------

    #[test]
    fn same_content_produces_same_id() {
        let store = InMemoryObjectStore::new();
        let id1 = store.put(&value(b"identical content")).unwrap();
        let id2 = store.put(&value(b"identical content")).unwrap();
        assert_eq!(id1, id2);
        // Only one object stored (dedup).
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn different_content_produces_different_ids() {
        let store = InMemoryObjectStore::new();
        let id1 = store.put(&value(b"aaa")).unwrap();
        let id2 = store.put(&value(b"bbb")).unwrap();
        assert_ne!(id1, id2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn put_is_idempotent() {
        let store = InMemoryObjectStore::new();
        let obj = value(b"idempotent");
        let id1 = store.put(&obj).unwrap();
        let id2 = store.put(&obj).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stored_object_hash_matches_id() {
        let store = InMemoryObjectStore::new();
        let id = store.put(&value(b"verify me")).unwrap();
        let read_back = store.get(&id).unwrap().unwrap();
        assert_eq!(read_back.compute_id(), id);
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    #[test]
    fn put_from_reader_matches_put() {
        let store = InMemoryObjectStore::new();
        let content = b"streamed value";
        let mut reader = &content[..];
        let streamed = store
            .put_from_reader(ObjectKind::Value, &mut reader, content.len() as u64)
            .unwrap();
        let direct = store.put(&value(content)).unwrap();
        assert_eq!(streamed, direct);
    }

    #[test]
    fn put_from_reader_short_stream_fails() {
        let store = InMemoryObjectStore::new();
        let mut reader = &b"abc"[..];
        let err = store
            .put_from_reader(ObjectKind::Value, &mut reader, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::SizeMismatch {
                expected: 10,
                actual: 3
            }
        ));
    }

    #[test]
    fn put_from_reader_long_stream_fails() {
        let store = InMemoryObjectStore::new();
        let mut reader = &b"too many bytes"[..];
        let err = store
            .put_from_reader(ObjectKind::Value, &mut reader, 3)
            .unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { expected: 3, .. }));
    }

    #[test]
    fn get_stream_reads_payload() {
        let store = InMemoryObjectStore::new();
        let id = store.put(&value(b"stream me")).unwrap();
        let mut reader = store.get_stream(&id).unwrap().expect("should exist");
        let mut content = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut content).unwrap();
        assert_eq!(content, b"stream me");
    }

    // -----------------------------------------------------------------------
    // Utility methods
    // -----------------------------------------------------------------------

    #[test]
    fn len_total_bytes_and_all_ids() {
        let store = InMemoryObjectStore::new();
        assert!(store.is_empty());

        store.put(&value(b"12345")).unwrap();
        store.put(&value(b"123456789")).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_bytes(), 14);

        let ids = store.all_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    }

    // -----------------------------------------------------------------------
    // Concurrent read safety
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::new());
        let id = store.put(&value(b"shared data")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let obj = store.get(&id).unwrap().unwrap();
                    assert_eq!(obj.compute_id(), id);
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }
}
