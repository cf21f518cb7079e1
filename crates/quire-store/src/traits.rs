use std::io::Read;

use quire_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same bytes always produce the same id.
/// - Writes are atomic or idempotent; a concurrent duplicate put of the same
///   content must not corrupt the stored bytes.
/// - Concurrent reads are always safe (objects are immutable).
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed id.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed id.
    ///
    /// If the object already exists this is a no-op (idempotent).
    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn contains(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Stream a value of exactly `size` bytes into the store.
    ///
    /// Fails with [`StoreError::SizeMismatch`] if the stream yields a
    /// different number of bytes. Backends may override to avoid buffering
    /// the whole value in memory.
    fn put_from_reader(
        &self,
        kind: ObjectKind,
        reader: &mut dyn Read,
        size: u64,
    ) -> StoreResult<ObjectId> {
        let mut data = Vec::with_capacity(size.min(1 << 20) as usize);
        // Read one byte past the declared size so an over-long stream is
        // detected, not silently truncated.
        reader.take(size + 1).read_to_end(&mut data)?;
        if data.len() as u64 != size {
            return Err(StoreError::SizeMismatch {
                expected: size,
                actual: data.len() as u64,
            });
        }
        self.put(&StoredObject::new(kind, data))
    }

    /// Open a streaming reader over an object's payload.
    ///
    /// Returns `Ok(None)` if the object does not exist. The default
    /// implementation buffers the payload; file-backed stores may override
    /// with a real file handle.
    fn get_stream(&self, id: &ObjectId) -> StoreResult<Option<Box<dyn Read + Send>>> {
        Ok(self
            .get(id)?
            .map(|obj| Box::new(std::io::Cursor::new(obj.data)) as Box<dyn Read + Send>))
    }
}
