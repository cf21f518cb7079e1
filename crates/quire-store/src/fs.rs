use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use quire_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

const READ_CHUNK: usize = 8192;

/// Flat, file-per-object store: each blob lives at `<root>/<hex id>` with a
/// one-byte kind tag prefix.
///
/// Writes go to a temp file in the same directory and are published with a
/// rename, so readers never observe partial objects. Reads re-hash the
/// payload and fail with [`StoreError::ObjectIdMismatch`] on corruption.
pub struct FileObjectStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl FileObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// The directory this store writes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.to_hex())
    }

    fn temp_path(&self) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!("incoming-{}-{n}.tmp", std::process::id()))
    }

    /// Write framed bytes to a temp file and publish them under `id`.
    fn publish(&self, id: &ObjectId, temp: &Path) -> StoreResult<()> {
        let target = self.object_path(id);
        if target.exists() {
            // Another writer got here first; content addressing makes the
            // existing bytes equivalent.
            fs::remove_file(temp)?;
            return Ok(());
        }
        fs::rename(temp, &target)?;
        Ok(())
    }

    fn decode(&self, id: &ObjectId, bytes: Vec<u8>) -> StoreResult<StoredObject> {
        let Some((&tag, data)) = bytes.split_first() else {
            return Err(StoreError::Format {
                id: *id,
                reason: "empty object file".to_string(),
            });
        };
        let Some(kind) = ObjectKind::from_tag(tag) else {
            return Err(StoreError::Format {
                id: *id,
                reason: format!("unknown kind tag {tag:#04x}"),
            });
        };
        let object = StoredObject::new(kind, data.to_vec());
        let actual = object.compute_id();
        if actual != *id {
            warn!(expected = %id, actual = %actual, "corrupt object on disk");
            return Err(StoreError::ObjectIdMismatch {
                expected: *id,
                actual,
            });
        }
        Ok(object)
    }
}

impl ObjectStore for FileObjectStore {
    fn get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let path = self.object_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.decode(id, bytes).map(Some)
    }

    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if self.object_path(&id).exists() {
            return Ok(id);
        }
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(&[object.kind.tag()])?;
            file.write_all(&object.data)?;
            file.sync_all()?;
        }
        self.publish(&id, &temp)?;
        Ok(id)
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).exists())
    }

    fn put_from_reader(
        &self,
        kind: ObjectKind,
        reader: &mut dyn Read,
        size: u64,
    ) -> StoreResult<ObjectId> {
        // Stream to a temp file while hashing, so large values never live in
        // memory whole.
        let temp = self.temp_path();
        let mut file = File::create(&temp)?;
        file.write_all(&[kind.tag()])?;

        let mut hasher = kind.hasher().begin();
        let mut remaining = size;
        let mut buf = [0u8; READ_CHUNK];
        while remaining > 0 {
            let want = remaining.min(READ_CHUNK as u64) as usize;
            let n = reader.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        let mut probe = [0u8; 1];
        let over = remaining == 0 && reader.read(&mut probe)? != 0;
        if remaining > 0 || over {
            drop(file);
            fs::remove_file(&temp)?;
            return Err(StoreError::SizeMismatch {
                expected: size,
                actual: if over { size + 1 } else { size - remaining },
            });
        }
        file.sync_all()?;
        drop(file);

        let id = crate::hasher::ContentHasher::finish(hasher);
        self.publish(&id, &temp)?;
        Ok(id)
    }

    /// Streamed reads hand back the file positioned past the kind tag; the
    /// payload is not re-hashed.
    fn get_stream(&self, id: &ObjectId) -> StoreResult<Option<Box<dyn Read + Send>>> {
        let path = self.object_path(id);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(1))?;
        Ok(Some(Box::new(file)))
    }
}

impl std::fmt::Debug for FileObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObjectStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(content: &[u8]) -> StoredObject {
        StoredObject::new(ObjectKind::Value, content.to_vec())
    }

    #[test]
    fn put_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        let obj = value(b"hello disk");
        let id = store.put(&obj).unwrap();

        let read_back = store.get(&id).unwrap().expect("should exist");
        assert_eq!(read_back, obj);
        assert!(store.contains(&id).unwrap());
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        assert!(store.get(&ObjectId::from_bytes(b"nope")).unwrap().is_none());
    }

    #[test]
    fn ids_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FileObjectStore::open(dir.path()).unwrap();
            store.put(&value(b"durable")).unwrap()
        };
        let store = FileObjectStore::open(dir.path()).unwrap();
        let obj = store.get(&id).unwrap().expect("should survive reopen");
        assert_eq!(obj.data, b"durable");
        // Same content hashed after "restart" gives the same id.
        assert_eq!(store.put(&value(b"durable")).unwrap(), id);
    }

    #[test]
    fn corrupted_payload_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        let id = store.put(&value(b"pristine bytes")).unwrap();

        // Flip one payload byte on disk.
        let path = dir.path().join(id.to_hex());
        let mut bytes = fs::read(&path).unwrap();
        bytes[5] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let err = store.get(&id).unwrap_err();
        assert!(matches!(err, StoreError::ObjectIdMismatch { .. }));
    }

    #[test]
    fn unknown_tag_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        let id = ObjectId::from_bytes(b"fake");
        fs::write(dir.path().join(id.to_hex()), [b'?', 1, 2, 3]).unwrap();

        let err = store.get(&id).unwrap_err();
        assert!(matches!(err, StoreError::Format { .. }));
    }

    #[test]
    fn streaming_put_matches_sync_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        let content = vec![0xabu8; 3 * READ_CHUNK + 17];

        let mut reader = &content[..];
        let streamed = store
            .put_from_reader(ObjectKind::Value, &mut reader, content.len() as u64)
            .unwrap();
        let direct = store
            .put(&StoredObject::new(ObjectKind::Value, content.clone()))
            .unwrap();
        assert_eq!(streamed, direct);

        let obj = store.get(&streamed).unwrap().unwrap();
        assert_eq!(obj.data, content);
    }

    #[test]
    fn streaming_put_size_mismatch_leaves_no_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        let mut reader = &b"short"[..];
        let err = store
            .put_from_reader(ObjectKind::Value, &mut reader, 100)
            .unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { .. }));
        // No temp or object files left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn get_stream_skips_tag_byte() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        let id = store.put(&value(b"streamed payload")).unwrap();

        let mut reader = store.get_stream(&id).unwrap().unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"streamed payload");
    }
}
