use quire_store::{ObjectKind, StoredObject};
use quire_types::{CommitId, ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// An immutable snapshot of a page's map, plus ancestry.
///
/// The commit's id is the content hash of its serialized record, so a commit
/// fetched by id always carries exactly the fields it was written with.
/// Regular commits have one parent, merges two, and the root commit none;
/// `generation` is `1 + max(parent generations)` (0 for the root), which the
/// common-ancestor search relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    id: CommitId,
    root_id: ObjectId,
    parent_ids: Vec<CommitId>,
    timestamp: i64,
    generation: u64,
}

/// On-disk layout of a commit. These bytes are the hashed identity; the
/// field order is part of the format.
#[derive(Serialize, Deserialize)]
struct CommitRecord {
    root_id: ObjectId,
    parent_ids: Vec<CommitId>,
    timestamp: i64,
    generation: u64,
}

impl Commit {
    /// Create a commit on top of `parents`, owning the tree at `root_id`.
    pub fn from_parents(root_id: ObjectId, parents: &[Commit], timestamp: i64) -> Self {
        let generation = parents
            .iter()
            .map(|p| p.generation + 1)
            .max()
            .unwrap_or(0);
        let parent_ids = parents.iter().map(|p| p.id).collect();
        Self::assemble(root_id, parent_ids, timestamp, generation)
    }

    /// The root commit of a page: no parents, generation 0, timestamp 0,
    /// rooted at the given (empty) tree. Content addressing makes its id a
    /// fixed well-known value.
    pub fn root(empty_tree_id: ObjectId) -> Self {
        Self::assemble(empty_tree_id, Vec::new(), 0, 0)
    }

    fn assemble(
        root_id: ObjectId,
        parent_ids: Vec<CommitId>,
        timestamp: i64,
        generation: u64,
    ) -> Self {
        let record = CommitRecord {
            root_id,
            parent_ids,
            timestamp,
            generation,
        };
        // Serializing a plain record cannot fail.
        let bytes = bincode::serialize(&record).unwrap_or_default();
        let id = StoredObject::new(ObjectKind::Commit, bytes).compute_id();
        Self {
            id,
            root_id: record.root_id,
            parent_ids: record.parent_ids,
            timestamp: record.timestamp,
            generation: record.generation,
        }
    }

    /// This commit's content-addressed id.
    pub fn id(&self) -> CommitId {
        self.id
    }

    /// Id of the root tree node of this commit's contents.
    pub fn root_id(&self) -> ObjectId {
        self.root_id
    }

    /// Ordered parent commit ids (empty for the root commit).
    pub fn parent_ids(&self) -> &[CommitId] {
        &self.parent_ids
    }

    /// Returns `true` if `id` is one of this commit's parents.
    pub fn has_parent(&self, id: &CommitId) -> bool {
        self.parent_ids.contains(id)
    }

    /// Milliseconds since the UNIX epoch at commit time.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Depth of this commit in the DAG; strictly greater than any parent's.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` if this is a page's root commit.
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// Serialize into a stored object.
    pub fn to_stored_object(&self) -> GraphResult<StoredObject> {
        let record = CommitRecord {
            root_id: self.root_id,
            parent_ids: self.parent_ids.clone(),
            timestamp: self.timestamp,
            generation: self.generation,
        };
        let bytes =
            bincode::serialize(&record).map_err(|e| GraphError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Commit, bytes))
    }

    /// Decode from a stored object; the id is recomputed from the bytes.
    pub fn from_stored_object(obj: &StoredObject) -> GraphResult<Self> {
        obj.expect_kind(ObjectKind::Commit)
            .map_err(GraphError::Store)?;
        let record: CommitRecord = bincode::deserialize(&obj.data)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;
        Ok(Self::assemble(
            record.root_id,
            record.parent_ids,
            record.timestamp,
            record.generation,
        ))
    }
}
