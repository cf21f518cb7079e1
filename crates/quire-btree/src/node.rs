use quire_store::{ObjectKind, ObjectStore, StoredObject};
use quire_types::{Entry, ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};

/// A node of the B-tree holding a commit's contents.
///
/// Invariants:
/// - `children.len() == entries.len() + 1`; the null id marks an absent child
/// - entry keys are strictly ascending
/// - the child at index `i` holds keys strictly between entries `i-1` and `i`
///
/// The empty tree is the node with zero entries and one absent child; since
/// ids are content-derived, its id is a fixed well-known value
/// ([`TreeNode::empty_id`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    entries: Vec<Entry>,
    children: Vec<ObjectId>,
}

impl TreeNode {
    /// Create a node from entries and children, validating the invariants.
    pub fn new(entries: Vec<Entry>, children: Vec<ObjectId>) -> TreeResult<Self> {
        if children.len() != entries.len() + 1 {
            return Err(TreeError::Malformed(format!(
                "{} entries require {} children, got {}",
                entries.len(),
                entries.len() + 1,
                children.len()
            )));
        }
        if entries.windows(2).any(|w| w[0].key >= w[1].key) {
            return Err(TreeError::Malformed(
                "node entries not strictly ascending".to_string(),
            ));
        }
        Ok(Self { entries, children })
    }

    /// The empty tree node: no entries, one absent child.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            children: vec![ObjectId::null()],
        }
    }

    /// The well-known id of the empty tree node.
    pub fn empty_id() -> ObjectId {
        Self::empty().compute_id()
    }

    /// Write the empty tree node and return its id.
    pub fn write_empty(store: &dyn ObjectStore) -> TreeResult<ObjectId> {
        Self::empty().write(store)
    }

    /// Number of entries stored in this node.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// The ordered entries of this node.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The child ids of this node (`key_count() + 1` of them).
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// The id of the child at `index`; null if the child is absent.
    pub fn child_id(&self, index: usize) -> ObjectId {
        self.children[index]
    }

    /// Search for `key` in this node.
    ///
    /// `Ok(i)` means the entry at `i` has this key; `Err(i)` means the key is
    /// not here and would live in the child at `i`.
    pub fn find_key_or_child(&self, key: &[u8]) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.as_slice().cmp(key))
    }

    /// The content-addressed id of this node.
    pub fn compute_id(&self) -> ObjectId {
        // Serialization of a valid node cannot fail; fall back to hashing
        // nothing only to satisfy the signature.
        let bytes = bincode::serialize(self).unwrap_or_default();
        StoredObject::new(ObjectKind::TreeNode, bytes).compute_id()
    }

    /// Serialize into a stored object.
    pub fn to_stored_object(&self) -> TreeResult<StoredObject> {
        let bytes =
            bincode::serialize(self).map_err(|e| TreeError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::TreeNode, bytes))
    }

    /// Decode from a stored object, validating the invariants.
    pub fn from_stored_object(obj: &StoredObject) -> TreeResult<Self> {
        obj.expect_kind(ObjectKind::TreeNode)?;
        let node: Self =
            bincode::deserialize(&obj.data).map_err(|e| TreeError::Serialization(e.to_string()))?;
        Self::new(node.entries, node.children)
    }

    /// Load a node from the store by id.
    pub fn load(store: &dyn ObjectStore, id: &ObjectId) -> TreeResult<Self> {
        let obj = store.get(id)?.ok_or(TreeError::NodeNotFound(*id))?;
        Self::from_stored_object(&obj)
    }

    /// Write this node to the store and return its id.
    pub fn write(&self, store: &dyn ObjectStore) -> TreeResult<ObjectId> {
        Ok(store.put(&self.to_stored_object()?)?)
    }

    /// A synthetic zero-entry node whose only child is `child`; used to seed
    /// tree cursors without loading the root eagerly.
    pub(crate) fn seed(child: ObjectId) -> Self {
        Self {
            entries: Vec::new(),
            children: vec![child],
        }
    }
}
