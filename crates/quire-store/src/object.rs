use quire_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Opaque client value bytes.
    Value,
    /// Serialized B-tree node.
    TreeNode,
    /// Serialized commit record.
    Commit,
}

impl ObjectKind {
    /// Framing tag byte used by on-disk backends.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Value => b'v',
            Self::TreeNode => b'n',
            Self::Commit => b'c',
        }
    }

    /// Parse a framing tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'v' => Some(Self::Value),
            b'n' => Some(Self::TreeNode),
            b'c' => Some(Self::Commit),
            _ => None,
        }
    }

    /// The domain-separated hasher for this kind.
    pub fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Value => &ContentHasher::VALUE,
            Self::TreeNode => &ContentHasher::TREE_NODE,
            Self::Commit => &ContentHasher::COMMIT,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::TreeNode => write!(f, "tree-node"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// A stored object: kind tag plus serialized payload.
///
/// `StoredObject` is the unit of storage. The store never interprets the
/// payload; higher layers decode tree nodes and commits out of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The kind of this object.
    pub kind: ObjectKind,
    /// The serialized bytes of the object.
    pub data: Vec<u8>,
}

impl StoredObject {
    /// Create a new stored object from kind and payload.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Compute the content-addressed id for this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }

    /// Expect this object to be of `kind`, or fail with a format error.
    pub fn expect_kind(&self, kind: ObjectKind) -> StoreResult<()> {
        if self.kind != kind {
            return Err(StoreError::Format {
                id: self.compute_id(),
                reason: format!("expected {kind}, got {}", self.kind),
            });
        }
        Ok(())
    }
}
