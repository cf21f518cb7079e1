use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Width in bytes of every identifier in the system.
pub const ID_SIZE: usize = 16;

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the first 16 bytes of a BLAKE3 hash over an object's
/// content. Identical content always produces the same `ObjectId`, making
/// objects deduplicatable and verifiable. Values, tree nodes and commits
/// share this id space; the store's hasher domain-separates them by kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; ID_SIZE]);

/// Commits are content-addressed objects, so a commit id is an object id.
pub type CommitId = ObjectId;

impl ObjectId {
    /// Compute an `ObjectId` from raw bytes, without domain separation.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        let mut raw = [0u8; ID_SIZE];
        raw.copy_from_slice(&hash.as_bytes()[..ID_SIZE]);
        Self(raw)
    }

    /// Create an `ObjectId` from a pre-computed 16-byte value.
    pub const fn from_raw(raw: [u8; ID_SIZE]) -> Self {
        Self(raw)
    }

    /// The null object id (all zeros). Marks an absent child in a tree node.
    pub const fn null() -> Self {
        Self([0u8; ID_SIZE])
    }

    /// Returns `true` if this is the null object id.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; ID_SIZE]
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != ID_SIZE {
            return Err(TypeError::InvalidLength {
                expected: ID_SIZE,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; ID_SIZE];
        raw.copy_from_slice(&bytes);
        Ok(Self(raw))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; ID_SIZE]> for ObjectId {
    fn from(raw: [u8; ID_SIZE]) -> Self {
        Self(raw)
    }
}

impl From<ObjectId> for [u8; ID_SIZE] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Identifier of a page.
///
/// Unlike [`ObjectId`], a page id is not content-derived; it is assigned by
/// whoever creates the page (the out-of-scope front end) and is opaque here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId([u8; ID_SIZE]);

impl PageId {
    /// Create a `PageId` from its 16 raw bytes.
    pub const fn from_raw(raw: [u8; ID_SIZE]) -> Self {
        Self(raw)
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
