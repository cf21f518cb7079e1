use quire_types::{ObjectId, ID_SIZE};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"quire-value-v1"`) that is
/// prepended to every hash computation. This prevents cross-kind hash
/// collisions: a value and a tree node with identical bytes produce
/// different ids. Output is truncated to the system id width.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for value objects.
    pub const VALUE: Self = Self {
        domain: "quire-value-v1",
    };
    /// Hasher for B-tree node objects.
    pub const TREE_NODE: Self = Self {
        domain: "quire-node-v1",
    };
    /// Hasher for commit records.
    pub const COMMIT: Self = Self {
        domain: "quire-commit-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = self.begin();
        hasher.update(data);
        Self::finish(hasher)
    }

    /// Start an incremental hash pre-seeded with this hasher's domain.
    ///
    /// Used by streaming puts that hash while copying the value.
    pub fn begin(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Finalize an incremental hash into an id.
    pub fn finish(hasher: blake3::Hasher) -> ObjectId {
        let mut raw = [0u8; ID_SIZE];
        raw.copy_from_slice(&hasher.finalize().as_bytes()[..ID_SIZE]);
        ObjectId::from_raw(raw)
    }

    /// Verify that data produces the expected object id.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        let id1 = ContentHasher::VALUE.hash(data);
        let id2 = ContentHasher::VALUE.hash(data);
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        let value = ContentHasher::VALUE.hash(data);
        let node = ContentHasher::TREE_NODE.hash(data);
        let commit = ContentHasher::COMMIT.hash(data);
        assert_ne!(value, node);
        assert_ne!(value, commit);
        assert_ne!(node, commit);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = ContentHasher::VALUE.begin();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(
            ContentHasher::finish(hasher),
            ContentHasher::VALUE.hash(b"hello world")
        );
    }

    #[test]
    fn verify_correct_and_tampered_data() {
        let data = b"test data";
        let id = ContentHasher::VALUE.hash(data);
        assert!(ContentHasher::VALUE.verify(data, &id));
        assert!(!ContentHasher::VALUE.verify(b"tampered", &id));
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-custom-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::VALUE.hash(b"data"));
    }
}
