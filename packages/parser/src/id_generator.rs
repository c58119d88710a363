use crc32fast::Hasher;

use crate::ast::NodeId;

/// Generate a document seed from its name using CRC32
pub fn get_document_seed(name: &str) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(name.as_bytes());
    hasher.finalize()
}

/// Sequential ID generator for tree nodes within a document.
///
/// Ids are never reused: the counter only moves forward, and the seed keeps ids
/// from different documents apart.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: u32,
    count: u32,
}

impl IdGenerator {
    pub fn new(name: &str) -> Self {
        Self::from_seed(get_document_seed(name))
    }

    pub fn from_seed(seed: u32) -> Self {
        Self { seed, count: 0 }
    }

    /// Generate next sequential ID
    pub fn new_id(&mut self) -> NodeId {
        self.count += 1;
        NodeId(((self.seed as u64) << 32) | self.count as u64)
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u32 {
        self.count
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_seed(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_seed_generation() {
        let a = get_document_seed("/paper.tex");
        let b = get_document_seed("/paper.tex");
        assert_eq!(a, b);
        assert_ne!(a, get_document_seed("/notes.tex"));
    }

    #[test]
    fn test_sequential_ids() {
        let mut gen = IdGenerator::new("/paper.tex");

        let id1 = gen.new_id();
        let id2 = gen.new_id();
        let id3 = gen.new_id();

        assert!(id1 < id2 && id2 < id3);
        assert_eq!(gen.issued(), 3);
        assert_eq!((id1.0 >> 32) as u32, gen.seed());
    }

    #[test]
    fn test_generators_with_different_seeds_do_not_collide() {
        let mut a = IdGenerator::new("/a.tex");
        let mut b = IdGenerator::new("/b.tex");
        assert_ne!(a.new_id(), b.new_id());
    }
}
