/// SHA-256 Merkle tree over hex document hashes.
///
/// Leaves are the document hashes themselves (already SHA-256 digests),
/// and every parent is the hash of its children's hex strings:
///   parent(l, r) = SHA256(l_hex || r_hex)
///
/// If a level has an odd number of nodes, the last node is duplicated
/// before pairing. The padded level is what gets stored, so proof
/// extraction sees exactly the nodes that were hashed.
use crate::crypto::hash::hash_pair;
use crate::error::{AnchorError, Result};

/// A Merkle tree with every level retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// levels[0] = leaves (padded), levels[last] = [root].
    pub(crate) levels: Vec<Vec<String>>,
    /// Number of leaves supplied by the caller, before padding.
    pub(crate) leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree from an ordered, non-empty list of leaf hashes.
    ///
    /// A single leaf is its own root and has an empty proof.
    pub fn build<S: AsRef<str>>(leaves: &[S]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(AnchorError::InvalidInput(
                "cannot build a Merkle tree from zero leaves".into(),
            ));
        }

        let mut current: Vec<String> = leaves.iter().map(|l| l.as_ref().to_string()).collect();
        let mut levels = Vec::new();

        while current.len() > 1 {
            if current.len() % 2 == 1 {
                let last = current[current.len() - 1].clone();
                current.push(last);
            }

            let next: Vec<String> = current
                .chunks_exact(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();

            levels.push(current);
            current = next;
        }
        levels.push(current);

        Ok(Self {
            levels,
            leaf_count: leaves.len(),
        })
    }

    /// The Merkle root.
    pub fn root(&self) -> &str {
        // build() always leaves exactly one node in the top level
        &self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves the tree was built from (padding excluded).
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// The caller's leaves, in order, without padding.
    pub fn leaves(&self) -> &[String] {
        &self.levels[0][..self.leaf_count]
    }

    /// All levels after padding, leaves first.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256_hex;

    fn leaf(s: &str) -> String {
        sha256_hex(s.as_bytes())
    }

    #[test]
    fn test_single_leaf_is_root() {
        let a = leaf("a");
        let tree = MerkleTree::build(&[a.clone()]).unwrap();
        assert_eq!(tree.root(), a);
        assert_eq!(tree.levels().len(), 1);
    }

    #[test]
    fn test_empty_rejected() {
        let empty: Vec<String> = vec![];
        assert!(matches!(
            MerkleTree::build(&empty),
            Err(AnchorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_two_leaves() {
        let (a, b) = (leaf("a"), leaf("b"));
        let tree = MerkleTree::build(&[&a, &b]).unwrap();
        assert_eq!(tree.root(), hash_pair(&a, &b));
    }

    #[test]
    fn test_three_leaves_duplicates_last() {
        let (a, b, c) = (leaf("a"), leaf("b"), leaf("c"));
        let tree = MerkleTree::build(&[&a, &b, &c]).unwrap();

        assert_eq!(tree.levels()[0], vec![a.clone(), b.clone(), c.clone(), c.clone()]);
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.leaves(), &[a, b, c]);
    }

    #[test]
    fn test_odd_inner_level_is_padded() {
        // 5 leaves -> 6 padded -> 3 parents -> 4 padded -> 2 -> 1
        let leaves: Vec<String> = (0..5).map(|i| leaf(&i.to_string())).collect();
        let tree = MerkleTree::build(&leaves).unwrap();
        let sizes: Vec<usize> = tree.levels().iter().map(|l| l.len()).collect();
        assert_eq!(sizes, vec![6, 4, 2, 1]);
        assert_eq!(tree.levels()[1][3], tree.levels()[1][2]);
    }

    #[test]
    fn test_deterministic() {
        let leaves: Vec<String> = ["x", "y", "z"].iter().map(|s| leaf(s)).collect();
        let t1 = MerkleTree::build(&leaves).unwrap();
        let t2 = MerkleTree::build(&leaves).unwrap();
        assert_eq!(t1.root(), t2.root());
    }

    #[test]
    fn test_order_matters() {
        let (a, b) = (leaf("a"), leaf("b"));
        let ab = MerkleTree::build(&[&a, &b]).unwrap();
        let ba = MerkleTree::build(&[&b, &a]).unwrap();
        assert_ne!(ab.root(), ba.root());
    }
}
