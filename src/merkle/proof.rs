/// Merkle inclusion proof extraction and verification.
use serde::{Deserialize, Serialize};

use super::tree::MerkleTree;
use crate::crypto::hash::hash_pair;

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    #[serde(rename = "hash")]
    pub sibling: String,
    pub position: Position,
}

impl MerkleTree {
    /// Proof for the first occurrence of `leaf_hash` among the leaves.
    pub fn proof_for(&self, leaf_hash: &str) -> Option<Vec<ProofStep>> {
        let index = self.leaves().iter().position(|l| l == leaf_hash)?;
        self.proof_at(index)
    }

    /// Proof for the leaf at `index`.
    pub fn proof_at(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count {
            return None;
        }
        Some(proof_from_levels(&self.levels, index))
    }
}

/// Walk the stored (padded) levels from the leaf up to just below the root.
///
/// Levels are padded before being stored, so the sibling index is always
/// in range. A missing sibling would mean the node was paired with itself.
pub fn proof_from_levels(levels: &[Vec<String>], leaf_index: usize) -> Vec<ProofStep> {
    let mut steps = Vec::new();
    let mut idx = leaf_index;

    for level in &levels[..levels.len().saturating_sub(1)] {
        let (sibling_idx, position) = if idx % 2 == 0 {
            (idx + 1, Position::Right)
        } else {
            (idx - 1, Position::Left)
        };
        let sibling = level.get(sibling_idx).unwrap_or(&level[idx]);

        steps.push(ProofStep {
            sibling: sibling.clone(),
            position,
        });
        idx /= 2;
    }

    steps
}

/// Recompute the root from a leaf and its proof; true iff it matches.
pub fn verify_proof(leaf_hash: &str, proof: &[ProofStep], claimed_root: &str) -> bool {
    let mut acc = leaf_hash.to_string();

    for step in proof {
        acc = match step.position {
            Position::Right => hash_pair(&acc, &step.sibling),
            Position::Left => hash_pair(&step.sibling, &acc),
        };
    }

    acc == claimed_root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256_hex;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| sha256_hex(format!("doc-{i}").as_bytes())).collect()
    }

    #[test]
    fn test_proof_single_leaf_is_empty() {
        let l = leaves(1);
        let tree = MerkleTree::build(&l).unwrap();
        let proof = tree.proof_at(0).unwrap();
        assert!(proof.is_empty());
        assert!(verify_proof(&l[0], &proof, tree.root()));
    }

    #[test]
    fn test_proof_two_leaves() {
        let l = leaves(2);
        let tree = MerkleTree::build(&l).unwrap();

        let proof_a = tree.proof_for(&l[0]).unwrap();
        assert_eq!(proof_a[0].position, Position::Right);
        assert_eq!(proof_a[0].sibling, l[1]);

        let proof_b = tree.proof_for(&l[1]).unwrap();
        assert_eq!(proof_b[0].position, Position::Left);

        assert!(verify_proof(&l[0], &proof_a, tree.root()));
        assert!(verify_proof(&l[1], &proof_b, tree.root()));
    }

    #[test]
    fn test_padded_leaf_sibling_is_itself() {
        let l = leaves(3);
        let tree = MerkleTree::build(&l).unwrap();
        let proof = tree.proof_at(2).unwrap();
        assert_eq!(proof[0].sibling, l[2]);
        assert_eq!(proof[0].position, Position::Right);
        assert!(verify_proof(&l[2], &proof, tree.root()));
    }

    #[test]
    fn test_proof_seven_leaves() {
        let l = leaves(7);
        let tree = MerkleTree::build(&l).unwrap();
        for (i, leaf) in l.iter().enumerate() {
            let proof = tree.proof_at(i).unwrap();
            assert!(verify_proof(leaf, &proof, tree.root()), "proof failed for leaf {i}");
        }
    }

    #[test]
    fn test_swapped_positions_fail() {
        let l = leaves(4);
        let tree = MerkleTree::build(&l).unwrap();
        let mut proof = tree.proof_at(1).unwrap();
        for step in &mut proof {
            step.position = match step.position {
                Position::Left => Position::Right,
                Position::Right => Position::Left,
            };
        }
        assert!(!verify_proof(&l[1], &proof, tree.root()));
    }

    #[test]
    fn test_wrong_root_fails() {
        let l = leaves(2);
        let tree = MerkleTree::build(&l).unwrap();
        let proof = tree.proof_at(0).unwrap();
        assert!(!verify_proof(&l[0], &proof, &"f".repeat(64)));
    }

    #[test]
    fn test_unknown_leaf_has_no_proof() {
        let tree = MerkleTree::build(&leaves(2)).unwrap();
        assert!(tree.proof_for("deadbeef").is_none());
        assert!(tree.proof_at(2).is_none());
    }

    #[test]
    fn test_proof_serializes_with_hash_and_position() {
        let step = ProofStep {
            sibling: "ab".into(),
            position: Position::Left,
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json, serde_json::json!({"hash": "ab", "position": "left"}));
    }
}
