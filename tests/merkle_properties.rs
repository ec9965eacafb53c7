use doc_anchor::merkle::{verify_proof, MerkleTree};
use proptest::prelude::*;

fn arb_digest() -> impl Strategy<Value = String> {
    "[0-9a-f]{64}"
}

fn arb_leaves(max_count: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_digest(), 1..=max_count)
}

/// Replace the hex character at `offset` with a different one.
fn change_hex_char(digest: &str, offset: usize) -> String {
    let mut chars: Vec<char> = digest.chars().collect();
    chars[offset] = if chars[offset] == '0' { '1' } else { '0' };
    chars.into_iter().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every leaf's proof reconstructs the root.
    #[test]
    fn prop_every_proof_verifies(leaves in arb_leaves(100)) {
        let tree = MerkleTree::build(&leaves).unwrap();
        for (index, leaf) in leaves.iter().enumerate() {
            let proof = tree.proof_at(index).unwrap();
            prop_assert!(verify_proof(leaf, &proof, tree.root()));
        }
    }

    /// Building twice from the same ordered leaves gives the same root.
    #[test]
    fn prop_root_is_deterministic(leaves in arb_leaves(100)) {
        let a = MerkleTree::build(&leaves).unwrap();
        let b = MerkleTree::build(&leaves).unwrap();
        prop_assert_eq!(a.root(), b.root());
    }

    /// A different leaf does not verify against the original proof.
    #[test]
    fn prop_tampered_leaf_fails(
        leaves in arb_leaves(100),
        pick in any::<prop::sample::Index>(),
        other in arb_digest(),
    ) {
        let index = pick.index(leaves.len());
        prop_assume!(other != leaves[index]);

        let tree = MerkleTree::build(&leaves).unwrap();
        let proof = tree.proof_at(index).unwrap();
        prop_assert!(!verify_proof(&other, &proof, tree.root()));
    }

    /// Replacing any sibling hash breaks the proof.
    #[test]
    fn prop_tampered_sibling_fails(
        leaves in prop::collection::vec(arb_digest(), 2..=100),
        pick in any::<prop::sample::Index>(),
        step_pick in any::<prop::sample::Index>(),
        other in arb_digest(),
    ) {
        let index = pick.index(leaves.len());
        let tree = MerkleTree::build(&leaves).unwrap();
        let mut proof = tree.proof_at(index).unwrap();

        let step = step_pick.index(proof.len());
        prop_assume!(proof[step].sibling != other);
        proof[step].sibling = other;

        prop_assert!(!verify_proof(&leaves[index], &proof, tree.root()));
    }

    /// A proof never verifies against a different root.
    #[test]
    fn prop_wrong_root_fails(leaves in arb_leaves(100), other_root in arb_digest()) {
        let tree = MerkleTree::build(&leaves).unwrap();
        prop_assume!(other_root != tree.root());

        let proof = tree.proof_at(0).unwrap();
        prop_assert!(!verify_proof(&leaves[0], &proof, &other_root));
    }

    /// One changed character in the leaf, a sibling, or the root is detected.
    #[test]
    fn prop_single_char_change_fails(
        leaves in prop::collection::vec(arb_digest(), 2..=100),
        pick in any::<prop::sample::Index>(),
        step_pick in any::<prop::sample::Index>(),
        offset in 0usize..64,
    ) {
        let index = pick.index(leaves.len());
        let tree = MerkleTree::build(&leaves).unwrap();
        let proof = tree.proof_at(index).unwrap();
        let leaf = &leaves[index];

        let changed_leaf = change_hex_char(leaf, offset);
        prop_assert!(!verify_proof(&changed_leaf, &proof, tree.root()));

        let mut changed_proof = proof.clone();
        let step = step_pick.index(changed_proof.len());
        changed_proof[step].sibling = change_hex_char(&changed_proof[step].sibling, offset);
        prop_assert!(!verify_proof(leaf, &changed_proof, tree.root()));

        let changed_root = change_hex_char(tree.root(), offset);
        prop_assert!(!verify_proof(leaf, &proof, &changed_root));

        prop_assert!(verify_proof(leaf, &proof, tree.root()));
    }

    /// Proof length is the tree height minus one.
    #[test]
    fn prop_proof_length_matches_height(leaves in arb_leaves(100)) {
        let tree = MerkleTree::build(&leaves).unwrap();
        let height = tree.levels().len();
        for index in 0..leaves.len() {
            prop_assert_eq!(tree.proof_at(index).unwrap().len(), height - 1);
        }
    }
}

#[test]
fn single_leaf_is_its_own_root() {
    let leaf = "ab".repeat(32);
    let tree = MerkleTree::build(&[leaf.clone()]).unwrap();
    assert_eq!(tree.root(), leaf);
    assert!(tree.proof_at(0).unwrap().is_empty());
    assert!(verify_proof(&leaf, &[], &leaf));
}

#[test]
fn proof_for_unknown_leaf_is_none() {
    let tree = MerkleTree::build(&["aa".repeat(32), "bb".repeat(32)]).unwrap();
    assert!(tree.proof_for(&"cc".repeat(32)).is_none());
    assert!(tree.proof_at(2).is_none());
}
