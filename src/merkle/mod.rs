/// Merkle batching for anchoring many documents with one ledger transaction.
///
/// ```text
/// doc hash A ─┐
/// doc hash B ─┼──▶ MerkleTree ──▶ root ──▶ ledger (1 tx)
/// doc hash C ─┘        │
///                      └──▶ per-leaf inclusion proofs (stored per record)
/// ```
pub mod proof;
pub mod tree;

pub use proof::{verify_proof, Position, ProofStep};
pub use tree::MerkleTree;
