/// Ledger submission for tamper-proof timestamping.
///
/// The anchor module provides a pluggable trait for writing a 32-byte
/// hash (hex-encoded) to a ledger and later asking how deeply that
/// transaction has been buried. What gets written is never a raw document
/// hash: singles submit `H(hash || salt)`, batches submit a Merkle root.
///
/// Implementations:
/// - EVM JSON-RPC: calldata in a transaction signed by the node's account
/// - Simulated: in-process chain with manual block production (dev and tests)
pub mod evm;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Receipt returned when the ledger accepts a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Transaction hash/ID on the ledger.
    pub tx_ref: String,
    /// The hex hash that was written.
    pub payload_hash: String,
}

/// Inclusion status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    /// Blocks on top of (and including) the transaction's block; 0 if unmined.
    pub confirmations: u64,
    /// Block number (None if unmined).
    pub block_number: Option<u64>,
}

impl TxStatus {
    pub const UNMINED: TxStatus = TxStatus {
        confirmations: 0,
        block_number: None,
    };
}

/// Trait for pluggable ledger clients.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Network name recorded on confirmed anchors (e.g., "xphere").
    fn network(&self) -> &str;

    /// Write a hex-encoded 32-byte hash to the ledger.
    async fn submit(&self, payload_hash: &str) -> Result<SubmissionReceipt>;

    /// Current inclusion status of a previously submitted transaction.
    async fn confirmations(&self, tx_ref: &str) -> Result<TxStatus>;
}
