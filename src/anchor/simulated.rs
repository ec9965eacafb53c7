/// In-process simulated ledger.
///
/// Transactions are mined into the next block; the chain head only moves
/// when [`SimulatedLedger::mine`] is called (by a test, or by a timer task
/// in development mode). Submissions can be made to fail on demand.
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{LedgerClient, SubmissionReceipt, TxStatus};
use crate::crypto::hash::sha256_hex;
use crate::error::{AnchorError, Result};

#[derive(Debug, Default)]
struct Chain {
    head: u64,
    /// tx_ref -> block it was included in
    txs: HashMap<String, u64>,
    submitted: Vec<String>,
    fail_next: Option<String>,
}

#[derive(Debug)]
pub struct SimulatedLedger {
    network: String,
    chain: Mutex<Chain>,
}

impl SimulatedLedger {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            chain: Mutex::new(Chain::default()),
        }
    }

    /// Produce `blocks` new blocks.
    pub fn mine(&self, blocks: u64) {
        self.chain.lock().head += blocks;
    }

    pub fn head(&self) -> u64 {
        self.chain.lock().head
    }

    /// Make the next `submit` fail with `message`.
    pub fn fail_next_submission(&self, message: impl Into<String>) {
        self.chain.lock().fail_next = Some(message.into());
    }

    /// Payload hashes submitted so far, in order.
    pub fn submitted_payloads(&self) -> Vec<String> {
        self.chain.lock().submitted.clone()
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn network(&self) -> &str {
        &self.network
    }

    async fn submit(&self, payload_hash: &str) -> Result<SubmissionReceipt> {
        let mut chain = self.chain.lock();
        if let Some(message) = chain.fail_next.take() {
            return Err(AnchorError::Ledger(message));
        }

        let nonce = chain.submitted.len();
        let tx_ref = format!("0x{}", sha256_hex(format!("{payload_hash}:{nonce}").as_bytes()));
        let block = chain.head + 1;
        chain.txs.insert(tx_ref.clone(), block);
        chain.submitted.push(payload_hash.to_string());

        Ok(SubmissionReceipt {
            tx_ref,
            payload_hash: payload_hash.to_string(),
        })
    }

    async fn confirmations(&self, tx_ref: &str) -> Result<TxStatus> {
        let chain = self.chain.lock();
        let block = *chain
            .txs
            .get(tx_ref)
            .ok_or_else(|| AnchorError::Ledger(format!("Unknown transaction {tx_ref}")))?;

        if chain.head < block {
            return Ok(TxStatus::UNMINED);
        }

        Ok(TxStatus {
            confirmations: chain.head - block + 1,
            block_number: Some(block),
        })
    }
}
