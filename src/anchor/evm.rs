/// EVM calldata anchor over JSON-RPC.
///
/// Writes a 32-byte hash as calldata in a zero-value transaction from the
/// anchoring account to itself. Signing is left to the node (an unlocked
/// account or a remote signer behind the RPC endpoint), so no key material
/// lives in this process.
///
/// Confirmations are derived from the receipt's block number and the
/// current chain head: `head - block + 1`.
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{LedgerClient, SubmissionReceipt, TxStatus};
use crate::error::{AnchorError, Result};

/// Configuration for EVM anchoring.
#[derive(Debug, Clone)]
pub struct EvmConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Network name stored on confirmed anchors.
    pub network: String,
    /// Account that sends (and receives) anchoring transactions.
    pub account: String,
    /// Gas limit for a 32-byte calldata transfer.
    pub gas_limit: u64,
}

/// EVM JSON-RPC ledger client.
pub struct EvmLedger {
    config: EvmConfig,
    client: Client,
}

/// Simplified JSON-RPC response.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    block_number: Option<String>,
    status: Option<String>,
}

fn parse_quantity(field: &str, value: &str) -> Result<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| AnchorError::Ledger(format!("Invalid {field} {value:?}: {e}")))
}

impl EvmLedger {
    pub fn new(config: EvmConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Send a JSON-RPC request to the node. A `null` result is `None`.
    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp: JsonRpcResponse<T> = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError::Ledger(format!("RPC transport error: {e}")))?
            .json()
            .await
            .map_err(|e| AnchorError::Serialization(format!("RPC response parse error: {e}")))?;

        if let Some(err) = resp.error {
            return Err(AnchorError::Ledger(format!(
                "{method} failed: {}",
                err.message
            )));
        }

        Ok(resp.result)
    }

    async fn block_number(&self) -> Result<u64> {
        let head: String = self
            .rpc_call("eth_blockNumber", serde_json::json!([]))
            .await?
            .ok_or_else(|| AnchorError::Ledger("Empty eth_blockNumber response".into()))?;
        parse_quantity("block number", &head)
    }
}

#[async_trait]
impl LedgerClient for EvmLedger {
    fn network(&self) -> &str {
        &self.config.network
    }

    async fn submit(&self, payload_hash: &str) -> Result<SubmissionReceipt> {
        let tx = serde_json::json!({
            "from": self.config.account,
            "to": self.config.account,
            "value": "0x0",
            "gas": format!("0x{:x}", self.config.gas_limit),
            "data": format!("0x{payload_hash}"),
        });

        let tx_ref: String = self
            .rpc_call("eth_sendTransaction", serde_json::json!([tx]))
            .await?
            .ok_or_else(|| AnchorError::Ledger("Empty eth_sendTransaction response".into()))?;

        debug!(tx_ref = %tx_ref, network = %self.config.network, "Anchor transaction sent");

        Ok(SubmissionReceipt {
            tx_ref,
            payload_hash: payload_hash.to_string(),
        })
    }

    async fn confirmations(&self, tx_ref: &str) -> Result<TxStatus> {
        let receipt: Option<TxReceipt> = self
            .rpc_call("eth_getTransactionReceipt", serde_json::json!([tx_ref]))
            .await?;

        let Some(receipt) = receipt else {
            return Ok(TxStatus::UNMINED);
        };
        let Some(block_hex) = receipt.block_number else {
            return Ok(TxStatus::UNMINED);
        };

        if receipt.status.as_deref() == Some("0x0") {
            return Err(AnchorError::Ledger(format!(
                "Transaction {tx_ref} reverted"
            )));
        }

        let block = parse_quantity("block number", &block_hex)?;
        let head = self.block_number().await?;

        Ok(TxStatus {
            confirmations: head.saturating_sub(block) + 1,
            block_number: Some(block),
        })
    }
}
