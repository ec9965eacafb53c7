/// Anchoring operations exposed to callers.
///
/// Request handlers only create records and read them back; every status
/// change after creation goes through the worker and the state machine.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::anchor::LedgerClient;
use crate::crypto::hash::{generate_salt, normalize_digest, salted_hash};
use crate::error::{AnchorError, Result};
use crate::merkle::{verify_proof, MerkleTree, ProofStep};
use crate::state::models::{
    AnchorJob, AnchorKind, AnchorRecord, AnchorStats, AnchorStatus, CreateOutcome, JobTarget,
};
use crate::state::AnchorStore;

/// Smallest batch accepted by [`AnchorService::create_batch`].
pub const MIN_BATCH_SIZE: usize = 2;
/// Largest batch accepted by [`AnchorService::create_batch`].
pub const MAX_BATCH_SIZE: usize = 100;

/// An anchor plus its live confirmation count, when one could be read.
#[derive(Debug, Clone, Serialize)]
pub struct AnchorView {
    pub record: AnchorRecord,
    pub confirmations: Option<u64>,
}

/// Outcome of a public hash lookup. `verified: false` is a normal answer.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub verified: bool,
    pub document_hash: String,
    pub anchor_id: Option<Uuid>,
    pub tx_ref: Option<String>,
    pub block_ref: Option<i64>,
    pub network: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Verification {
    fn unverified(document_hash: String, anchor_id: Option<Uuid>) -> Self {
        Self {
            verified: false,
            document_hash,
            anchor_id,
            tx_ref: None,
            block_ref: None,
            network: None,
            confirmed_at: None,
        }
    }
}

/// Summary returned when a batch is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReceipt {
    pub batch_id: String,
    pub merkle_root: String,
    pub count: usize,
    pub status: AnchorStatus,
}

fn new_batch_id(now: DateTime<Utc>) -> String {
    let mut suffix = [0u8; 4];
    OsRng.fill_bytes(&mut suffix);
    format!("BATCH-{}-{}", now.format("%Y%m%d%H%M%S"), hex::encode(suffix))
}

#[derive(Clone)]
pub struct AnchorService {
    store: Arc<dyn AnchorStore>,
    ledger: Arc<dyn LedgerClient>,
}

impl AnchorService {
    pub fn new(store: Arc<dyn AnchorStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { store, ledger }
    }

    /// Anchor one document hash. Repeating the request for the same subject
    /// and hash returns the existing record while it is not FAILED.
    pub async fn create_anchor(
        &self,
        subject_ref: Option<Uuid>,
        document_hash: &str,
    ) -> Result<CreateOutcome> {
        let document_hash = normalize_digest(document_hash)?;
        let now = Utc::now();

        let salt = generate_salt();
        let payload = salted_hash(&document_hash, &salt);
        let record = AnchorRecord::new(
            AnchorKind::Single { subject_ref, salt },
            document_hash,
            now,
        );
        let job = AnchorJob::new(JobTarget::Anchor(record.id), payload, now);

        let outcome = self.store.insert_single(&record, &job).await?;
        match &outcome {
            CreateOutcome::Created(r) => {
                info!(anchor_id = %r.id, document_hash = %r.document_hash, "Anchor created")
            }
            CreateOutcome::Existing(r) => {
                info!(anchor_id = %r.id, status = r.status.as_str(), "Duplicate anchor request")
            }
        }
        Ok(outcome)
    }

    /// Stored record only, without touching the ledger.
    pub async fn find_anchor(&self, id: Uuid) -> Result<AnchorRecord> {
        self.store
            .get_anchor(id)
            .await?
            .ok_or_else(|| AnchorError::NotFound(format!("anchor {id}")))
    }

    /// Fetch an anchor with a best-effort confirmation count.
    pub async fn get_anchor(&self, id: Uuid) -> Result<AnchorView> {
        let record = self.find_anchor(id).await?;

        let confirmations = match (&record.tx_ref, record.status) {
            (Some(_), AnchorStatus::Failed) | (None, _) => None,
            (Some(tx_ref), _) => match self.ledger.confirmations(tx_ref).await {
                Ok(status) => Some(status.confirmations),
                Err(e) => {
                    warn!(anchor_id = %id, tx_ref = %tx_ref, error = %e, "Confirmation lookup failed");
                    None
                }
            },
        };

        Ok(AnchorView {
            record,
            confirmations,
        })
    }

    /// Is this hash anchored and confirmed? Safe to expose publicly.
    pub async fn verify(&self, document_hash: &str) -> Result<Verification> {
        let document_hash = normalize_digest(document_hash)?;

        match self.lookup(&document_hash).await? {
            Some(record) => self.confirmed_view(record).await,
            None => Ok(Verification::unverified(document_hash, None)),
        }
    }

    /// Verification view of one anchor, as linked from its certificate.
    /// Anchors that are not CONFIRMED yet answer `verified: false`.
    pub async fn verify_anchor(&self, id: Uuid) -> Result<Verification> {
        let record = self.find_anchor(id).await?;
        if record.status != AnchorStatus::Confirmed {
            return Ok(Verification::unverified(record.document_hash, Some(id)));
        }
        self.confirmed_view(record).await
    }

    async fn confirmed_view(&self, record: AnchorRecord) -> Result<Verification> {
        self.store.record_verification(record.id, Utc::now()).await?;

        Ok(Verification {
            verified: true,
            document_hash: record.document_hash,
            anchor_id: Some(record.id),
            tx_ref: record.tx_ref,
            block_ref: record.block_ref,
            network: record.network,
            confirmed_at: record.confirmed_at,
        })
    }

    /// First CONFIRMED record for a hash; absence is a negative answer.
    pub async fn lookup(&self, document_hash: &str) -> Result<Option<AnchorRecord>> {
        self.store.find_confirmed(document_hash).await
    }

    /// Stateless inclusion check of a leaf against a claimed root.
    pub fn verify_inclusion(&self, leaf_hash: &str, proof: &[ProofStep], root: &str) -> bool {
        verify_proof(leaf_hash, proof, root)
    }

    /// Anchor 2..=100 hashes with a single ledger submission of their root.
    pub async fn create_batch<S: AsRef<str>>(&self, hashes: &[S]) -> Result<BatchReceipt> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&hashes.len()) {
            return Err(AnchorError::PreconditionFailed(format!(
                "batch must contain {MIN_BATCH_SIZE} to {MAX_BATCH_SIZE} hashes, got {}",
                hashes.len()
            )));
        }

        let leaves = hashes
            .iter()
            .map(|h| normalize_digest(h.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let tree = MerkleTree::build(&leaves)?;
        let now = Utc::now();
        let batch_id = new_batch_id(now);
        let merkle_root = tree.root().to_string();

        let mut records = Vec::with_capacity(leaves.len());
        for (index, leaf) in leaves.iter().enumerate() {
            let merkle_proof = tree.proof_at(index).ok_or_else(|| {
                AnchorError::InvalidInput(format!("no proof for leaf {index}"))
            })?;
            let mut record = AnchorRecord::new(
                AnchorKind::BatchMember {
                    batch_id: batch_id.clone(),
                    merkle_root: merkle_root.clone(),
                    merkle_proof,
                },
                leaf.clone(),
                now,
            );
            record.advance(AnchorStatus::Queued, now)?;
            records.push(record);
        }

        let job = AnchorJob::new(JobTarget::Batch(batch_id.clone()), merkle_root.clone(), now);
        self.store.insert_batch(&records, &job).await?;

        info!(
            batch_id = %batch_id,
            merkle_root = %merkle_root,
            count = records.len(),
            "Batch queued for anchoring"
        );

        Ok(BatchReceipt {
            batch_id,
            merkle_root,
            count: records.len(),
            status: AnchorStatus::Queued,
        })
    }

    /// Members of a batch, in submission order.
    pub async fn get_batch(&self, batch_id: &str) -> Result<Vec<AnchorRecord>> {
        let members = self.store.list_batch(batch_id).await?;
        if members.is_empty() {
            return Err(AnchorError::NotFound(format!("batch {batch_id}")));
        }
        Ok(members)
    }

    /// All anchors of a subject, newest first.
    pub async fn list_subject_anchors(&self, subject_ref: Uuid) -> Result<Vec<AnchorRecord>> {
        self.store.list_by_subject(subject_ref).await
    }

    pub async fn stats(&self) -> Result<AnchorStats> {
        self.store.stats().await
    }
}
