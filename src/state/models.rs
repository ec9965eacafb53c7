/// Domain models for anchoring state.
///
/// `*Row` structs map directly to PostgreSQL tables via sqlx; the
/// domain types built from them carry the invariants the flat rows can't.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AnchorError, Result};
use crate::merkle::ProofStep;

/// Anchor lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "anchor_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    Pending,
    Queued,
    Processing,
    Confirmed,
    Failed,
}

impl AnchorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorStatus::Pending => "pending",
            AnchorStatus::Queued => "queued",
            AnchorStatus::Processing => "processing",
            AnchorStatus::Confirmed => "confirmed",
            AnchorStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnchorStatus::Confirmed | AnchorStatus::Failed)
    }

    /// Every status a record can still leave.
    pub const NON_TERMINAL: [AnchorStatus; 3] = [
        AnchorStatus::Pending,
        AnchorStatus::Queued,
        AnchorStatus::Processing,
    ];
}

/// How a record came to be anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorKind {
    /// One document, submitted on its own as `H(document_hash || salt)`.
    Single {
        subject_ref: Option<Uuid>,
        salt: String,
    },
    /// One leaf of a batch; the batch's Merkle root is what gets submitted.
    BatchMember {
        batch_id: String,
        merkle_root: String,
        merkle_proof: Vec<ProofStep>,
    },
}

/// One document's claim to be anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: AnchorKind,
    pub document_hash: String,
    pub status: AnchorStatus,
    pub tx_ref: Option<String>,
    pub block_ref: Option<i64>,
    pub network: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl AnchorRecord {
    /// A fresh PENDING record.
    pub fn new(kind: AnchorKind, document_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            document_hash,
            status: AnchorStatus::Pending,
            tx_ref: None,
            block_ref: None,
            network: None,
            error_message: None,
            created_at: now,
            queued_at: None,
            confirmed_at: None,
        }
    }

    pub fn subject_ref(&self) -> Option<Uuid> {
        match &self.kind {
            AnchorKind::Single { subject_ref, .. } => *subject_ref,
            AnchorKind::BatchMember { .. } => None,
        }
    }

    pub fn batch_id(&self) -> Option<&str> {
        match &self.kind {
            AnchorKind::Single { .. } => None,
            AnchorKind::BatchMember { batch_id, .. } => Some(batch_id),
        }
    }

    pub fn is_batch_member(&self) -> bool {
        matches!(self.kind, AnchorKind::BatchMember { .. })
    }
}

/// Flat `anchor_records` row.
#[derive(Debug, Clone, FromRow)]
pub struct AnchorRow {
    pub id: Uuid,
    pub subject_ref: Option<Uuid>,
    pub batch_id: Option<String>,
    pub document_hash: String,
    pub salt: Option<String>,
    pub merkle_root: Option<String>,
    pub merkle_proof: Option<Json<Vec<ProofStep>>>,
    pub tx_ref: Option<String>,
    pub block_ref: Option<i64>,
    pub network: Option<String>,
    pub status: AnchorStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl TryFrom<AnchorRow> for AnchorRecord {
    type Error = AnchorError;

    fn try_from(row: AnchorRow) -> Result<Self> {
        let kind = match (row.batch_id, row.merkle_root, row.merkle_proof, row.salt) {
            (Some(batch_id), Some(merkle_root), Some(Json(merkle_proof)), _) => {
                AnchorKind::BatchMember {
                    batch_id,
                    merkle_root,
                    merkle_proof,
                }
            }
            (None, None, None, Some(salt)) => AnchorKind::Single {
                subject_ref: row.subject_ref,
                salt,
            },
            _ => {
                return Err(AnchorError::Storage(format!(
                    "anchor {} has an inconsistent single/batch shape",
                    row.id
                )))
            }
        };

        Ok(Self {
            id: row.id,
            kind,
            document_hash: row.document_hash,
            status: row.status,
            tx_ref: row.tx_ref,
            block_ref: row.block_ref,
            network: row.network,
            error_message: row.error_message,
            created_at: row.created_at,
            queued_at: row.queued_at,
            confirmed_at: row.confirmed_at,
        })
    }
}

/// Result of an idempotent anchor request.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(AnchorRecord),
    /// A non-failed record for the same subject and hash already existed.
    Existing(AnchorRecord),
}

impl CreateOutcome {
    pub fn record(&self) -> &AnchorRecord {
        match self {
            CreateOutcome::Created(r) | CreateOutcome::Existing(r) => r,
        }
    }

    pub fn into_record(self) -> AnchorRecord {
        match self {
            CreateOutcome::Created(r) | CreateOutcome::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Which records a job (and a status transition) applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobTarget {
    Anchor(Uuid),
    Batch(String),
}

impl std::fmt::Display for JobTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobTarget::Anchor(id) => write!(f, "anchor:{id}"),
            JobTarget::Batch(batch_id) => write!(f, "batch:{batch_id}"),
        }
    }
}

/// A persisted unit of ledger work.
#[derive(Debug, Clone)]
pub struct AnchorJob {
    pub id: Uuid,
    pub target: JobTarget,
    /// Salted hash for singles, Merkle root for batches.
    pub payload_hash: String,
    pub tx_ref: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
}

impl AnchorJob {
    pub fn new(target: JobTarget, payload_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            target,
            payload_hash,
            tx_ref: None,
            attempts: 0,
            created_at: now,
            next_run_at: now,
        }
    }
}

/// Flat `anchor_jobs` row.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub anchor_id: Option<Uuid>,
    pub batch_id: Option<String>,
    pub payload_hash: String,
    pub tx_ref: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for AnchorJob {
    type Error = AnchorError;

    fn try_from(row: JobRow) -> Result<Self> {
        let target = match (row.anchor_id, row.batch_id) {
            (Some(id), None) => JobTarget::Anchor(id),
            (None, Some(batch_id)) => JobTarget::Batch(batch_id),
            _ => {
                return Err(AnchorError::Storage(format!(
                    "job {} must reference exactly one anchor or batch",
                    row.id
                )))
            }
        };

        Ok(Self {
            id: row.id,
            target,
            payload_hash: row.payload_hash,
            tx_ref: row.tx_ref,
            attempts: row.attempts,
            created_at: row.created_at,
            next_run_at: row.next_run_at,
        })
    }
}

/// Fields written alongside a status change. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    pub block_ref: Option<i64>,
    pub network: Option<String>,
    pub error_message: Option<String>,
    pub queued_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// A verification certificate for a confirmed anchor.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub anchor_id: Uuid,
    /// `PREFIX-YYYY-NNNNNN`, unique across all certificates.
    pub certificate_number: String,
    pub verification_url: String,
    pub verification_count: i64,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a certificate; the store assigns the number.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub anchor_id: Uuid,
    pub prefix: String,
    pub year: i32,
    pub verification_url: String,
}

impl NewCertificate {
    pub fn number_for(&self, sequence: i64) -> String {
        format!("{}-{}-{:06}", self.prefix, self.year, sequence)
    }
}

/// Aggregate anchoring counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AnchorStats {
    pub total_anchors: i64,
    pub confirmed_anchors: i64,
    pub pending_anchors: i64,
    pub failed_anchors: i64,
    pub total_certificates: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> AnchorRow {
        AnchorRow {
            id: Uuid::now_v7(),
            subject_ref: None,
            batch_id: None,
            document_hash: "ab".repeat(32),
            salt: None,
            merkle_root: None,
            merkle_proof: None,
            tx_ref: None,
            block_ref: None,
            network: None,
            status: AnchorStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            queued_at: None,
            confirmed_at: None,
        }
    }

    #[test]
    fn test_single_row_converts() {
        let mut r = row();
        r.salt = Some("00".repeat(32));
        r.subject_ref = Some(Uuid::now_v7());
        let record = AnchorRecord::try_from(r.clone()).unwrap();
        assert_eq!(record.subject_ref(), r.subject_ref);
        assert!(!record.is_batch_member());
    }

    #[test]
    fn test_batch_row_converts() {
        let mut r = row();
        r.batch_id = Some("BATCH-1".into());
        r.merkle_root = Some("cd".repeat(32));
        r.merkle_proof = Some(Json(vec![]));
        let record = AnchorRecord::try_from(r).unwrap();
        assert_eq!(record.batch_id(), Some("BATCH-1"));
        assert_eq!(record.subject_ref(), None);
    }

    #[test]
    fn test_inconsistent_row_rejected() {
        let mut r = row();
        r.batch_id = Some("BATCH-1".into());
        assert!(AnchorRecord::try_from(r).is_err());
    }

    #[test]
    fn test_certificate_number_format() {
        let new = NewCertificate {
            anchor_id: Uuid::now_v7(),
            prefix: "SC".into(),
            year: 2026,
            verification_url: String::new(),
        };
        assert_eq!(new.number_for(42), "SC-2026-000042");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AnchorStatus::Confirmed.is_terminal());
        assert!(AnchorStatus::Failed.is_terminal());
        assert!(!AnchorStatus::Processing.is_terminal());
    }
}
