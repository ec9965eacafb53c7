/// Persistent anchoring state.
///
/// The [`AnchorStore`] trait is the only way records, jobs, and
/// certificates are read or written. Two implementations share its
/// semantics:
/// - [`repository::PgStore`]: PostgreSQL, uniqueness and counters enforced by the database
/// - [`memory::MemoryStore`]: in-process, same rules enforced under one lock
pub mod memory;
pub mod models;
pub mod repository;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AnchorError, Result};
use models::{
    AnchorJob, AnchorRecord, AnchorStats, AnchorStatus, Certificate, CreateOutcome, JobTarget,
    NewCertificate, StatusPatch,
};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| AnchorError::Storage(format!("Connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AnchorError::Storage(format!("Migration failed: {e}")))
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Storage for anchor records, their ledger jobs, and certificates.
#[async_trait]
pub trait AnchorStore: Send + Sync {
    /// Insert a PENDING single anchor and its job, unless a non-failed
    /// record for the same `(subject_ref, document_hash)` exists, in which
    /// case that record is returned and nothing is written.
    async fn insert_single(&self, record: &AnchorRecord, job: &AnchorJob)
        -> Result<CreateOutcome>;

    /// Insert all members of a batch and the batch's job atomically.
    async fn insert_batch(&self, records: &[AnchorRecord], job: &AnchorJob) -> Result<()>;

    async fn get_anchor(&self, id: Uuid) -> Result<Option<AnchorRecord>>;

    /// First CONFIRMED record with this document hash.
    async fn find_confirmed(&self, document_hash: &str) -> Result<Option<AnchorRecord>>;

    /// Records owned by a subject, newest first.
    async fn list_by_subject(&self, subject_ref: Uuid) -> Result<Vec<AnchorRecord>>;

    /// Members of a batch in their original order.
    async fn list_batch(&self, batch_id: &str) -> Result<Vec<AnchorRecord>>;

    /// Compare-and-set status change on every record of `target` whose
    /// current status is in `from`. Returns the number of records changed.
    async fn update_status(
        &self,
        target: &JobTarget,
        from: &[AnchorStatus],
        to: AnchorStatus,
        patch: &StatusPatch,
    ) -> Result<u64>;

    /// Claim the oldest due, unleased, incomplete job and lease it until
    /// `now + lease`.
    async fn claim_job(&self, now: DateTime<Utc>, lease: TimeDelta) -> Result<Option<AnchorJob>>;

    /// Store a ledger transaction reference on the job and its non-terminal
    /// records, and schedule the job's next confirmation check.
    async fn record_submission(
        &self,
        job: &AnchorJob,
        tx_ref: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Release the job's lease and schedule it again.
    async fn reschedule_job(&self, job_id: Uuid, next_run_at: DateTime<Utc>) -> Result<()>;

    /// Mark the job done; it is never claimed again.
    async fn complete_job(&self, job_id: Uuid) -> Result<()>;

    async fn get_certificate(&self, anchor_id: Uuid) -> Result<Option<Certificate>>;

    /// Create a certificate, assigning the next number for its year under
    /// mutual exclusion. If one already exists for the anchor it is returned
    /// and no number is consumed.
    async fn create_certificate(&self, new: &NewCertificate) -> Result<Certificate>;

    /// Bump the verification counter of the anchor's certificate, if any.
    async fn record_verification(&self, anchor_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn stats(&self) -> Result<AnchorStats>;
}
