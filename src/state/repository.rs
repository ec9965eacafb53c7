/// PostgreSQL implementation of [`AnchorStore`].
///
/// All queries use sqlx runtime-checked queries (not compile-time checked)
/// to avoid requiring a live database during development builds.
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::*;
use super::AnchorStore;
use crate::error::{AnchorError, Result};

fn db_err(e: sqlx::Error) -> AnchorError {
    AnchorError::Storage(e.to_string())
}

fn status_names(statuses: &[AnchorStatus]) -> Vec<&'static str> {
    statuses.iter().map(|s| s.as_str()).collect()
}

/// How many times a dedupe conflict is re-resolved before giving up.
const INSERT_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_job(tx: &mut Transaction<'_, Postgres>, job: &AnchorJob) -> Result<()> {
        let (anchor_id, batch_id) = match &job.target {
            JobTarget::Anchor(id) => (Some(*id), None),
            JobTarget::Batch(batch_id) => (None, Some(batch_id.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO anchor_jobs (id, anchor_id, batch_id, payload_hash, attempts, created_at, next_run_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6)
            "#,
        )
        .bind(job.id)
        .bind(anchor_id)
        .bind(batch_id)
        .bind(&job.payload_hash)
        .bind(job.created_at)
        .bind(job.next_run_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find_live_single(
        &self,
        subject_ref: Option<Uuid>,
        document_hash: &str,
    ) -> Result<Option<AnchorRecord>> {
        let row: Option<AnchorRow> = sqlx::query_as(
            r#"
            SELECT * FROM anchor_records
            WHERE COALESCE(subject_ref, '00000000-0000-0000-0000-000000000000'::uuid)
                  = COALESCE($1::uuid, '00000000-0000-0000-0000-000000000000'::uuid)
              AND document_hash = $2
              AND batch_id IS NULL
              AND status <> 'failed'
            LIMIT 1
            "#,
        )
        .bind(subject_ref)
        .bind(document_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(AnchorRecord::try_from).transpose()
    }
}

#[async_trait]
impl AnchorStore for PgStore {
    async fn insert_single(
        &self,
        record: &AnchorRecord,
        job: &AnchorJob,
    ) -> Result<CreateOutcome> {
        let AnchorKind::Single { subject_ref, salt } = &record.kind else {
            return Err(AnchorError::InvalidInput(
                "insert_single requires a single anchor".into(),
            ));
        };

        for _ in 0..INSERT_ATTEMPTS {
            let mut tx = self.pool.begin().await.map_err(db_err)?;

            let inserted: Option<AnchorRow> = sqlx::query_as(
                r#"
                INSERT INTO anchor_records (id, subject_ref, document_hash, salt, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT DO NOTHING
                RETURNING *
                "#,
            )
            .bind(record.id)
            .bind(subject_ref)
            .bind(&record.document_hash)
            .bind(salt)
            .bind(record.status)
            .bind(record.created_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            if let Some(row) = inserted {
                Self::insert_job(&mut tx, job).await?;
                tx.commit().await.map_err(db_err)?;
                return Ok(CreateOutcome::Created(row.try_into()?));
            }

            tx.rollback().await.map_err(db_err)?;

            // The winner may have failed between our insert and this read;
            // in that case the slot is free again and we retry.
            if let Some(existing) = self
                .find_live_single(*subject_ref, &record.document_hash)
                .await?
            {
                return Ok(CreateOutcome::Existing(existing));
            }
        }

        Err(AnchorError::Storage(format!(
            "could not settle anchor for hash {} after {INSERT_ATTEMPTS} attempts",
            record.document_hash
        )))
    }

    async fn insert_batch(&self, records: &[AnchorRecord], job: &AnchorJob) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for (position, record) in records.iter().enumerate() {
            let AnchorKind::BatchMember {
                batch_id,
                merkle_root,
                merkle_proof,
            } = &record.kind
            else {
                return Err(AnchorError::InvalidInput(
                    "insert_batch requires batch members".into(),
                ));
            };

            sqlx::query(
                r#"
                INSERT INTO anchor_records
                (id, batch_id, document_hash, merkle_root, merkle_proof, batch_position, status, created_at, queued_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.id)
            .bind(batch_id)
            .bind(&record.document_hash)
            .bind(merkle_root)
            .bind(Json(merkle_proof))
            .bind(position as i32)
            .bind(record.status)
            .bind(record.created_at)
            .bind(record.queued_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        Self::insert_job(&mut tx, job).await?;
        tx.commit().await.map_err(db_err)?;

        Ok(())
    }

    async fn get_anchor(&self, id: Uuid) -> Result<Option<AnchorRecord>> {
        let row: Option<AnchorRow> = sqlx::query_as("SELECT * FROM anchor_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(AnchorRecord::try_from).transpose()
    }

    async fn find_confirmed(&self, document_hash: &str) -> Result<Option<AnchorRecord>> {
        let row: Option<AnchorRow> = sqlx::query_as(
            r#"
            SELECT * FROM anchor_records
            WHERE document_hash = $1 AND status = 'confirmed'
            ORDER BY confirmed_at
            LIMIT 1
            "#,
        )
        .bind(document_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(AnchorRecord::try_from).transpose()
    }

    async fn list_by_subject(&self, subject_ref: Uuid) -> Result<Vec<AnchorRecord>> {
        let rows: Vec<AnchorRow> = sqlx::query_as(
            "SELECT * FROM anchor_records WHERE subject_ref = $1 ORDER BY created_at DESC",
        )
        .bind(subject_ref)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(AnchorRecord::try_from).collect()
    }

    async fn list_batch(&self, batch_id: &str) -> Result<Vec<AnchorRecord>> {
        let rows: Vec<AnchorRow> = sqlx::query_as(
            "SELECT * FROM anchor_records WHERE batch_id = $1 ORDER BY batch_position",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(AnchorRecord::try_from).collect()
    }

    async fn update_status(
        &self,
        target: &JobTarget,
        from: &[AnchorStatus],
        to: AnchorStatus,
        patch: &StatusPatch,
    ) -> Result<u64> {
        let filter = match target {
            JobTarget::Anchor(_) => "id = $8::uuid",
            JobTarget::Batch(_) => "batch_id = $8",
        };
        let sql = format!(
            r#"
            UPDATE anchor_records
            SET status = $1,
                block_ref = COALESCE($2, block_ref),
                network = COALESCE($3, network),
                error_message = COALESCE($4, error_message),
                queued_at = COALESCE($5, queued_at),
                confirmed_at = COALESCE($6, confirmed_at)
            WHERE status::text = ANY($7) AND {filter}
            "#
        );

        let query = sqlx::query(&sql)
            .bind(to)
            .bind(patch.block_ref)
            .bind(patch.network.as_deref())
            .bind(patch.error_message.as_deref())
            .bind(patch.queued_at)
            .bind(patch.confirmed_at)
            .bind(status_names(from));

        let query = match target {
            JobTarget::Anchor(id) => query.bind(*id),
            JobTarget::Batch(batch_id) => query.bind(batch_id.as_str()),
        };

        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn claim_job(&self, now: DateTime<Utc>, lease: TimeDelta) -> Result<Option<AnchorJob>> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE anchor_jobs
            SET locked_until = $2, attempts = attempts + 1
            WHERE id = (
                SELECT id FROM anchor_jobs
                WHERE completed_at IS NULL
                  AND next_run_at <= $1
                  AND (locked_until IS NULL OR locked_until <= $1)
                ORDER BY next_run_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, anchor_id, batch_id, payload_hash, tx_ref, attempts, created_at, next_run_at
            "#,
        )
        .bind(now)
        .bind(now + lease)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(AnchorJob::try_from).transpose()
    }

    async fn record_submission(
        &self,
        job: &AnchorJob,
        tx_ref: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "UPDATE anchor_jobs SET tx_ref = $2, next_run_at = $3, locked_until = NULL WHERE id = $1",
        )
        .bind(job.id)
        .bind(tx_ref)
        .bind(next_run_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let live = status_names(&AnchorStatus::NON_TERMINAL);
        match &job.target {
            JobTarget::Anchor(id) => {
                sqlx::query(
                    "UPDATE anchor_records SET tx_ref = $1 WHERE id = $2 AND status::text = ANY($3)",
                )
                .bind(tx_ref)
                .bind(id)
                .bind(live)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            JobTarget::Batch(batch_id) => {
                sqlx::query(
                    "UPDATE anchor_records SET tx_ref = $1 WHERE batch_id = $2 AND status::text = ANY($3)",
                )
                .bind(tx_ref)
                .bind(batch_id)
                .bind(live)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn reschedule_job(&self, job_id: Uuid, next_run_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE anchor_jobs SET next_run_at = $2, locked_until = NULL WHERE id = $1")
            .bind(job_id)
            .bind(next_run_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE anchor_jobs SET completed_at = $2, locked_until = NULL WHERE id = $1")
            .bind(job_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn get_certificate(&self, anchor_id: Uuid) -> Result<Option<Certificate>> {
        sqlx::query_as::<_, Certificate>("SELECT * FROM certificates WHERE anchor_id = $1")
            .bind(anchor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn create_certificate(&self, new: &NewCertificate) -> Result<Certificate> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The upsert takes a row lock on the year's counter, so concurrent
        // issuers for the same year queue here until we commit.
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO certificate_sequences (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year)
            DO UPDATE SET last_value = certificate_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(new.year)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let inserted: Option<Certificate> = sqlx::query_as(
            r#"
            INSERT INTO certificates (id, anchor_id, certificate_number, verification_url, verification_count, created_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            ON CONFLICT (anchor_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(new.anchor_id)
        .bind(new.number_for(sequence))
        .bind(&new.verification_url)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        match inserted {
            Some(certificate) => {
                tx.commit().await.map_err(db_err)?;
                Ok(certificate)
            }
            None => {
                // Another issuer won; give the sequence value back.
                tx.rollback().await.map_err(db_err)?;
                self.get_certificate(new.anchor_id).await?.ok_or_else(|| {
                    AnchorError::Storage(format!(
                        "certificate for anchor {} vanished after conflict",
                        new.anchor_id
                    ))
                })
            }
        }
    }

    async fn record_verification(&self, anchor_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE certificates
            SET verification_count = verification_count + 1, last_verified_at = $2
            WHERE anchor_id = $1
            "#,
        )
        .bind(anchor_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn stats(&self) -> Result<AnchorStats> {
        sqlx::query_as::<_, AnchorStats>(
            r#"
            SELECT
                COUNT(*) AS total_anchors,
                COUNT(*) FILTER (WHERE status = 'confirmed') AS confirmed_anchors,
                COUNT(*) FILTER (WHERE status IN ('pending', 'queued', 'processing')) AS pending_anchors,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed_anchors,
                (SELECT COUNT(*) FROM certificates) AS total_certificates
            FROM anchor_records
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}
