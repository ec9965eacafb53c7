/// In-process [`AnchorStore`] for development and tests.
///
/// Every operation runs under a single lock, which gives the same
/// guarantees the database gets from unique indexes, row locks, and
/// transactions. Nothing survives a restart.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::models::*;
use super::AnchorStore;
use crate::error::{AnchorError, Result};

#[derive(Debug)]
struct JobEntry {
    job: AnchorJob,
    locked_until: Option<DateTime<Utc>>,
    completed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    anchors: HashMap<Uuid, AnchorRecord>,
    /// Insertion order, so batch listings keep their leaf order.
    order: Vec<Uuid>,
    jobs: HashMap<Uuid, JobEntry>,
    certificates: HashMap<Uuid, Certificate>,
    sequences: HashMap<i32, i64>,
}

impl Inner {
    fn matches(record: &AnchorRecord, target: &JobTarget) -> bool {
        match target {
            JobTarget::Anchor(id) => record.id == *id,
            JobTarget::Batch(batch_id) => record.batch_id() == Some(batch_id.as_str()),
        }
    }

    fn live_single(&self, subject_ref: Option<Uuid>, document_hash: &str) -> Option<&AnchorRecord> {
        self.anchors.values().find(|r| {
            !r.is_batch_member()
                && r.subject_ref() == subject_ref
                && r.document_hash == document_hash
                && r.status != AnchorStatus::Failed
        })
    }

    fn ordered(&self) -> impl Iterator<Item = &AnchorRecord> {
        self.order.iter().filter_map(|id| self.anchors.get(id))
    }

    fn insert(&mut self, record: AnchorRecord) {
        self.order.push(record.id);
        self.anchors.insert(record.id, record);
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs not yet completed, for inspection in tests.
    pub fn open_jobs(&self) -> Vec<AnchorJob> {
        let inner = self.inner.lock();
        inner
            .jobs
            .values()
            .filter(|e| !e.completed)
            .map(|e| e.job.clone())
            .collect()
    }
}

#[async_trait]
impl AnchorStore for MemoryStore {
    async fn insert_single(
        &self,
        record: &AnchorRecord,
        job: &AnchorJob,
    ) -> Result<CreateOutcome> {
        if record.is_batch_member() {
            return Err(AnchorError::InvalidInput(
                "insert_single requires a single anchor".into(),
            ));
        }

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.live_single(record.subject_ref(), &record.document_hash) {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }

        inner.insert(record.clone());
        inner.jobs.insert(
            job.id,
            JobEntry {
                job: job.clone(),
                locked_until: None,
                completed: false,
            },
        );

        Ok(CreateOutcome::Created(record.clone()))
    }

    async fn insert_batch(&self, records: &[AnchorRecord], job: &AnchorJob) -> Result<()> {
        if records.iter().any(|r| !r.is_batch_member()) {
            return Err(AnchorError::InvalidInput(
                "insert_batch requires batch members".into(),
            ));
        }

        let mut inner = self.inner.lock();
        for record in records {
            inner.insert(record.clone());
        }
        inner.jobs.insert(
            job.id,
            JobEntry {
                job: job.clone(),
                locked_until: None,
                completed: false,
            },
        );

        Ok(())
    }

    async fn get_anchor(&self, id: Uuid) -> Result<Option<AnchorRecord>> {
        Ok(self.inner.lock().anchors.get(&id).cloned())
    }

    async fn find_confirmed(&self, document_hash: &str) -> Result<Option<AnchorRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .ordered()
            .filter(|r| r.document_hash == document_hash && r.status == AnchorStatus::Confirmed)
            .min_by_key(|r| r.confirmed_at)
            .cloned())
    }

    async fn list_by_subject(&self, subject_ref: Uuid) -> Result<Vec<AnchorRecord>> {
        let inner = self.inner.lock();
        let mut records: Vec<AnchorRecord> = inner
            .ordered()
            .filter(|r| r.subject_ref() == Some(subject_ref))
            .cloned()
            .collect();
        records.reverse();
        Ok(records)
    }

    async fn list_batch(&self, batch_id: &str) -> Result<Vec<AnchorRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .ordered()
            .filter(|r| r.batch_id() == Some(batch_id))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        target: &JobTarget,
        from: &[AnchorStatus],
        to: AnchorStatus,
        patch: &StatusPatch,
    ) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mut changed = 0;

        for record in inner.anchors.values_mut() {
            if !Inner::matches(record, target) || !from.contains(&record.status) {
                continue;
            }
            record.status = to;
            if patch.block_ref.is_some() {
                record.block_ref = patch.block_ref;
            }
            if patch.network.is_some() {
                record.network = patch.network.clone();
            }
            if patch.error_message.is_some() {
                record.error_message = patch.error_message.clone();
            }
            if patch.queued_at.is_some() {
                record.queued_at = patch.queued_at;
            }
            if patch.confirmed_at.is_some() {
                record.confirmed_at = patch.confirmed_at;
            }
            changed += 1;
        }

        Ok(changed)
    }

    async fn claim_job(&self, now: DateTime<Utc>, lease: TimeDelta) -> Result<Option<AnchorJob>> {
        let mut inner = self.inner.lock();

        let due = inner
            .jobs
            .values_mut()
            .filter(|e| {
                !e.completed
                    && e.job.next_run_at <= now
                    && e.locked_until.map_or(true, |until| until <= now)
            })
            .min_by_key(|e| (e.job.next_run_at, e.job.id));

        Ok(due.map(|entry| {
            entry.locked_until = Some(now + lease);
            entry.job.attempts += 1;
            entry.job.clone()
        }))
    }

    async fn record_submission(
        &self,
        job: &AnchorJob,
        tx_ref: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();

        let entry = inner
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| AnchorError::NotFound(format!("job {}", job.id)))?;
        entry.job.tx_ref = Some(tx_ref.to_string());
        entry.job.next_run_at = next_run_at;
        entry.locked_until = None;

        for record in inner.anchors.values_mut() {
            if Inner::matches(record, &job.target) && !record.status.is_terminal() {
                record.tx_ref = Some(tx_ref.to_string());
            }
        }

        Ok(())
    }

    async fn reschedule_job(&self, job_id: Uuid, next_run_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.jobs.get_mut(&job_id) {
            entry.job.next_run_at = next_run_at;
            entry.locked_until = None;
        }
        Ok(())
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.jobs.get_mut(&job_id) {
            entry.completed = true;
            entry.locked_until = None;
        }
        Ok(())
    }

    async fn get_certificate(&self, anchor_id: Uuid) -> Result<Option<Certificate>> {
        Ok(self.inner.lock().certificates.get(&anchor_id).cloned())
    }

    async fn create_certificate(&self, new: &NewCertificate) -> Result<Certificate> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.certificates.get(&new.anchor_id) {
            return Ok(existing.clone());
        }

        let sequence = inner.sequences.entry(new.year).or_insert(0);
        *sequence += 1;
        let certificate = Certificate {
            id: Uuid::now_v7(),
            anchor_id: new.anchor_id,
            certificate_number: new.number_for(*sequence),
            verification_url: new.verification_url.clone(),
            verification_count: 0,
            last_verified_at: None,
            created_at: Utc::now(),
        };

        inner.certificates.insert(new.anchor_id, certificate.clone());
        Ok(certificate)
    }

    async fn record_verification(&self, anchor_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(certificate) = inner.certificates.get_mut(&anchor_id) {
            certificate.verification_count += 1;
            certificate.last_verified_at = Some(at);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<AnchorStats> {
        let inner = self.inner.lock();
        let mut stats = AnchorStats {
            total_certificates: inner.certificates.len() as i64,
            ..Default::default()
        };

        for record in inner.anchors.values() {
            stats.total_anchors += 1;
            match record.status {
                AnchorStatus::Confirmed => stats.confirmed_anchors += 1,
                AnchorStatus::Failed => stats.failed_anchors += 1,
                _ => stats.pending_anchors += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::{generate_salt, sha256_hex};

    fn single(subject_ref: Option<Uuid>, doc: &str) -> (AnchorRecord, AnchorJob) {
        let now = Utc::now();
        let record = AnchorRecord::new(
            AnchorKind::Single {
                subject_ref,
                salt: generate_salt(),
            },
            sha256_hex(doc.as_bytes()),
            now,
        );
        let job = AnchorJob::new(JobTarget::Anchor(record.id), "00".repeat(32), now);
        (record, job)
    }

    #[tokio::test]
    async fn test_dedupe_ignores_failed_records() {
        let store = MemoryStore::new();
        let subject = Some(Uuid::now_v7());

        let (first, job) = single(subject, "doc");
        assert!(store.insert_single(&first, &job).await.unwrap().is_created());

        let (second, job2) = single(subject, "doc");
        let outcome = store.insert_single(&second, &job2).await.unwrap();
        assert_eq!(outcome.record().id, first.id);

        store
            .update_status(
                &JobTarget::Anchor(first.id),
                &[AnchorStatus::Pending],
                AnchorStatus::Failed,
                &StatusPatch::default(),
            )
            .await
            .unwrap();

        let outcome = store.insert_single(&second, &job2).await.unwrap();
        assert!(outcome.is_created());
        assert_eq!(outcome.record().id, second.id);
    }

    #[tokio::test]
    async fn test_update_status_is_compare_and_set() {
        let store = MemoryStore::new();
        let (record, job) = single(None, "doc");
        store.insert_single(&record, &job).await.unwrap();

        let target = JobTarget::Anchor(record.id);
        let changed = store
            .update_status(
                &target,
                &[AnchorStatus::Processing],
                AnchorStatus::Confirmed,
                &StatusPatch::default(),
            )
            .await
            .unwrap();
        assert_eq!(changed, 0);

        let stored = store.get_anchor(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnchorStatus::Pending);
    }

    #[tokio::test]
    async fn test_claimed_job_is_leased() {
        let store = MemoryStore::new();
        let (record, job) = single(None, "doc");
        store.insert_single(&record, &job).await.unwrap();

        let now = Utc::now();
        let lease = TimeDelta::seconds(30);
        let claimed = store.claim_job(now, lease).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.attempts, 1);

        assert!(store.claim_job(now, lease).await.unwrap().is_none());

        // An expired lease makes the job claimable again.
        let later = now + TimeDelta::seconds(31);
        assert!(store.claim_job(later, lease).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_certificate_sequence_per_year() {
        let store = MemoryStore::new();
        let make = |year| NewCertificate {
            anchor_id: Uuid::now_v7(),
            prefix: "SC".into(),
            year,
            verification_url: "https://example.test/verify".into(),
        };

        let a = store.create_certificate(&make(2025)).await.unwrap();
        let b = store.create_certificate(&make(2025)).await.unwrap();
        let c = store.create_certificate(&make(2026)).await.unwrap();

        assert_eq!(a.certificate_number, "SC-2025-000001");
        assert_eq!(b.certificate_number, "SC-2025-000002");
        assert_eq!(c.certificate_number, "SC-2026-000001");
    }
}
