/// Durable ledger worker.
///
/// Jobs are persisted in the same transaction as the records they serve,
/// so a restart resumes where the previous process stopped:
/// 1. Claim a due job under a lease
/// 2. No tx yet: submit the payload and store the tx reference
/// 3. Tx known: poll confirmations until the configured depth
/// 4. Confirm or fail the records through the state machine
///
/// A job whose lease expires (worker crashed mid-step) is claimed again,
/// so each step runs at least once.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{error, info};

use crate::anchor::LedgerClient;
use crate::error::Result;
use crate::lifecycle::AnchorStateMachine;
use crate::state::models::AnchorJob;
use crate::state::AnchorStore;

/// Message stored on records abandoned by the stuck-job timeout.
pub const TIMEOUT_MESSAGE: &str = "timed out awaiting ledger confirmation";

/// Configuration for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between confirmation checks, and idle sleep when no job is due.
    pub poll_interval: TimeDelta,
    /// Confirmations required before a record is CONFIRMED.
    pub confirmation_depth: u64,
    /// Jobs older than this are abandoned and their records FAILED, unless
    /// the ledger already reports their transaction at depth.
    pub stuck_timeout: TimeDelta,
    /// How long a claimed job stays invisible to other workers.
    pub lease: TimeDelta,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: TimeDelta::seconds(5),
            confirmation_depth: 12,
            stuck_timeout: TimeDelta::hours(1),
            lease: TimeDelta::seconds(60),
        }
    }
}

/// What processing one job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Submitted { tx_ref: String },
    Waiting { confirmations: u64 },
    Confirmed { block_ref: Option<i64> },
    Failed { reason: String },
    TimedOut,
}

pub struct AnchorWorker {
    store: Arc<dyn AnchorStore>,
    ledger: Arc<dyn LedgerClient>,
    machine: AnchorStateMachine,
    config: WorkerConfig,
}

impl AnchorWorker {
    pub fn new(
        store: Arc<dyn AnchorStore>,
        ledger: Arc<dyn LedgerClient>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            machine: AnchorStateMachine::new(store.clone()),
            store,
            ledger,
            config,
        }
    }

    /// Claim and process at most one due job.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<Option<JobOutcome>> {
        let Some(job) = self.store.claim_job(now, self.config.lease).await? else {
            return Ok(None);
        };
        self.process(&job, now).await.map(Some)
    }

    /// Process every job due at `now`. Each job is handled at most once per call.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<JobOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_once(now).await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn process(&self, job: &AnchorJob, now: DateTime<Utc>) -> Result<JobOutcome> {
        let target = &job.target;
        let overdue = now - job.created_at > self.config.stuck_timeout;
        let next_check = now + self.config.poll_interval;

        let Some(tx_ref) = &job.tx_ref else {
            if overdue {
                return self.time_out(job).await;
            }

            self.machine.begin_processing(target).await?;

            return match self.ledger.submit(&job.payload_hash).await {
                Ok(receipt) => {
                    self.store
                        .record_submission(job, &receipt.tx_ref, next_check)
                        .await?;
                    info!(job_target = %target, tx_ref = %receipt.tx_ref, "Anchor submitted to ledger");
                    Ok(JobOutcome::Submitted {
                        tx_ref: receipt.tx_ref,
                    })
                }
                Err(e) => self.abandon(job, &format!("submission failed: {e}")).await,
            };
        };

        // Overdue jobs still confirm when the ledger has already buried the tx.
        match self.ledger.confirmations(tx_ref).await {
            Ok(status) if status.confirmations >= self.config.confirmation_depth => {
                let block_ref = status.block_number.and_then(|b| i64::try_from(b).ok());
                self.machine
                    .confirm(target, block_ref, self.ledger.network(), now)
                    .await?;
                self.store.complete_job(job.id).await?;
                info!(job_target = %target, tx_ref = %tx_ref, ?block_ref, "Anchor confirmed");
                Ok(JobOutcome::Confirmed { block_ref })
            }
            Ok(_) if overdue => self.time_out(job).await,
            Ok(status) => {
                self.store.reschedule_job(job.id, next_check).await?;
                Ok(JobOutcome::Waiting {
                    confirmations: status.confirmations,
                })
            }
            Err(e) => self.abandon(job, &format!("confirmation check failed: {e}")).await,
        }
    }

    async fn time_out(&self, job: &AnchorJob) -> Result<JobOutcome> {
        error!(job_id = %job.id, job_target = %job.target, "Anchor job timed out");
        self.machine.fail(&job.target, TIMEOUT_MESSAGE).await?;
        self.store.complete_job(job.id).await?;
        Ok(JobOutcome::TimedOut)
    }

    async fn abandon(&self, job: &AnchorJob, reason: &str) -> Result<JobOutcome> {
        error!(job_id = %job.id, job_target = %job.target, reason, "Anchor failed");
        self.machine.fail(&job.target, reason).await?;
        self.store.complete_job(job.id).await?;
        Ok(JobOutcome::Failed {
            reason: reason.to_string(),
        })
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let idle = self
            .config
            .poll_interval
            .to_std()
            .unwrap_or(Duration::from_secs(5));

        info!(
            depth = self.config.confirmation_depth,
            network = self.ledger.network(),
            "Anchor worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once(Utc::now()).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Anchor job errored; it will be retried after its lease expires")
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(idle) => {}
            }
        }

        info!("Anchor worker stopped");
    }
}
