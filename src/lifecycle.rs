/// Anchor lifecycle state machine.
///
/// ```text
/// single:  PENDING ──────────────────────────────▶ CONFIRMED
///             └──────────────────────────────────▶ FAILED
///
/// batch:   PENDING ─▶ QUEUED ─▶ PROCESSING ─▶ CONFIRMED
///             └─────────┴───────────┴─────────▶ FAILED
/// ```
///
/// Transitions only move forward; CONFIRMED and FAILED are terminal.
/// Persistent transitions are compare-and-set against the allowed source
/// statuses, so a record that has already moved on is left untouched.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{AnchorError, Result};
use crate::state::models::{AnchorRecord, AnchorStatus, JobTarget, StatusPatch};
use crate::state::AnchorStore;

use AnchorStatus::*;

/// Which transition table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Single,
    Batch,
}

impl Flow {
    pub fn of_target(target: &JobTarget) -> Self {
        match target {
            JobTarget::Anchor(_) => Flow::Single,
            JobTarget::Batch(_) => Flow::Batch,
        }
    }

    pub fn of_record(record: &AnchorRecord) -> Self {
        if record.is_batch_member() {
            Flow::Batch
        } else {
            Flow::Single
        }
    }

    /// Statuses from which `to` may be entered.
    pub fn sources(self, to: AnchorStatus) -> &'static [AnchorStatus] {
        match (self, to) {
            (Flow::Single, Confirmed) => &[Pending],
            (Flow::Single, Failed) => &[Pending],
            (Flow::Batch, Queued) => &[Pending],
            (Flow::Batch, Processing) => &[Queued],
            (Flow::Batch, Confirmed) => &[Processing],
            (Flow::Batch, Failed) => &[Pending, Queued, Processing],
            _ => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Flow::Single => "single",
            Flow::Batch => "batch",
        }
    }

    pub fn can_transition(self, from: AnchorStatus, to: AnchorStatus) -> bool {
        self.sources(to).contains(&from)
    }
}

impl AnchorRecord {
    /// Apply a transition to an in-memory record.
    pub fn advance(&mut self, to: AnchorStatus, at: DateTime<Utc>) -> Result<()> {
        if !Flow::of_record(self).can_transition(self.status, to) {
            return Err(AnchorError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        match to {
            Queued => self.queued_at = Some(at),
            Confirmed => self.confirmed_at = Some(at),
            _ => {}
        }
        self.status = to;
        Ok(())
    }
}

/// Drives persisted records through the lifecycle.
#[derive(Clone)]
pub struct AnchorStateMachine {
    store: Arc<dyn AnchorStore>,
}

impl AnchorStateMachine {
    pub fn new(store: Arc<dyn AnchorStore>) -> Self {
        Self { store }
    }

    /// Move every record of `target` that is in a valid source status to `to`.
    /// Returns how many records moved.
    pub async fn transition(
        &self,
        target: &JobTarget,
        to: AnchorStatus,
        patch: StatusPatch,
    ) -> Result<u64> {
        let flow = Flow::of_target(target);
        let from = flow.sources(to);
        if from.is_empty() {
            return Err(AnchorError::UnreachableStatus {
                flow: flow.as_str(),
                to,
            });
        }

        let moved = self.store.update_status(target, from, to, &patch).await?;
        if moved == 0 {
            warn!(job_target = %target, to = to.as_str(), "No records eligible for transition");
        } else {
            info!(job_target = %target, to = to.as_str(), moved, "Anchor status advanced");
        }
        Ok(moved)
    }

    /// QUEUED → PROCESSING, before the batch root is submitted.
    pub async fn begin_processing(&self, target: &JobTarget) -> Result<u64> {
        match Flow::of_target(target) {
            Flow::Batch => {
                self.transition(target, Processing, StatusPatch::default())
                    .await
            }
            Flow::Single => Ok(0),
        }
    }

    /// The ledger reached confirmation depth.
    pub async fn confirm(
        &self,
        target: &JobTarget,
        block_ref: Option<i64>,
        network: &str,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let patch = StatusPatch {
            block_ref,
            network: Some(network.to_string()),
            confirmed_at: Some(at),
            ..Default::default()
        };
        self.transition(target, Confirmed, patch).await
    }

    /// Submission or confirmation failed; the caller must re-request anchoring.
    pub async fn fail(&self, target: &JobTarget, message: &str) -> Result<u64> {
        let patch = StatusPatch {
            error_message: Some(message.to_string()),
            ..Default::default()
        };
        self.transition(target, Failed, patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::memory::MemoryStore;
    use crate::state::models::AnchorKind;
    use uuid::Uuid;

    const ALL: [AnchorStatus; 5] = [Pending, Queued, Processing, Confirmed, Failed];

    #[test]
    fn test_terminal_states_never_leave() {
        for flow in [Flow::Single, Flow::Batch] {
            for to in ALL {
                assert!(!flow.can_transition(Confirmed, to));
                assert!(!flow.can_transition(Failed, to));
            }
        }
    }

    #[test]
    fn test_confirmed_reachable_only_from_expected_state() {
        let single: Vec<_> = ALL
            .into_iter()
            .filter(|&s| Flow::Single.can_transition(s, Confirmed))
            .collect();
        assert_eq!(single, vec![Pending]);

        let batch: Vec<_> = ALL
            .into_iter()
            .filter(|&s| Flow::Batch.can_transition(s, Confirmed))
            .collect();
        assert_eq!(batch, vec![Processing]);
    }

    #[test]
    fn test_singles_skip_queueing() {
        assert!(!Flow::Single.can_transition(Pending, Queued));
        assert!(!Flow::Single.can_transition(Pending, Processing));
    }

    #[test]
    fn test_no_backwards_moves() {
        assert!(!Flow::Batch.can_transition(Processing, Queued));
        assert!(!Flow::Batch.can_transition(Queued, Pending));
        assert!(!Flow::Batch.can_transition(Queued, Confirmed));
    }

    #[test]
    fn test_record_advance() {
        let mut record = AnchorRecord::new(
            AnchorKind::BatchMember {
                batch_id: "BATCH-1".into(),
                merkle_root: "ab".repeat(32),
                merkle_proof: vec![],
            },
            "cd".repeat(32),
            Utc::now(),
        );

        let at = Utc::now();
        record.advance(Queued, at).unwrap();
        assert_eq!(record.queued_at, Some(at));
        assert!(matches!(
            record.advance(Confirmed, at),
            Err(AnchorError::InvalidTransition { from: Queued, to: Confirmed })
        ));
        record.advance(Processing, at).unwrap();
        record.advance(Confirmed, at).unwrap();
        assert!(record.advance(Failed, at).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_target_names_flow() {
        let machine = AnchorStateMachine::new(Arc::new(MemoryStore::new()));

        let err = machine
            .transition(&JobTarget::Anchor(Uuid::new_v4()), Queued, StatusPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnchorError::UnreachableStatus { flow: "single", to: Queued }
        ));
        assert_eq!(err.to_string(), "No single anchor transition leads to Queued");

        let err = machine
            .transition(&JobTarget::Batch("BATCH-1".into()), Pending, StatusPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnchorError::UnreachableStatus { flow: "batch", to: Pending }
        ));
    }
}
