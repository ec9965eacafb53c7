#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use doc_anchor::anchor::simulated::SimulatedLedger;
use doc_anchor::certificate::{CertificateConfig, CertificateIssuer};
use doc_anchor::crypto::hash::sha256_hex;
use doc_anchor::service::AnchorService;
use doc_anchor::state::memory::MemoryStore;
use doc_anchor::worker::{AnchorWorker, JobOutcome, WorkerConfig};

pub const DEPTH: u64 = 3;
pub const NETWORK: &str = "testnet";

/// Memory store, simulated ledger and everything wired on top of them.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<SimulatedLedger>,
    pub service: AnchorService,
    pub worker: AnchorWorker,
    pub issuer: CertificateIssuer,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(SimulatedLedger::new(NETWORK));
        let config = WorkerConfig {
            confirmation_depth: DEPTH,
            ..WorkerConfig::default()
        };

        Self {
            service: AnchorService::new(store.clone(), ledger.clone()),
            worker: AnchorWorker::new(store.clone(), ledger.clone(), config),
            issuer: CertificateIssuer::new(
                store.clone(),
                CertificateConfig {
                    prefix: "SC".into(),
                    verification_base_url: "https://verify.example.org/v".into(),
                },
            ),
            store,
            ledger,
        }
    }

    /// Submit every open job, mine to depth, and confirm.
    pub async fn settle(&self) -> Vec<JobOutcome> {
        let now = Utc::now();
        let mut outcomes = self.worker.run_due(now).await.unwrap();
        self.ledger.mine(DEPTH);
        outcomes.extend(
            self.worker
                .run_due(now + TimeDelta::minutes(1))
                .await
                .unwrap(),
        );
        outcomes
    }
}

/// A distinct document digest per label.
pub fn doc(label: &str) -> String {
    sha256_hex(label.as_bytes())
}
