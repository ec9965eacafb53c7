/// Runtime configuration, read from flags with environment fallbacks.
use chrono::TimeDelta;
use clap::Args;

use crate::anchor::evm::EvmConfig;
use crate::certificate::CertificateConfig;
use crate::error::{AnchorError, Result};
use crate::worker::WorkerConfig;

/// Minimum accepted length of the JWT secret.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// PostgreSQL connection string. Without one, an in-memory store is used (development only).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: String,

    /// HS256 secret shared with the session issuer.
    #[arg(long, env = "JWT_SECRET_KEY", hide_env_values = true)]
    pub jwt_secret: String,

    #[command(flatten)]
    pub ledger: LedgerConfig,

    #[command(flatten)]
    pub worker: WorkerArgs,

    #[arg(long, env = "CERTIFICATE_PREFIX", default_value = "SC")]
    pub certificate_prefix: String,

    #[arg(
        long,
        env = "VERIFICATION_BASE_URL",
        default_value = "http://localhost:8000/verify"
    )]
    pub verification_base_url: String,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Args)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint. Without one, a simulated ledger is used.
    #[arg(long, env = "LEDGER_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Account that sends anchoring transactions.
    #[arg(long, env = "LEDGER_ACCOUNT")]
    pub account: Option<String>,

    #[arg(long, env = "LEDGER_NETWORK", default_value = "xphere")]
    pub network: String,

    #[arg(long, env = "LEDGER_GAS_LIMIT", default_value_t = 30_000)]
    pub gas_limit: u64,

    /// Simulated ledger only: seconds per block.
    #[arg(long, env = "SIMULATED_BLOCK_SECS", default_value_t = 2)]
    pub simulated_block_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    #[arg(long, env = "CONFIRMATION_DEPTH", default_value_t = 12)]
    pub confirmation_depth: u64,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 5)]
    pub poll_interval_secs: i64,

    #[arg(long, env = "STUCK_TIMEOUT_SECS", default_value_t = 3600)]
    pub stuck_timeout_secs: i64,

    #[arg(long, env = "JOB_LEASE_SECS", default_value_t = 60)]
    pub lease_secs: i64,
}

#[derive(Debug, Clone, Default, Args)]
pub struct TelemetryConfig {
    /// Emit JSON log lines.
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AnchorError::InvalidInput(format!(
                "JWT_SECRET_KEY must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }
        if self.ledger.rpc_url.is_some() && self.ledger.account.is_none() {
            return Err(AnchorError::InvalidInput(
                "LEDGER_ACCOUNT is required when LEDGER_RPC_URL is set".into(),
            ));
        }
        let w = &self.worker;
        if w.poll_interval_secs <= 0 || w.stuck_timeout_secs <= 0 || w.lease_secs <= 0 {
            return Err(AnchorError::InvalidInput(
                "worker intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: TimeDelta::seconds(self.worker.poll_interval_secs),
            confirmation_depth: self.worker.confirmation_depth,
            stuck_timeout: TimeDelta::seconds(self.worker.stuck_timeout_secs),
            lease: TimeDelta::seconds(self.worker.lease_secs),
        }
    }

    pub fn certificate_config(&self) -> CertificateConfig {
        CertificateConfig {
            prefix: self.certificate_prefix.clone(),
            verification_base_url: self.verification_base_url.clone(),
        }
    }

    /// EVM settings, when a JSON-RPC endpoint is configured.
    pub fn evm_config(&self) -> Option<EvmConfig> {
        let rpc_url = self.ledger.rpc_url.clone()?;
        Some(EvmConfig {
            rpc_url,
            network: self.ledger.network.clone(),
            account: self.ledger.account.clone().unwrap_or_default(),
            gas_limit: self.ledger.gas_limit,
        })
    }
}
