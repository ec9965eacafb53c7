use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use doc_anchor::access::AllowAll;
use doc_anchor::anchor::evm::EvmLedger;
use doc_anchor::anchor::simulated::SimulatedLedger;
use doc_anchor::anchor::LedgerClient;
use doc_anchor::certificate::CertificateIssuer;
use doc_anchor::config::{ServerConfig, TelemetryConfig};
use doc_anchor::crypto::hash::sha256_hex;
use doc_anchor::error::{AnchorError, Result};
use doc_anchor::merkle::{verify_proof, ProofStep};
use doc_anchor::server::{self, AppState};
use doc_anchor::service::AnchorService;
use doc_anchor::state::memory::MemoryStore;
use doc_anchor::state::repository::PgStore;
use doc_anchor::state::{AnchorStore, Database};
use doc_anchor::telemetry;
use doc_anchor::worker::AnchorWorker;

#[derive(Parser)]
#[command(name = "doc-anchor")]
#[command(about = "Tamper-evident document anchoring service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server and the anchor worker
    Serve(ServerConfig),
    /// Apply database migrations
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Print the SHA-256 digest of a file
    Hash { path: PathBuf },
    /// Check a Merkle inclusion proof
    VerifyProof {
        #[arg(long)]
        leaf: String,
        #[arg(long)]
        root: String,
        /// JSON array of `{"hash": .., "position": "left"|"right"}`
        #[arg(long)]
        proof: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("doc-anchor: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Serve(config) => serve(config).await,
        Commands::Migrate { database_url } => {
            telemetry::init(&TelemetryConfig::default());
            let db = Database::connect(&database_url).await?;
            db.migrate().await?;
            info!("Migrations applied");
            Ok(())
        }
        Commands::Hash { path } => {
            let bytes = tokio::fs::read(&path).await?;
            println!("{}  {}", sha256_hex(&bytes), path.display());
            Ok(())
        }
        Commands::VerifyProof { leaf, root, proof } => {
            let proof: Vec<ProofStep> = serde_json::from_str(&proof)
                .map_err(|e| AnchorError::InvalidInput(format!("Invalid proof JSON: {e}")))?;
            let verified = verify_proof(
                &leaf.to_ascii_lowercase(),
                &proof,
                &root.to_ascii_lowercase(),
            );
            println!("{}", if verified { "verified" } else { "NOT verified" });
            if verified {
                Ok(())
            } else {
                Err(AnchorError::InvalidInput("proof does not reconstruct the root".into()))
            }
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    telemetry::init(&config.telemetry);
    config.validate()?;

    let store: Arc<dyn AnchorStore> = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            db.migrate().await?;
            Arc::new(PgStore::new(db.pool().clone()))
        }
        None => {
            warn!("DATABASE_URL not set; records live in memory and are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ledger: Arc<dyn LedgerClient> = match config.evm_config() {
        Some(evm) => {
            info!(network = %evm.network, rpc_url = %evm.rpc_url, "Using EVM ledger");
            Arc::new(EvmLedger::new(evm))
        }
        None => {
            warn!("LEDGER_RPC_URL not set; anchoring to a simulated ledger");
            let simulated = Arc::new(SimulatedLedger::new(config.ledger.network.clone()));
            tokio::spawn(produce_blocks(
                simulated.clone(),
                Duration::from_secs(config.ledger.simulated_block_secs.max(1)),
                shutdown_rx.clone(),
            ));
            simulated as Arc<dyn LedgerClient>
        }
    };

    let worker = AnchorWorker::new(store.clone(), ledger.clone(), config.worker_config());
    let worker_rx = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_rx).await });

    let state = AppState {
        service: AnchorService::new(store.clone(), ledger),
        issuer: CertificateIssuer::new(store, config.certificate_config()),
        access: Arc::new(AllowAll),
        jwt_secret: config.jwt_secret.clone(),
    };

    server::serve(state, &config.listen_addr, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutting down");
        let _ = shutdown_tx.send(true);
    })
    .await?;

    if let Err(e) = worker_handle.await {
        warn!(error = %e, "Worker task ended abnormally");
    }
    Ok(())
}

/// Mine one simulated block per tick until shutdown.
async fn produce_blocks(
    ledger: Arc<SimulatedLedger>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => ledger.mine(1),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(head = ledger.head(), "Simulated block production stopped");
}
