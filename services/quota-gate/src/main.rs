use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use quota_gate::accounts::{AccountDirectory, InMemoryAccountDirectory, SqliteAccountDirectory};
use quota_gate::api::{self, ApiState};
use quota_gate::clock::{Clock, SystemClock};
use quota_gate::config::{GateConfig, LedgerBackend};
use quota_gate::gate::AdmissionGate;
use quota_gate::reporting::UsageReporter;
use quota_gate::storage::{MemoryLedger, SqliteLedger, UsageLedger};

#[tokio::main]
async fn main() -> Result<()> {
    let config = GateConfig::from_env()?;
    init_tracing(&config.log_level)?;

    let addr: SocketAddr = config.listen_addr().parse()?;
    info!(
        %addr,
        backend = %config.ledger_backend,
        data_dir = %config.data_dir.display(),
        "starting quota-gate service"
    );

    let ledger: Arc<dyn UsageLedger> = match config.ledger_backend {
        LedgerBackend::Sqlite => Arc::new(
            SqliteLedger::open(&config.data_dir).context("failed to open usage ledger")?,
        ),
        LedgerBackend::Memory => {
            warn!("in-memory ledger selected; usage is lost on restart and not shared between instances");
            Arc::new(MemoryLedger::new())
        }
    };

    let accounts: Arc<dyn AccountDirectory> = match &config.accounts_db_path {
        Some(path) => Arc::new(
            SqliteAccountDirectory::open(path).context("failed to open account directory")?,
        ),
        None => {
            warn!("ACCOUNTS_DB_PATH not set; every account resolves to the free tier");
            Arc::new(InMemoryAccountDirectory::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let calendar = config.calendar()?;

    let gate = Arc::new(
        AdmissionGate::new(Arc::clone(&ledger), accounts, Arc::clone(&clock))
            .with_policy(config.tier_policy.clone())
            .with_calendar(calendar)
            .with_reservation_ttl(config.reservation_ttl()),
    );
    let reporter = Arc::new(UsageReporter::new(ledger, clock, calendar));

    let _reconciliation_task = if config.enable_reconciliation {
        Some(gate.start_reconciliation_task(config.reconcile_interval()))
    } else {
        None
    };

    let state = Arc::new(ApiState::new(gate, reporter, config));
    let router = api::create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("quota-gate service shutting down");
    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
