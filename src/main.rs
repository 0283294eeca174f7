use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use finance_sync::{
    config::{self, AppConfig},
    core::{
        Connectivity, ConnectivityMonitor, DrainOutcome, InstallmentExpander, InstallmentIntent,
        PendingStore, RecordOutcome, SyncCoordinator, SyncEvent, TransactionDraft,
        TransactionKind, spawn_probe,
    },
    errors::{Error, Result},
    remote::{HttpTransactionApi, TransactionApi},
};
use rust_decimal::Decimal;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Offline-first transaction sync for the finance tracker backend.
#[derive(Parser, Debug)]
#[command(name = "finance-sync", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record one transaction; it is queued locally when the backend is unreachable
    Add {
        /// `income` or `expense`
        #[arg(long = "type")]
        kind: TransactionKind,
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        description: Option<String>,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Savings goal this transaction contributes to
        #[arg(long)]
        meta_id: Option<String>,
    },
    /// Create a purchase paid in monthly installments
    Installments {
        #[arg(long = "type", default_value = "expense")]
        kind: TransactionKind,
        #[arg(long)]
        category: String,
        /// Amount of each installment
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        description: Option<String>,
        /// Number of installments (2 to 120)
        #[arg(long, allow_negative_numbers = true)]
        count: i64,
        /// Installments start the month after this date; defaults to today
        #[arg(long)]
        base_date: Option<NaiveDate>,
        #[arg(long)]
        meta_id: Option<String>,
    },
    /// List transactions waiting to be synced
    Pending,
    /// Run one sync pass now
    Sync,
    /// Drop every pending transaction without sending it
    Discard {
        /// Confirm the destructive reset
        #[arg(long)]
        yes: bool,
    },
    /// Watch connectivity and sync automatically until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also be set externally
    dotenv().ok();

    let cli = Cli::parse();

    // 3. Load the application configuration
    let app_config = config::load_config(&cli.config)
        .inspect_err(|e| error!("Critical error loading configuration: {}", e))?;

    run(cli.command, &app_config).await
}

async fn run(command: Command, app_config: &AppConfig) -> Result<()> {
    let api: Arc<dyn TransactionApi> = Arc::new(HttpTransactionApi::new(
        app_config.remote.base_url.clone(),
        app_config.remote.timeout(),
    )?);

    match command {
        Command::Add {
            kind,
            category,
            amount,
            description,
            date,
            meta_id,
        } => {
            let (coordinator, _) = open_coordinator(api, app_config).await?;
            let mut draft = TransactionDraft::new(
                kind,
                category,
                amount,
                date.unwrap_or_else(|| Local::now().date_naive()),
            );
            draft.description = description;
            draft.meta_id = meta_id;

            match coordinator.record(draft).await? {
                RecordOutcome::Submitted(ack) => println!(
                    "Transaction saved (remote id {})",
                    ack.id.as_deref().unwrap_or("unknown")
                ),
                RecordOutcome::Queued(pending) => println!(
                    "Backend unreachable; transaction #{} saved locally",
                    pending.local_id
                ),
            }
        }
        Command::Installments {
            kind,
            category,
            amount,
            description,
            count,
            base_date,
            meta_id,
        } => {
            // Installments go straight to the backend; they never enter the pending store.
            let intent = InstallmentIntent {
                kind,
                category,
                amount,
                description,
                base_date: base_date.unwrap_or_else(|| Local::now().date_naive()),
                meta_id,
                installment_count: count.into(),
            };
            let expander = InstallmentExpander::new(api, app_config.remote.timeout());
            let report = expander.expand_and_submit(&intent).await?;
            println!(
                "{}/{} installments created",
                report.committed, report.attempted
            );
            for failure in &report.failures {
                println!("  installment {} failed: {}", failure.index, failure.error);
            }
        }
        Command::Pending => {
            let (coordinator, _) = open_coordinator(api, app_config).await?;
            let pending = coordinator.store().list_all().await?;
            println!("{} pending transaction(s)", pending.len());
            for entry in pending {
                let draft = &entry.draft;
                println!(
                    "#{:<5} {} {:<8} {:>10} {:<16} {}",
                    entry.local_id,
                    draft.date,
                    draft.kind,
                    draft.amount,
                    draft.category,
                    draft.description.as_deref().unwrap_or("")
                );
            }
        }
        Command::Sync => {
            let (coordinator, _) = open_coordinator(api, app_config).await?;
            match coordinator.drain().await {
                DrainOutcome::Completed(report) => println!(
                    "Synced {} of {} ({} rejected, {} still pending{})",
                    report.delivered,
                    report.attempted,
                    report.rejected,
                    report.remaining,
                    if report.aborted { ", stopped early" } else { "" }
                ),
                DrainOutcome::Skipped(reason) => println!("Sync skipped: {reason:?}"),
            }
        }
        Command::Discard { yes } => {
            if !yes {
                return Err(Error::Config {
                    message: "refusing to discard pending transactions without --yes".to_string(),
                });
            }
            let (coordinator, _) = open_coordinator(api, app_config).await?;
            let removed = coordinator.discard_all().await?;
            println!("Discarded {removed} pending transaction(s)");
        }
        Command::Run => {
            let (coordinator, monitor) = open_coordinator(Arc::clone(&api), app_config).await?;
            run_daemon(&coordinator, &monitor, api, app_config).await?;
            if let Ok(coordinator) = Arc::try_unwrap(coordinator) {
                coordinator.close().await?;
            }
        }
    }

    Ok(())
}

/// Opens the pending store and wires it to a coordinator whose monitor starts from a
/// fresh reachability check.
async fn open_coordinator(
    api: Arc<dyn TransactionApi>,
    app_config: &AppConfig,
) -> Result<(Arc<SyncCoordinator>, ConnectivityMonitor)> {
    let store = PendingStore::open(&app_config.database.url)
        .await
        .inspect(|_| info!("Pending store opened."))
        .inspect_err(|e| error!("Failed to open pending store: {}", e))?;

    let initial = Connectivity::from_reachable(api.is_reachable().await);
    let monitor = ConnectivityMonitor::new(initial);
    let coordinator = SyncCoordinator::new(
        store,
        api,
        monitor.clone(),
        app_config.remote.timeout(),
    );
    Ok((Arc::new(coordinator), monitor))
}

async fn run_daemon(
    coordinator: &Arc<SyncCoordinator>,
    monitor: &ConnectivityMonitor,
    api: Arc<dyn TransactionApi>,
    app_config: &AppConfig,
) -> Result<()> {
    let mut events = coordinator.subscribe();
    let probe = spawn_probe(
        monitor.clone(),
        api,
        app_config.connectivity.probe_interval(),
    );
    let auto_sync = coordinator.spawn_auto_sync();
    info!(pending = coordinator.pending_count().await?, "Auto-sync started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(SyncEvent::PendingCountChanged(count)) => info!(count, "Pending count changed"),
                Ok(SyncEvent::SyncCompleted(report)) => info!(?report, "Sync pass completed"),
                Ok(SyncEvent::LocalTransactionAdded(pending)) => {
                    info!(local_id = pending.local_id, "Local transaction added");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    info!(skipped, "Missed sync events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    probe.abort();
    auto_sync.abort();
    let _ = auto_sync.await;
    Ok(())
}
