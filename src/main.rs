use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tillbook::application::engine::{Backends, LedgerEngine};
use tillbook::domain::pool::BusinessUnitId;
use tillbook::domain::ports::{
    AnomalyLogRef, IntentStoreRef, LedgerStoreRef, OrderServiceRef, PaymentGatewayRef,
};
use tillbook::infrastructure::http_gateway::HttpGateway;
use tillbook::infrastructure::http_orders::HttpOrderService;
use tillbook::infrastructure::in_memory::{
    InMemoryAnomalyLog, InMemoryIntentStore, InMemoryLedgerStore, InMemoryOrderBook,
};
use tillbook::infrastructure::sandbox::SandboxGateway;
use tillbook::interfaces::csv::ledger_writer::LedgerWriter;
use tillbook::interfaces::http;
use tillbook::settings::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML). `tillbook.toml` is picked up when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Print a business unit's current balances as JSON
    Balances {
        #[arg(long)]
        unit: String,
    },
    /// Write a business unit's ledger as CSV to stdout
    ExportLedger {
        #[arg(long)]
        unit: String,
    },
}

type Storage = (LedgerStoreRef, IntentStoreRef, AnomalyLogRef);

fn in_memory_storage() -> Storage {
    (
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(InMemoryIntentStore::new()),
        Arc::new(InMemoryAnomalyLog::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(db_path: Option<&Path>) -> Result<Storage> {
    use tillbook::infrastructure::rocksdb::RocksDbStore;

    match db_path {
        Some(path) => {
            let store = RocksDbStore::open(path).into_diagnostic()?;
            tracing::info!(path = %path.display(), "using RocksDB storage");
            let ledger: LedgerStoreRef = Arc::new(store.clone());
            let intents: IntentStoreRef = Arc::new(store.clone());
            let anomalies: AnomalyLogRef = Arc::new(store);
            Ok((ledger, intents, anomalies))
        }
        None => Ok(in_memory_storage()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(db_path: Option<&Path>) -> Result<Storage> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_storage())
}

fn build_engine(settings: &Settings) -> Result<LedgerEngine> {
    let (ledger, intents, anomalies) = open_storage(settings.storage.db_path.as_deref())?;

    let gateway: PaymentGatewayRef = match settings.gateway.http_config() {
        Some(config) => Arc::new(HttpGateway::new(config).into_diagnostic()?),
        None => {
            tracing::warn!("gateway.base_url not set, using the sandbox gateway");
            Arc::new(SandboxGateway::new())
        }
    };
    let orders: OrderServiceRef = match &settings.orders.base_url {
        Some(base_url) => Arc::new(
            HttpOrderService::new(base_url.clone(), settings.gateway.timeout()).into_diagnostic()?,
        ),
        None => {
            tracing::warn!("orders.base_url not set, using an in-process order book");
            Arc::new(InMemoryOrderBook::new())
        }
    };

    let options = settings.engine_options().into_diagnostic()?;
    Ok(LedgerEngine::new(
        Backends {
            ledger,
            intents,
            anomalies,
            orders,
            gateway,
        },
        options,
    ))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    if let Some(db_path) = cli.db_path {
        settings.storage.db_path = Some(db_path);
    }
    init_tracing(&settings.log.level);

    let engine = build_engine(&settings)?;

    match cli.command {
        Command::Serve => {
            let address = format!("{}:{}", settings.server.bind, settings.server.port);
            let listener = tokio::net::TcpListener::bind(&address)
                .await
                .into_diagnostic()?;
            tracing::info!(address = %address, "listening");

            axum::serve(listener, http::router(Arc::new(engine)))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .into_diagnostic()?;
        }
        Command::Balances { unit } => {
            let unit = BusinessUnitId::new(unit).into_diagnostic()?;
            let summary = engine
                .reports()
                .current_balances(&unit)
                .await
                .into_diagnostic()?;
            let stdout = io::stdout();
            serde_json::to_writer_pretty(stdout.lock(), &summary).into_diagnostic()?;
            println!();
        }
        Command::ExportLedger { unit } => {
            let unit = BusinessUnitId::new(unit).into_diagnostic()?;
            let entries = engine.reports().ledger(&unit).await.into_diagnostic()?;

            let stdout = io::stdout();
            let mut writer = LedgerWriter::new(stdout.lock());
            // oldest first
            writer.write_entries(entries.iter().rev()).into_diagnostic()?;
        }
    }

    Ok(())
}
