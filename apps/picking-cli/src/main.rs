//! # Picking Station CLI
//!
//! Line-oriented driver for one picking station.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Startup Sequence                                     │
//! │                                                                         │
//! │  1. init_tracing()          RUST_LOG or "info,picking=debug,sqlx=warn" │
//! │  2. PickingConfig::load     picking.toml + PICKING_* overrides         │
//! │  3. open_store()            SQLite in the data dir, or memory          │
//! │     open_forwarder()        prune and drain the settlement outbox      │
//! │  4. PickingManager::open    restore registry, history, checkpoint      │
//! │  5. resume or load          same manifest id → continue where stopped  │
//! │  6. stdin loop              scans and commands until EOF or "quit"     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! picking [--config FILE] [--operator NAME] [--branch NAME] [MANIFEST.json] [MANIFEST_ID]
//! ```

mod command;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use picking_core::{ManifestInput, PickingHistory, PickingRecord, SessionView, Settlement};
use picking_db::{Database, DbConfig};
use picking_session::{
    CheckpointStore, HttpSettlementSink, MemoryStore, PickingConfig, PickingManager,
    SessionEvent, SettlementForwarder, SharedSession, SqliteStore, StorageBackend,
};

use crate::command::{Command, HELP};

#[derive(Parser, Debug)]
#[command(name = "picking", about = "Warehouse picking station", version)]
struct Args {
    /// Config file (default: picking.toml in the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Operator name recorded on the picking
    #[arg(long)]
    operator: Option<String>,

    /// Branch recorded on the picking
    #[arg(long)]
    branch: Option<String>,

    /// Manifest file: a `{header, lines}` object or the source service response
    manifest: Option<PathBuf>,

    /// Manifest id to resume, or the id of a bare item array
    manifest_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = PickingConfig::load(args.config.clone()).context("loading configuration")?;
    info!(
        backend = %config.storage.backend,
        fuzzy = config.matching.fuzzy_enabled,
        "Configuration loaded"
    );

    let (store, db) = open_store(&config).await?;
    let forwarder = match db {
        Some(ref db) => open_forwarder(&config, db)?,
        None => None,
    };
    if let Some(ref forwarder) = forwarder {
        if let Err(e) = forwarder.prune(config.settlement.retention_days).await {
            warn!(error = %e, "Could not prune delivered settlements");
        }
        forward_settlements(forwarder).await;
    }

    let manager = PickingManager::open(store, config.session_options()).await;
    let shared = SharedSession::new(manager);

    let mut events = shared.with_session_mut(|m| m.subscribe()).await;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            report_event(&event);
        }
    });

    start_session(&shared, &args).await?;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        if command == Command::Quit {
            break;
        }
        handle(&shared, db.as_ref(), forwarder.as_ref(), command).await;
    }

    if shared.with_session(|m| m.snapshot().is_some()).await {
        println!("Progress saved. Run again with the same manifest id to continue.");
    }
    if let Some(db) = db {
        db.close().await;
    }
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=picking_session=trace` - Event emission
/// - Default: INFO, debug for the picking crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,picking=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Opens the configured checkpoint store.
///
/// The SQLite database lives in the platform data directory unless
/// `storage.database_path` or `PICKING_DB_PATH` says otherwise.
async fn open_store(
    config: &PickingConfig,
) -> Result<(Arc<dyn CheckpointStore>, Option<Database>)> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Memory storage: progress will not survive a restart");
            Ok((Arc::new(MemoryStore::new()), None))
        }
        StorageBackend::Sqlite => {
            let path = config
                .database_path()
                .context("could not determine the data directory")?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            info!(?path, "Database path determined");

            let db = Database::new(DbConfig::new(path.clone()))
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            Ok((Arc::new(SqliteStore::new(db.clone())), Some(db)))
        }
    }
}

/// Builds the settlement forwarder when an endpoint is configured.
fn open_forwarder(config: &PickingConfig, db: &Database) -> Result<Option<SettlementForwarder>> {
    let Some(sink) = HttpSettlementSink::from_settings(&config.settlement)
        .context("building the settlement client")?
    else {
        info!("No settlement endpoint: finalized pickings stay in the outbox");
        return Ok(None);
    };

    info!(endpoint = %sink.endpoint(), "Settlement forwarding enabled");
    Ok(Some(SettlementForwarder::new(
        db.settlements(),
        Arc::new(sink),
        config.settlement.batch_size,
    )))
}

/// Drains one outbox batch. Failures stay queued for the next attempt.
async fn forward_settlements(forwarder: &SettlementForwarder) {
    match forwarder.drain().await {
        Ok(report) if report.failed > 0 || report.skipped > 0 => println!(
            "Settlements: {} sent, {} failed, {} need attention",
            report.sent, report.failed, report.skipped
        ),
        Ok(report) if report.sent > 0 => println!("Settlements: {} sent", report.sent),
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "Settlement drain failed");
            println!("Warning: settlements not sent ({})", e);
        }
    }
}

/// Resumes the stored session or loads the manifest file.
async fn start_session(shared: &SharedSession, args: &Args) -> Result<()> {
    if let Some(ref id) = args.manifest_id {
        if shared.with_session_mut(|m| m.resume(id)).await {
            println!("Resuming picking {}", id);
            print_status(shared.snapshot().await.as_ref());
            return Ok(());
        }
    }

    if let Some(ref path) = args.manifest {
        let mut input = read_manifest(path, args.manifest_id.as_deref())?;
        if let Some(ref operator) = args.operator {
            input = input.with_operator(operator.clone());
        }
        if let Some(ref branch) = args.branch {
            input = input.with_branch(branch.clone());
        }

        let view = shared.load_manifest(input).await?;
        println!("Loaded picking {}", view.header.manifest_id);
        print_status(Some(&view));
        return Ok(());
    }

    match shared.snapshot().await {
        Some(view) => {
            println!("Resuming picking {}", view.header.manifest_id);
            print_status(Some(&view));
            Ok(())
        }
        None => bail!("no saved picking to resume; pass a manifest file"),
    }
}

/// Reads a manifest file: either a `{header, lines}` object or the raw
/// response of the source service.
fn read_manifest(path: &Path, manifest_id: Option<&str>) -> Result<ManifestInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    if value.is_object() {
        return serde_json::from_value(value).context("manifest object needs header and lines");
    }

    let fallback_id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = manifest_id.unwrap_or(&fallback_id);

    Ok(ManifestInput::from_source_json(&value, id)?)
}

async fn handle(
    shared: &SharedSession,
    db: Option<&Database>,
    forwarder: Option<&SettlementForwarder>,
    command: Command,
) {
    match command {
        Command::Scan(token) => {
            let outcome = shared.scan(&token).await;
            println!("{}", outcome.message());
        }
        Command::Confirm(input) => match shared.confirm_pending(&input).await {
            Ok((_, units)) => println!("{} units per container recorded. Scan the item again.", units),
            Err(e) => println!("{}", e),
        },
        Command::Cancel => {
            if shared.with_session_mut(|m| m.cancel_confirmation()).await {
                println!("Prompt closed");
            } else {
                println!("No prompt open");
            }
        }
        Command::Adjust { code, delta } => {
            let line = shared
                .with_session(|m| m.find_by_code(&code).map(|(line, _)| line))
                .await;
            match line {
                Some(line) => match shared.adjust_manually(line, delta).await {
                    Ok(item) => println!(
                        "{}: {}/{} ({})",
                        item.code, item.scanned_quantity, item.expected_quantity, item.status
                    ),
                    Err(e) => println!("{}", e),
                },
                None => println!("No line with code {}", code),
            }
        }
        Command::Status => print_status(shared.snapshot().await.as_ref()),
        Command::History => shared.with_session(|m| print_history(m.history())).await,
        Command::Finalize => match shared.finalize().await {
            Ok(record) => {
                println!(
                    "Picking {} finalized: {} lines, {} units",
                    record.manifest_id, record.totals.lines, record.totals.scanned_quantity
                );
                queue_settlement(db, &record).await;
                if let Some(forwarder) = forwarder {
                    forward_settlements(forwarder).await;
                }
            }
            Err(e) => println!("{}", e),
        },
        Command::Abandon => {
            if shared.abandon().await {
                println!("Picking discarded");
            } else {
                println!("Nothing to discard");
            }
        }
        Command::Send => match (forwarder, db) {
            (Some(forwarder), _) => {
                forward_settlements(forwarder).await;
                match forwarder.pending().await {
                    Ok(pending) => println!("{} settlements pending", pending),
                    Err(e) => println!("{}", e),
                }
            }
            (None, Some(db)) => {
                let pending = db.settlements().count_pending().await.unwrap_or_default();
                println!("No settlement endpoint configured; {} settlements queued", pending);
            }
            (None, None) => println!("Memory storage: settlements are not kept"),
        },
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

/// Queues the settlement for forwarding. A failure here never undoes the
/// finalize.
async fn queue_settlement(db: Option<&Database>, record: &PickingRecord) {
    let Some(db) = db else {
        warn!(record_id = %record.id, "No database: settlement not queued");
        return;
    };

    let settlement = Settlement::from_record(record);
    debug!(payload = %settlement.to_source_payload(), "Settlement payload");

    match db.settlements().queue(&settlement).await {
        Ok(entry) => {
            let pending = db.settlements().count_pending().await.unwrap_or_default();
            info!(entry_id = %entry.id, pending, "Settlement queued");
        }
        Err(e) => {
            warn!(record_id = %record.id, error = %e, "Could not queue settlement");
            println!("Warning: settlement not queued ({}). The picking stays finalized.", e);
        }
    }
}

fn report_event(event: &SessionEvent) {
    match event {
        SessionEvent::PersistenceWarning { key, detail } => {
            eprintln!("Warning: progress not saved ({}: {})", key, detail);
        }
        other => debug!(event = other.name(), "Session event"),
    }
}

fn print_status(view: Option<&SessionView>) {
    let Some(view) = view else {
        println!("No picking loaded");
        return;
    };

    println!(
        "{} | {} → {} | {}",
        view.header.manifest_id, view.header.sender, view.header.receiver, view.header.status
    );
    for item in &view.items {
        println!(
            "  {:<12} {:<18} {:>5}/{:<5} {:<8} {}",
            item.code,
            item.barcode,
            item.scanned_quantity,
            item.expected_quantity,
            item.status,
            item.description
        );
    }
    println!(
        "  lines {}/{}  units {}/{}  ({:.0}%)",
        view.totals.completed_lines,
        view.totals.lines,
        view.totals.scanned_quantity,
        view.totals.expected_quantity,
        view.progress.quantity_ratio * 100.0
    );
}

fn print_history(history: &PickingHistory) {
    if history.is_empty() {
        println!("No finalized pickings");
        return;
    }
    for record in history.iter() {
        println!(
            "  {}  {}  {}  {} units",
            record.finished_at.format("%Y-%m-%d %H:%M"),
            record.manifest_id,
            record.operator_name,
            record.totals.scanned_quantity
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let parsed =
            Args::try_parse_from(["picking", "--operator", "Ana", "ctrc.json", "CTRC-1"]).unwrap();
        assert_eq!(parsed.operator.as_deref(), Some("Ana"));
        assert_eq!(parsed.manifest, Some(PathBuf::from("ctrc.json")));
        assert_eq!(parsed.manifest_id.as_deref(), Some("CTRC-1"));
        assert!(parsed.config.is_none());

        let parsed = Args::try_parse_from(["picking"]).unwrap();
        assert!(parsed.manifest.is_none());

        assert!(Args::try_parse_from(["picking", "--operator"]).is_err());
        assert!(Args::try_parse_from(["picking", "--verbose"]).is_err());
        assert!(Args::try_parse_from(["picking", "a.json", "id", "extra"]).is_err());
    }

    #[test]
    fn test_args_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
