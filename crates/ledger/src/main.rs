//! ledger - Audit tooling for the Parley hash-chained ledger
//!
//! Verifies chain integrity, reads individual records, and summarizes
//! what the ledger holds. This binary never writes: appends happen only
//! through the components that own the records.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use ledger::record::to_hex;
use ledger::{payload, EncodedRecord, FileStore, Ledger, LedgerRecord, SqliteStore, Store};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "Inspect and verify the Parley audit ledger")]
#[command(version)]
#[command(after_help = r#"WHEN TO USE:
    Run verify after any incident or on a schedule. A failed verification
    means a stored record no longer matches its chain digest - that is a
    tampering investigation, not a transient fault.

EXAMPLES:
    ledger verify                  # Recompute the whole chain
    ledger verify --from 100       # Verify a suffix
    ledger read 42                 # Show one record
    ledger tail -c 20              # Most recent 20 records
    ledger stats                   # Record counts by payload kind"#)]
struct Cli {
    /// Ledger file (JSON lines). Defaults to the standard data path.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Read from a SQLite ledger database instead of a JSON lines file
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute the chain over a range (exits 0=intact, 1=broken)
    Verify {
        /// First sequence to check (default 0)
        #[arg(long)]
        from: Option<u64>,

        /// Last sequence to check (default: the tail)
        #[arg(long)]
        to: Option<u64>,
    },

    /// Show a single record
    Read {
        /// Sequence number
        sequence: u64,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent records
    Tail {
        /// How many records
        #[arg(short, long, default_value = "10")]
        count: u64,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Summarize the ledger by payload kind
    Stats,
}

fn open_ledger(cli: &Cli) -> Result<Ledger> {
    let store: Arc<dyn Store> = if let Some(db) = &cli.db {
        Arc::new(SqliteStore::open(db).context("Failed to open ledger database")?)
    } else {
        let path = cli
            .path
            .clone()
            .unwrap_or_else(|| parley_core::Paths::new().ledger());
        Arc::new(FileStore::open(&path).context("Failed to open ledger file")?)
    };
    Ok(Ledger::new(store))
}

fn describe(record: &LedgerRecord) -> String {
    let kind = payload::kind(&record.payload).unwrap_or_else(|| "opaque".to_string());
    format!(
        "#{:<6} {:<18} payload {:>5} bytes  chain {}",
        record.sequence,
        kind,
        record.payload.len(),
        &to_hex(&record.chain_digest)[..16],
    )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ledger = open_ledger(&cli)?;

    match cli.command {
        Commands::Verify { from, to } => {
            let len = ledger.len()?;
            if len == 0 {
                println!("Ledger is empty; nothing to verify.");
                return Ok(());
            }
            let from = from.unwrap_or(0);
            let to = to.unwrap_or(len - 1);

            let intact = ledger
                .verify(from, to)
                .context("Failed to verify ledger range")?;
            if intact {
                println!("OK: records {}..={} verify ({} records)", from, to, to - from + 1);
            } else {
                println!("BROKEN: chain does not verify over {}..={}", from, to);
                std::process::exit(1);
            }
        }

        Commands::Read { sequence, json } => {
            let record = ledger.read(sequence)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&EncodedRecord::from(&record))?);
            } else {
                println!("{}", describe(&record));
                if let Ok(body) = serde_json::from_slice::<serde_json::Value>(&record.payload) {
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
            }
        }

        Commands::Tail { count, json } => {
            let records = ledger.tail(count)?;
            if json {
                let encoded: Vec<EncodedRecord> = records.iter().map(EncodedRecord::from).collect();
                println!("{}", serde_json::to_string_pretty(&encoded)?);
            } else if records.is_empty() {
                println!("Ledger is empty.");
            } else {
                for record in &records {
                    println!("{}", describe(record));
                }
            }
        }

        Commands::Stats => {
            let len = ledger.len()?;
            let mut kinds: BTreeMap<String, u64> = BTreeMap::new();
            for seq in 0..len {
                let record = ledger.read(seq)?;
                let kind = payload::kind(&record.payload).unwrap_or_else(|| "opaque".to_string());
                *kinds.entry(kind).or_insert(0) += 1;
            }

            println!("Records: {}", len);
            for (kind, count) in kinds {
                println!("  {:<20} {}", kind, count);
            }
        }
    }

    Ok(())
}
