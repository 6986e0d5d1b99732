//! trs - Inspect Trust Resilience Scores from the audit ledger
//!
//! Scores live in two places: the engine's in-memory aggregates (owned by
//! the running gateway) and the snapshot trail in the ledger. This binary
//! reads the trail.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use ledger::{payload, FileStore, Ledger};
use trs::{TrsSnapshot, SNAPSHOT_KIND};

#[derive(Parser)]
#[command(name = "trs")]
#[command(about = "Trust Resilience Score history for sessions")]
#[command(version)]
#[command(after_help = r#"EXAMPLES:
    trs show ses_4f2a91c03b7e5d12     # Score history for one session
    trs sessions                      # Sessions with recorded snapshots

SCORING:
    composite = 0.40·friction_engagement
              + 0.30·verification_actions
              + 0.20·acknowledged_responsibility
              + 0.10·correction_clarification"#)]
struct Cli {
    /// Ledger file (JSON lines). Defaults to the standard data path.
    #[arg(long)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show snapshot history for a session
    Show {
        /// Session ID
        session: String,

        /// Most recent N snapshots (default: all)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// List sessions that have snapshots, with their latest composite
    Sessions,
}

fn load_snapshots(ledger: &Ledger) -> Result<Vec<TrsSnapshot>> {
    let mut snapshots = Vec::new();
    for seq in 0..ledger.len()? {
        let record = ledger.read(seq)?;
        if payload::kind(&record.payload).as_deref() == Some(SNAPSHOT_KIND) {
            let snapshot: TrsSnapshot =
                payload::decode(&record.payload).context("Failed to decode TRS snapshot")?;
            snapshots.push(snapshot);
        }
    }
    Ok(snapshots)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let path = cli
        .path
        .clone()
        .unwrap_or_else(|| parley_core::Paths::new().ledger());
    let ledger = Ledger::new(Arc::new(
        FileStore::open(&path).context("Failed to open ledger file")?,
    ));

    match cli.command {
        Commands::Show {
            session,
            limit,
            json,
        } => {
            let mut snapshots: Vec<TrsSnapshot> = load_snapshots(&ledger)?
                .into_iter()
                .filter(|s| s.session_id == session)
                .collect();
            if let Some(limit) = limit {
                let skip = snapshots.len().saturating_sub(limit);
                snapshots.drain(..skip);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else if snapshots.is_empty() {
                println!("No snapshots for session {}", session);
            } else {
                for s in &snapshots {
                    println!(
                        "{}  composite {:.3}  (friction {:.2}, verification {:.2}, acknowledgment {:.2}, correction {:.2})",
                        s.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        s.composite,
                        s.friction_engagement,
                        s.verification_actions,
                        s.acknowledged_responsibility,
                        s.correction_clarification,
                    );
                }
            }
        }

        Commands::Sessions => {
            let mut latest: BTreeMap<String, TrsSnapshot> = BTreeMap::new();
            for snapshot in load_snapshots(&ledger)? {
                latest.insert(snapshot.session_id.clone(), snapshot);
            }

            if latest.is_empty() {
                println!("No TRS snapshots in the ledger.");
            } else {
                for (session, snapshot) in latest {
                    println!("{}  composite {:.3}", session, snapshot.composite);
                }
            }
        }
    }

    Ok(())
}
