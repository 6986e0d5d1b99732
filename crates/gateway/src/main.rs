//! consent - Run requests through the Parley consent gateway
//!
//! Sessions persist as JSON files and the decision trail lands in the
//! shared ledger file, so a conversation can be driven across multiple
//! invocations: evaluate, answer the checkpoint with `reply`, repeat.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use friction::{ChallengeReply, FrictionConfig, FrictionOrchestrator};
use gateway::session::generate_session_id;
use gateway::{
    ConsentGateway, Decision, Evaluation, GatewayConfig, IncomingRequest, SessionFiles,
};
use ledger::{FileStore, Ledger};
use parley_core::{Clock, Config, Paths, SystemClock};
use trs::TrsEngine;

#[derive(Parser)]
#[command(name = "consent")]
#[command(about = "Tiered consent gating for model-bound requests")]
#[command(version)]
#[command(after_help = r#"WHEN TO USE:
    Call evaluate before every model invocation. Only an ALLOW decision
    clears the caller to hit the model provider; HOLD means present the
    checkpoint prompt and come back with `reply`.

EXAMPLES:
    consent evaluate "What medication helps with migraines?"
    consent reply ses_4f2a "I understand an AI is not a doctor..." --elapsed-ms 9500
    consent evaluate --session ses_4f2a "And typical dosages?"
    consent sessions
    consent show ses_4f2a

TIERS:
    default      auto-granted
    sensitive    checkpoint answered above the quality floor
    research     checkpoint + written justification
    forensic     always escalated to a human channel"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a request (creates the session on first contact)
    Evaluate {
        /// Request text
        text: String,

        /// Session to continue (omit to start a new one)
        #[arg(short, long)]
        session: Option<String>,

        /// User the session belongs to
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Written justification (required for RESEARCH grants)
        #[arg(short, long)]
        justification: Option<String>,
    },

    /// Answer a session's open checkpoint
    Reply {
        /// Session with an open challenge
        session: String,

        /// The reply text
        text: String,

        /// How long the user took, in milliseconds
        #[arg(long)]
        elapsed_ms: Option<u64>,

        /// Written justification (required for RESEARCH grants)
        #[arg(short, long)]
        justification: Option<String>,
    },

    /// List persisted sessions
    Sessions,

    /// Show one session's state
    Show {
        /// Session ID
        session: String,
    },
}

fn build_gateway(paths: &Paths, config: &Config) -> Result<ConsentGateway> {
    let ledger = Arc::new(Ledger::with_retries(
        Arc::new(FileStore::open(paths.ledger()).context("Failed to open ledger")?),
        config.append_retries,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let trs = Arc::new(
        TrsEngine::with_smoothing(Arc::clone(&ledger), Arc::clone(&clock), config.trs_smoothing)
            .context("Bad TRS smoothing factor in config")?,
    );
    let friction = FrictionOrchestrator::new(Arc::clone(&trs), Arc::clone(&ledger), Arc::clone(&clock))
        .with_config(FrictionConfig::from(config));

    let gateway = ConsentGateway::new(ledger, trs, friction, clock)
        .context("Failed to assemble gateway")?
        .with_config(GatewayConfig::from(config));
    Ok(gateway)
}

/// Run one request through a gateway wired to the persisted session
fn run_request(session_id: &str, input: IncomingRequest) -> Result<Evaluation> {
    let paths = Paths::new();
    let config = Config::load(&paths.config_file()).context("Failed to load config")?;
    let gateway = build_gateway(&paths, &config)?;

    let files = SessionFiles::new();
    if let Some(session) = files.load(session_id)? {
        gateway.sessions().adopt(session);
    }

    let evaluation = gateway.evaluate(input)?;

    if let Some(entry) = gateway.sessions().get(session_id) {
        let session = entry.lock().unwrap().clone();
        files.save(&session).context("Failed to persist session")?;
    }

    Ok(evaluation)
}

fn print_evaluation(evaluation: &Evaluation) {
    match &evaluation.decision {
        Decision::Allow { reason } => {
            println!("ALLOW ({})", reason);
            println!("The caller may invoke the model provider for this request.");
        }
        Decision::Hold { challenge } => {
            println!("HOLD ({})", evaluation.record.reason);
            println!();
            println!("  {}", challenge.prompt);
            println!();
            println!(
                "Reply within {}s:  consent reply {} \"<your answer>\"",
                (challenge.expires_at - challenge.issued_at).num_seconds(),
                evaluation.request.session_id,
            );
        }
        Decision::Deny { reason } => {
            println!("DENY ({})", reason);
        }
        Decision::Escalate { reason } => {
            println!("ESCALATE ({})", reason);
            println!("This request has been routed to a human reviewer.");
        }
    }

    println!();
    println!(
        "session {}  tier {}  request {}",
        evaluation.request.session_id, evaluation.record.tier, evaluation.request.id
    );
    if let Some(trs) = &evaluation.trs {
        println!("TRS composite {:.3}", trs.composite);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            text,
            session,
            user,
            justification,
        } => {
            let session_id = session.unwrap_or_else(generate_session_id);
            let mut input = IncomingRequest::new(&session_id, &user, &text);
            if let Some(justification) = justification {
                input = input.with_justification(&justification);
            }

            let evaluation = run_request(&session_id, input)?;
            print_evaluation(&evaluation);
            if !evaluation.decision.allows() {
                std::process::exit(1);
            }
        }

        Commands::Reply {
            session,
            text,
            elapsed_ms,
            justification,
        } => {
            let files = SessionFiles::new();
            let stored = files
                .load(&session)?
                .with_context(|| format!("No such session: {}", session))?;
            let user = stored.user_id.clone();

            let mut input = IncomingRequest::new(&session, &user, &text).with_reply(ChallengeReply {
                text: text.clone(),
                response_time_ms: elapsed_ms,
            });
            if let Some(justification) = justification {
                input = input.with_justification(&justification);
            }

            let evaluation = run_request(&session, input)?;
            print_evaluation(&evaluation);
            if !evaluation.decision.allows() {
                std::process::exit(1);
            }
        }

        Commands::Sessions => {
            let sessions = SessionFiles::new().list()?;
            if sessions.is_empty() {
                println!("No sessions.");
            } else {
                for session in sessions {
                    println!(
                        "{}  user {}  ceiling {}  last active {}",
                        session.id,
                        session.user_id,
                        session.ceiling(),
                        session.last_activity.format("%Y-%m-%d %H:%M:%S"),
                    );
                }
            }
        }

        Commands::Show { session } => {
            let stored = SessionFiles::new()
                .load(&session)?
                .with_context(|| format!("No such session: {}", session))?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
    }

    Ok(())
}
