//! # privdoc CLI
//!
//! Command-line client for the private document ingestion and QA service.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `privdoc login --username <u>` | Exchange credentials for an access token |
//! | `privdoc upload <files...>` | Submit files and track ingestion to the end |
//! | `privdoc track <job_id>` | Track an already-submitted job |
//! | `privdoc list` | List ingested documents |
//! | `privdoc delete <name>` | Delete a document and print the refreshed list |
//! | `privdoc ask "<question>"` | Ask a question over the ingested documents |
//! | `privdoc health` | Probe the service |
//!
//! Protected commands take the token from `--token` or `PRIVDOC_TOKEN`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use privdoc::api::{FileBlob, DEFAULT_SNIPPET_CHARS};
use privdoc::tracking::{
    Anomaly, Delta, DeltaKind, ItemMap, JobId, PollOutcome, PresentationSink, Status,
};
use privdoc::{AppError, AppState, Config};

const DEFAULT_LOG_FILTER: &str = "warn,privdoc=info";

#[derive(Parser)]
#[command(
    name = "privdoc",
    about = "Client for a private document ingestion and question-answering service",
    version
)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Access token for protected commands.
    #[arg(long, global = true, env = "PRIVDOC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the access token.
    Login {
        #[arg(long)]
        username: String,

        /// Password. Read from `PRIVDOC_PASSWORD` when omitted.
        #[arg(long, env = "PRIVDOC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Upload files and track their ingestion until the job ends.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Track an existing ingestion job.
    Track { job_id: String },

    /// List ingested documents.
    List,

    /// Delete an ingested document.
    Delete { name: String },

    /// Ask a question over the ingested documents.
    Ask { query: String },

    /// Check that the service is up.
    Health,
}

// ─────────────────────────────────────────────────────────────────────────────
// Console sink
// ─────────────────────────────────────────────────────────────────────────────

/// Prints tracking progress to stdout.
struct ConsoleSink;

impl PresentationSink for ConsoleSink {
    fn on_deltas(&self, _job_id: &JobId, deltas: &[Delta]) {
        for delta in deltas {
            match (delta.current, delta.progress) {
                (Status::InProgress, Some(progress)) => {
                    println!("  {:<40} {} {}%", delta.name, delta.current, progress)
                }
                _ if delta.kind == DeltaKind::Created => {
                    println!("  {:<40} {} (new)", delta.name, delta.current)
                }
                _ => println!("  {:<40} {}", delta.name, delta.current),
            }
        }
    }

    fn on_anomaly(&self, _job_id: &JobId, anomaly: &Anomaly) {
        eprintln!(
            "  warning: {} went from {} back to {}",
            anomaly.name, anomaly.from, anomaly.to
        );
    }

    fn on_finished(&self, job_id: &JobId, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::Completed => println!("Job {} completed.", job_id),
            PollOutcome::Failed => println!("Job {} failed.", job_id),
            PollOutcome::Unauthorized => {
                println!("Session expired while tracking {}. Log in again.", job_id)
            }
            PollOutcome::Stopped => println!("Stopped tracking {}.", job_id),
            PollOutcome::Error(e) => {
                let presentation = e.to_presentation();
                println!(
                    "Tracking {} stopped: {}. Run `privdoc track {}` to resume.",
                    job_id, presentation.message, job_id
                );
            }
        }
    }

    fn on_documents(&self, names: &[String]) {
        println!("{} document(s) ingested.", names.len());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    if let Err(e) = result {
        eprintln!("Log system initialization failed: {e}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            let presentation = e.to_presentation();
            eprintln!("Error: {}: {}", presentation.title, presentation.message);
            if let Some(action) = presentation.action {
                eprintln!("  {}", action);
            }
            ExitCode::FAILURE
        }
    }
}

/// Runs one command. `Ok(false)` means the command ran but the job it
/// tracked did not complete.
async fn run(cli: Cli) -> Result<bool, AppError> {
    let config = Config::load(cli.config.as_deref())?;
    let state = AppState::from_config(config, Arc::new(ConsoleSink))?;
    if let Some(token) = cli.token {
        state.use_token(token).await;
    }

    match cli.command {
        Commands::Login { username, password } => {
            let session = state
                .login(&username, &SecretString::from(password))
                .await?;
            println!("{}", session.expose_token());
        }

        Commands::Upload { files } => {
            let mut blobs = Vec::with_capacity(files.len());
            for path in &files {
                blobs.push(FileBlob::from_path(path).await?);
            }
            let report = state.uploads.run(blobs).await?;
            return Ok(report.poll.outcome.is_success());
        }

        Commands::Track { job_id } => {
            let handle = state.track(JobId::new(job_id), ItemMap::new()).await?;
            let report = handle.finished().await;
            return Ok(report.outcome.is_success());
        }

        Commands::List => {
            let names = state.documents.list().await?;
            if names.is_empty() {
                println!("No documents ingested.");
            }
            for name in names {
                println!("{}", name);
            }
        }

        Commands::Delete { name } => {
            let remaining = state.documents.delete_and_refresh(&name).await?;
            println!("Deleted {}. {} document(s) remain.", name, remaining.len());
        }

        Commands::Ask { query } => {
            let answer = state.query.ask(&query).await?;
            println!("{}", answer.answer);
            if !answer.citations.is_empty() {
                println!();
                println!("Sources:");
                for citation in &answer.citations {
                    println!("  [{}]", citation.source_filename());
                    println!("    {}", citation.snippet(DEFAULT_SNIPPET_CHARS));
                }
            }
        }

        Commands::Health => {
            let health = state.query.health().await?;
            println!("{}: {}", health.status, health.message);
            return Ok(health.is_ok());
        }
    }

    Ok(true)
}
