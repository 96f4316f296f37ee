use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dagobah_core::impls::InMemoryBackend;
use dagobah_core::{Backend, DagobahId, DagobahRecord, JobId, JobRecord, LogRecord, Record};
use dagobah_mongo::{MongoBackend, MongoConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Types
// ============================================================================

/// Inspect and edit persisted Dagobah state
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "dagobah.toml", global = true)]
    config: PathBuf,

    /// Use a throwaway in-memory backend instead of MongoDB
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect and report the backend
    Ping,

    /// Print a fresh, unused identifier
    NewId {
        #[arg(value_enum)]
        kind: Kind,
    },

    /// Print a stored Dagobah as JSON
    Show {
        #[arg(value_name = "DAGOBAH_ID")]
        dagobah_id: DagobahId,
    },

    /// Commit a JSON document read from a file
    Commit {
        #[arg(value_enum)]
        kind: Kind,

        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Delete a Dagobah and the jobs it references
    DeleteDagobah {
        #[arg(value_name = "DAGOBAH_ID")]
        dagobah_id: DagobahId,
    },

    /// Delete a single job
    DeleteJob {
        #[arg(value_name = "JOB_ID")]
        job_id: JobId,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Dagobah,
    Job,
    Log,
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let backend = open_backend(&cli.config, cli.memory).await?;
    let output = execute(backend.as_ref(), cli.command).await?;
    println!("{output}");
    Ok(())
}

/// Run one command against `backend` and return what to print.
///
/// Unknown Dagobahs are reported in the output for both `show` and
/// `delete-dagobah`; every other error is returned.
async fn execute(backend: &dyn Backend, command: Commands) -> Result<String> {
    let output = match command {
        Commands::Ping => "ok".to_string(),
        Commands::NewId { kind } => match kind {
            Kind::Dagobah => backend.get_new_dagobah_id().await?.key(),
            Kind::Job => backend.get_new_job_id().await?.key(),
            Kind::Log => backend.get_new_log_id().await?.key(),
        },
        Commands::Show { dagobah_id } => match backend.get_dagobah_json(dagobah_id).await? {
            Some(record) => serde_json::to_string_pretty(&record.to_json()?)?,
            None => format!("{dagobah_id} not found"),
        },
        Commands::Commit { kind, file } => {
            let value = read_json(&file)?;
            match kind {
                Kind::Dagobah => {
                    let record = DagobahRecord::from_json(value)?;
                    backend.commit_dagobah(&record).await?;
                    format!("committed {}", record.id())
                }
                Kind::Job => {
                    let record = JobRecord::from_json(value)?;
                    backend.commit_job(&record).await?;
                    format!("committed {}", record.id())
                }
                Kind::Log => {
                    let record = LogRecord::from_json(value)?;
                    backend.commit_log(&record).await?;
                    format!("committed {}", record.id())
                }
            }
        }
        Commands::DeleteDagobah { dagobah_id } => match backend.delete_dagobah(dagobah_id).await {
            Ok(()) => format!("deleted {dagobah_id}"),
            Err(err) if err.is_not_found() => format!("{dagobah_id} not found"),
            Err(err) => return Err(err.into()),
        },
        Commands::DeleteJob { job_id } => {
            backend.delete_job(job_id).await?;
            format!("deleted {job_id}")
        }
    };
    Ok(output)
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn open_backend(config_path: &Path, memory: bool) -> Result<Box<dyn Backend>> {
    if memory {
        info!("Using in-memory backend");
        return Ok(Box::new(InMemoryBackend::new()));
    }

    let config = MongoConfig::load(config_path)?.apply_process_env()?;
    let backend = MongoBackend::connect(config).await?;
    info!(backend = %backend, "Backend ready");
    Ok(Box::new(backend))
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
