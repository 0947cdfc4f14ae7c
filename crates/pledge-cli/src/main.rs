//! Pledge CLI
//!
//! Operator tool over a promise database: inspect records, resolve them by
//! hand and run the stale sweep outside the host process.
//!
//! # Usage
//! ```bash
//! pledge [--db .pledge/promises.db] [--config pledge.json] [--verbose] <COMMAND>
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use pledge_core::{
    Outcome, PledgeConfig, PromiseId, PromiseManager, PromiseRecord, PromiseState, Rejection,
    SqliteStore,
};

/// Pledge - inspect and maintain a durable promise database
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Promise database (overrides the config file)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every stored promise
    List {
        /// Output in JSON format for integrations
        #[arg(long)]
        json: bool,
    },

    /// Show a single promise record
    Show { id: PromiseId },

    /// Create a new unresolved promise and print its identifier
    Create,

    /// Fulfill a promise with a text payload
    Fulfill { id: PromiseId, text: String },

    /// Reject a promise
    Reject { id: PromiseId, message: String },

    /// Time out unresolved promises and remove stale records
    Sweep {
        /// Age threshold in seconds (default: stale_after_secs from config)
        #[arg(long, value_name = "SECS")]
        older_than: Option<u64>,
    },

    /// Remove a resolved promise and print its outcome
    Consume { id: PromiseId },

    /// Database statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => PledgeConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PledgeConfig::default(),
    };
    if let Some(db) = &cli.db {
        config = config.with_database_path(db);
    }
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("failed to open {}", config.database_path.display()))?,
    );
    tracing::debug!(path = %config.database_path.display(), "promise database opened");
    let manager = PromiseManager::with_config(store.clone(), config);

    match cli.command {
        Commands::List { json } => {
            let records = manager.records()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No promises stored.");
            } else {
                let now = chrono::Utc::now();
                for record in &records {
                    println!(
                        "{}  {:<10}  {:>8}s  {}",
                        record.id,
                        record.state.label(),
                        record.age(now).as_secs(),
                        summary(&record.state)
                    );
                }
            }
        }
        Commands::Show { id } => {
            let record = manager.record(id)?;
            print_record(&record)?;
        }
        Commands::Create => {
            let id = manager.create(None)?;
            println!("{}", id);
        }
        Commands::Fulfill { id, text } => {
            manager.fulfill(id, text)?;
            println!("Fulfilled {}", id);
        }
        Commands::Reject { id, message } => {
            manager.reject(id, Rejection::failed(message), None)?;
            println!("Rejected {}", id);
        }
        Commands::Sweep { older_than } => {
            let threshold = older_than
                .map(Duration::from_secs)
                .unwrap_or_else(|| manager.config().stale_after());
            tracing::debug!(threshold_secs = threshold.as_secs(), "running stale sweep");
            let report = manager.sweep_stale(threshold)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Consume { id } => match manager.consume(id)? {
            Some(Outcome::Fulfilled(payload)) => println!("fulfilled: {}", payload),
            Some(Outcome::Rejected { error, .. }) => println!("rejected: {}", error),
            None => println!("{} is still unresolved; nothing consumed", id),
        },
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn summary(state: &PromiseState) -> String {
    match state {
        PromiseState::Unresolved => String::new(),
        PromiseState::Fulfilled { payload } => payload.to_string(),
        PromiseState::Rejected { error, .. } => error.to_string(),
    }
}

fn print_record(record: &PromiseRecord) -> anyhow::Result<()> {
    println!("ID:       {}", record.id);
    println!("STATE:    {}", record.state.label());
    println!("CREATED:  {}", record.created_at.to_rfc3339());
    match &record.state {
        PromiseState::Unresolved => {}
        PromiseState::Fulfilled { payload } => println!("PAYLOAD:  {}", payload),
        PromiseState::Rejected { error, .. } => println!("ERROR:    {}", error),
    }
    if let Some(correlation) = &record.correlation {
        println!("CONTEXT:  {}", serde_json::to_string(correlation)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sweep_threshold() {
        let cli = Cli::parse_from(["pledge", "--db", "x.db", "sweep", "--older-than", "60"]);
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        assert!(matches!(cli.command, Commands::Sweep { older_than: Some(60) }));
    }

    #[test]
    fn test_parse_rejects_malformed_id() {
        assert!(Cli::try_parse_from(["pledge", "show", "not-an-id"]).is_err());
    }
}
