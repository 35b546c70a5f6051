//! `learnhub` command-line front end.
//!
//! # Responsibility
//! - Resolve database and logging settings from flags or environment.
//! - Map subcommands onto core services and print pretty JSON on stdout.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{AssignArgs, CatalogArgs, CompositeCommand, ModuleCommand, ProgressCommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "learnhub")]
#[command(version, about = "Composite content and learner catalog tooling")]
struct Cli {
    /// SQLite database file; created and migrated on first use.
    #[arg(long, global = true, env = "LEARNHUB_DB", default_value = "learnhub.db")]
    db: PathBuf,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "LEARNHUB_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Logging is off when unset.
    #[arg(long, global = true, env = "LEARNHUB_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create, inspect, replace or delete surveys and assessments
    #[command(subcommand)]
    Composite(CompositeCommand),
    /// Manage flat learning modules
    #[command(subcommand)]
    Module(ModuleCommand),
    /// Assign content to an organization for a time window
    Assign(AssignArgs),
    /// Record learner progress markers
    #[command(subcommand)]
    Progress(ProgressCommand),
    /// Print the active catalog of one learner
    Catalog(CatalogArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli
            .log_level
            .as_deref()
            .unwrap_or(learnhub_core::default_log_level());
        learnhub_core::init_logging(level, log_dir).context("failed to initialize logging")?;
    }

    let conn = learnhub_core::db::open_db(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;

    let output = match cli.command {
        Command::Composite(command) => command.execute(&conn)?,
        Command::Module(command) => command.execute(&conn)?,
        Command::Assign(args) => args.execute(&conn)?,
        Command::Progress(command) => command.execute(&conn)?,
        Command::Catalog(args) => args.execute(&conn)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
