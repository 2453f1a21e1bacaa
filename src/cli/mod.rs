//! CLI command definitions for schedule-import
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod history;
pub mod import;
pub mod show;

use crate::format::OutputFormat;
use clap::{Parser, Subcommand};
use history::HistoryArgs;
use import::ImportArgs;
use show::ShowArgs;

/// Project schedule import with justified change tracking
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Output format (overrides config)
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a schedule export, report changes, and commit justified projects
    Import(ImportArgs),

    /// Show the stored snapshot of one project
    Show(ShowArgs),

    /// Show the audit trail of one project
    History(HistoryArgs),

    /// List stored projects
    Projects,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_with_global_flags() {
        let cli = Cli::try_parse_from([
            "schedule-import",
            "--format",
            "json",
            "import",
            "plan.json",
            "--as-of",
            "2025-04-01",
            "--dry-run",
            "-d",
            "plans.db",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert_eq!(cli.database.as_deref(), Some("plans.db"));
        match cli.command {
            Command::Import(args) => {
                assert!(args.dry_run);
                assert_eq!(args.file.to_str(), Some("plan.json"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_projects() {
        let cli = Cli::try_parse_from(["schedule-import", "projects"]).unwrap();
        assert!(matches!(cli.command, Command::Projects));
        assert_eq!(cli.log, "2");
    }
}
