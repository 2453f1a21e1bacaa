//! schedule-import
//!
//! Imports project schedule exports, derives milestone status, and records
//! every divergence from the last accepted snapshot with a reason.

use anyhow::{Context, Result, bail};
use clap::Parser;
use schedule_import::cli::history::HistoryArgs;
use schedule_import::cli::import::{ImportArgs, apply_reasons, load_reasons};
use schedule_import::cli::show::ShowArgs;
use schedule_import::cli::{Cli, Command};
use schedule_import::config::{Config, ConfigLoader};
use schedule_import::db::Database;
use schedule_import::diff::DiffSettings;
use schedule_import::engine::ImportEngine;
use schedule_import::error::ImportError;
use schedule_import::format::{
    OutputFormat, render_commit, render_history, render_projects, render_session, render_snapshot,
};
use schedule_import::logging::{LogTarget, init_logging};
use schedule_import::store::SnapshotStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut loader = ConfigLoader::load_from(cli.config.as_deref().map(Path::new))?;
    if let Some(ref db_path) = cli.database {
        loader.config_mut().store.db_path = PathBuf::from(db_path);
    }
    if let Some(format) = cli.format {
        loader.config_mut().output.format = format;
    }
    debug!(sources = ?loader.sources(), "Configuration loaded");
    let config = loader.into_config();

    match cli.command {
        Command::Import(args) => run_import(&config, args),
        Command::Show(args) => run_show(&config, args),
        Command::History(args) => run_history(&config, args),
        Command::Projects => run_projects(&config),
    }
}

fn open_database(config: &Config) -> Result<Database> {
    Database::open(&config.store.db_path)
        .with_context(|| format!("failed to open database {}", config.store.db_path.display()))
}

fn run_import(config: &Config, args: ImportArgs) -> Result<ExitCode> {
    let format = config.output.format;
    let engine = ImportEngine::with_settings(open_database(config)?, DiffSettings::from(&config.import));

    let handle = engine.begin_file(&args.file, args.as_of)?;
    info!(session = %handle, file = %args.file.display(), "Import started");

    if let Some(ref path) = args.reasons {
        let reasons = load_reasons(path)?;
        let applied = apply_reasons(&engine, &handle, &reasons)?;
        info!(session = %handle, applied, "Reasons applied");
    }

    println!(
        "{}",
        render_session(format, &handle, args.as_of, &engine.projects(&handle)?)?
    );

    if args.dry_run {
        engine.abandon(&handle)?;
        info!(session = %handle, "Dry run; nothing committed");
        return Ok(ExitCode::SUCCESS);
    }

    match engine.commit(&handle) {
        Ok(result) => {
            println!("{}", render_commit(format, &result)?);
            Ok(if result.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e @ ImportError::UnjustifiedChanges(_)) | Err(e @ ImportError::ConcurrentModification { .. }) => {
            report_error(format, &e)?;
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

fn report_error(format: OutputFormat, error: &ImportError) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&error.report())?),
        OutputFormat::Markdown => {
            let report = error.report();
            println!("**{:?}**: {}", report.code, report.message);
            if let Some(details) = report.details {
                println!("- {}", details);
            }
        }
    }
    Ok(())
}

fn run_show(config: &Config, args: ShowArgs) -> Result<ExitCode> {
    let db = open_database(config)?;
    let Some(snapshot) = db.get(&args.code)? else {
        bail!("no snapshot stored for project {}", args.code);
    };
    println!("{}", render_snapshot(config.output.format, &snapshot)?);
    Ok(ExitCode::SUCCESS)
}

fn run_history(config: &Config, args: HistoryArgs) -> Result<ExitCode> {
    let db = open_database(config)?;
    let entries: Vec<_> = db
        .history(&args.code)?
        .into_iter()
        .filter(|e| args.includes(e.revision))
        .collect();
    println!("{}", render_history(config.output.format, &args.code, &entries)?);
    Ok(ExitCode::SUCCESS)
}

fn run_projects(config: &Config) -> Result<ExitCode> {
    let db = open_database(config)?;
    println!("{}", render_projects(config.output.format, &db.list()?)?);
    Ok(ExitCode::SUCCESS)
}
