//! The `sldg` CLI application.

mod cli;
mod commands;

use clap::Parser as _;
use cli::{Cli, Commands, LedgerCommands, MorselCommands};

fn init_tracing() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize tracing: {:?}", e))?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    // Load .env file (fails silently if not found)
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let cli = Cli::parse();

    let res = match cli.command {
        Commands::Ledger { command } => match command {
            LedgerCommands::Create {
                dir,
                dex,
                seed_file,
                comment_chars,
                delimiters,
            } => commands::ledger::create(&dir.dir, dex, seed_file, &comment_chars, &delimiters),
            LedgerCommands::Status { dir } => commands::ledger::status(&dir.dir),
            LedgerCommands::Update { dir, log, repair } => {
                commands::ledger::update(&dir.dir, &log, repair)
            }
            LedgerCommands::List { dir, from, to } => {
                commands::ledger::list(&dir.dir, from, to)
            }
            LedgerCommands::Validate { dir, from, to } => {
                commands::ledger::validate(&dir.dir, from, to)
            }
            LedgerCommands::Rollback { dir, to } => commands::ledger::rollback(&dir.dir, to),
            LedgerCommands::Witness { dir, rn, trail } => {
                commands::ledger::witness(&dir.dir, rn, &trail)
            }
            LedgerCommands::History { dir } => commands::ledger::history(&dir.dir),
            LedgerCommands::Morsel {
                dir,
                out,
                targets,
                log,
                name,
                description,
            } => commands::ledger::morsel(
                &dir.dir,
                &out,
                targets.as_deref(),
                log.as_deref(),
                name,
                description,
            ),
        },
        Commands::Morsel { command } => match command {
            MorselCommands::Sum { file } => commands::morsel::sum(&file),
            MorselCommands::Info { file } => commands::morsel::info(&file),
            MorselCommands::State { file } => commands::morsel::state(&file),
            MorselCommands::Entry { file, rn } => commands::morsel::entry(&file, rn),
            MorselCommands::History { file } => commands::morsel::history(&file),
            MorselCommands::Merge { inputs, out } => commands::morsel::merge(&inputs, &out),
            MorselCommands::Submerge {
                file,
                out,
                rows,
                redact,
                comment,
            } => commands::morsel::submerge(
                &file,
                &out,
                &rows,
                redact.as_deref(),
                comment.as_deref(),
            ),
            MorselCommands::Dump { file } => commands::morsel::dump(&file),
        },
    };

    if let Err(e) = res {
        tracing::error!("Error: {:?}", e);
        std::process::exit(commands::exit_code(&e));
    }

    Ok(())
}
