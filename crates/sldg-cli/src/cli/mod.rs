//! Command-line interface for the `sldg` application.

mod ledger;
mod morsel;

use clap::Parser;
use eyre::{Result, eyre};
use sldg_core::hash::LedgerHash;

pub use self::ledger::LedgerCommands;
pub use self::morsel::MorselCommands;

/// Environment variable naming the default ledger directory.
pub const SLDG_DIR: &str = "SLDG_DIR";

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = "sldg")]
#[command(about = "Tamper-evident skip ledgers and morsels")]
pub struct Cli {
    /// CLI top-level command group.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level command groups.
#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Ledger-side commands over a ledger directory.
    Ledger {
        /// Ledger subcommands.
        #[command(subcommand)]
        command: LedgerCommands,
    },
    /// Client-side commands over `.mrsl` files.
    Morsel {
        /// Morsel subcommands.
        #[command(subcommand)]
        command: MorselCommands,
    },
}

/// Parse a 32-byte hash from hex.
pub fn parse_hash(s: &str) -> Result<LedgerHash> {
    s.parse()
        .map_err(|err| eyre!("Invalid hash: {err}. Expected 64 hex characters."))
}

/// Parse a comma-separated, strictly positive row-number list.
pub fn parse_rn_list(s: &str) -> Result<Vec<u64>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let rn: u64 = part
                .parse()
                .map_err(|_| eyre!("Invalid row number: {part}"))?;
            if rn == 0 {
                return Err(eyre!("Row numbers start at 1"));
            }
            Ok(rn)
        })
        .collect()
}

/// Parse a comma-separated, strictly positive column-number list.
pub fn parse_column_list(s: &str) -> Result<Vec<u32>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let column: u32 = part
                .parse()
                .map_err(|_| eyre!("Invalid column number: {part}"))?;
            if column == 0 {
                return Err(eyre!("Column numbers start at 1"));
            }
            Ok(column)
        })
        .collect()
}
