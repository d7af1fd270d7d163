//! Client-side subcommands: reading and reshaping `.mrsl` files.

use std::path::PathBuf;

/// Client-side subcommands.
#[derive(Debug, clap::Subcommand)]
pub enum MorselCommands {
    /// One-line summary: declared row number and commitment.
    Sum {
        /// The `.mrsl` file.
        file: PathBuf,
    },
    /// Content summary: rows, sources, witnesses, metadata.
    Info {
        /// The `.mrsl` file.
        file: PathBuf,
    },
    /// Verify the morsel and print its declared state.
    State {
        /// The `.mrsl` file.
        file: PathBuf,
    },
    /// Print one source row as JSON.
    Entry {
        /// The `.mrsl` file.
        file: PathBuf,
        /// The source row number.
        #[arg(long)]
        rn: u64,
    },
    /// List witness records and the times they anchor.
    History {
        /// The `.mrsl` file.
        file: PathBuf,
    },
    /// Merge morsels from the same ledger into one.
    Merge {
        /// Input `.mrsl` files.
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        /// Output `.mrsl` file.
        #[arg(long)]
        out: PathBuf,
    },
    /// Extract a sub-morsel, optionally redacting columns.
    Submerge {
        /// The input `.mrsl` file.
        file: PathBuf,
        /// Output `.mrsl` file.
        #[arg(long)]
        out: PathBuf,
        /// Comma-separated source row numbers to keep.
        #[arg(long)]
        rows: String,
        /// Comma-separated 1-based column numbers to redact.
        #[arg(long)]
        redact: Option<String>,
        /// Description recorded in the output's meta section.
        #[arg(long)]
        comment: Option<String>,
    },
    /// Print the whole morsel as JSON.
    Dump {
        /// The `.mrsl` file.
        file: PathBuf,
    },
}
