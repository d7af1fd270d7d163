//! Ledger-side subcommands: producing and maintaining a hash ledger.

use std::path::PathBuf;

use super::SLDG_DIR;

/// Arguments common to every ledger command.
#[derive(Debug, clap::Args)]
pub struct DirArgs {
    /// The ledger directory.
    #[arg(long, env = SLDG_DIR)]
    pub dir: PathBuf,
}

/// Ledger-side subcommands.
#[derive(Debug, clap::Subcommand)]
pub enum LedgerCommands {
    /// Create a fresh ledger directory.
    Create {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
        /// Checkpoint spacing exponent: a checkpoint lands every `2^dex`
        /// rows.
        #[arg(long, default_value_t = 4)]
        dex: u8,
        /// File holding the 32-byte salt seed as 64 hex characters; a fresh
        /// random seed is generated when omitted.
        #[arg(long)]
        seed_file: Option<PathBuf>,
        /// Characters that open a comment line in the source log.
        #[arg(long, default_value = "#")]
        comment_chars: String,
        /// Column delimiter characters; empty splits on whitespace.
        #[arg(long, default_value = "")]
        delimiters: String,
    },
    /// Report the ledger size, commitment, and witness coverage.
    Status {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
    },
    /// Hash new lines of the source log into the ledger.
    Update {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
        /// The source log to replay.
        #[arg(long)]
        log: PathBuf,
        /// Rewrite conflicting tracking offsets from the rescan instead of
        /// aborting.
        #[arg(long)]
        repair: bool,
    },
    /// Print rows and their hashes.
    List {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
        /// First row to print (default 1).
        #[arg(long)]
        from: Option<u64>,
        /// Last row to print (default the ledger size).
        #[arg(long)]
        to: Option<u64>,
    },
    /// Re-derive row-hashes from stored inputs and report the first
    /// conflict.
    Validate {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
        /// First row to check (default 1).
        #[arg(long)]
        from: Option<u64>,
        /// Last row to check (default the ledger size).
        #[arg(long)]
        to: Option<u64>,
    },
    /// Truncate the ledger, destroying later rows and their witnesses.
    Rollback {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
        /// The size to roll back to.
        #[arg(long)]
        to: u64,
    },
    /// Store a witness record for a row.
    Witness {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
        /// The witnessed row number.
        #[arg(long)]
        rn: u64,
        /// File holding the serialized crumtrail.
        #[arg(long)]
        trail: PathBuf,
    },
    /// List witnessed rows and their times.
    History {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
    },
    /// Package rows, linkage, and witnesses into a morsel file.
    Morsel {
        /// Common directory argument.
        #[command(flatten)]
        dir: DirArgs,
        /// Output `.mrsl` file.
        #[arg(long)]
        out: PathBuf,
        /// Comma-separated target row numbers; the state path alone when
        /// omitted.
        #[arg(long)]
        targets: Option<String>,
        /// Source log to re-read so target rows carry their source content.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Morsel name recorded in the meta section.
        #[arg(long)]
        name: Option<String>,
        /// Morsel description recorded in the meta section.
        #[arg(long)]
        description: Option<String>,
    },
}
