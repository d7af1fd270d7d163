//! Ledger-side command implementations.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use eyre::{Context as _, Result};
use rand::Rng as _;
use sldg_core::crumtrail::Crumtrail;
use sldg_core::hash::HASH_WIDTH;
use sldg_logs::grammar::LogFormat;
use sldg_logs::observer::{CompositeObserver, SourceCollector};
use sldg_logs::replay::Replay;
use sldg_logs::track::TrackDir;
use sldg_morsel::build::MorselBuilder;
use sldg_morsel::pack::MorselMeta;
use sldg_store::file::FileBackend;
use sldg_store::ledger::Ledger;
use tracing::info;

use super::{UserError, emit};
use crate::cli::parse_rn_list;

fn open_ledger(dir: &Path) -> Result<Ledger<FileBackend>> {
    let backend = FileBackend::open(dir)
        .with_context(|| format!("Failed to open ledger at {}", dir.display()))?;
    Ok(Ledger::open(backend)?)
}

/// `ledger create`: lay down the table, trail, and tracking files.
pub fn create(
    dir: &Path,
    dex: u8,
    seed_file: Option<PathBuf>,
    comment_chars: &str,
    delimiters: &str,
) -> Result<()> {
    let seed = match seed_file {
        Some(path) => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file {}", path.display()))?;
            let bytes = hex::decode(text.trim())
                .map_err(|err| UserError(format!("Seed file is not hex: {err}")))?;
            <[u8; HASH_WIDTH]>::try_from(bytes.as_slice())
                .map_err(|_| UserError("Seed must be exactly 32 bytes".into()))?
        }
        None => rand::rng().random(),
    };
    let format = LogFormat::new(comment_chars, delimiters)
        .map_err(|err| UserError(err.to_string()))?;
    FileBackend::create(dir)?;
    TrackDir::create(dir, dex, seed, format)?;
    info!(dir = %dir.display(), "created ledger");
    emit(&format!("created empty ledger at {}", dir.display()))
}

/// `ledger status`: size, commitment, witness coverage.
pub fn status(dir: &Path) -> Result<()> {
    let ledger = open_ledger(dir)?;
    let track = TrackDir::open(dir)?;
    emit(&format!("size:        {}", ledger.size()))?;
    emit(&format!("state hash:  {}", ledger.ledger_hash()))?;
    emit(&format!(
        "witnessed:   {} row(s)",
        ledger.trailed_rns()?.len()
    ))?;
    emit(&format!(
        "checkpoints: {} (every {} rows)",
        track.checkpoint_count()?,
        track.spacing()
    ))
}

/// `ledger update`: replay the source log into the ledger.
pub fn update(dir: &Path, log: &Path, repair: bool) -> Result<()> {
    let mut ledger = open_ledger(dir)?;
    let mut track = TrackDir::open(dir)?;
    let reader = BufReader::new(
        fs::File::open(log).with_context(|| format!("Failed to open log {}", log.display()))?,
    );
    let summary = Replay::new(&mut ledger, &mut track)
        .repair(repair)
        .play(reader, &mut CompositeObserver::new())?;
    info!(rows_added = summary.rows_added, size = summary.size, "update complete");
    emit(&format!(
        "{} row(s) added; size {}; state hash {}",
        summary.rows_added, summary.size, summary.ledger_hash
    ))
}

/// `ledger list`: rows with their hashes.
pub fn list(dir: &Path, from: Option<u64>, to: Option<u64>) -> Result<()> {
    let ledger = open_ledger(dir)?;
    let from = from.unwrap_or(1).max(1);
    let to = to.unwrap_or_else(|| ledger.size()).min(ledger.size());
    for rn in from..=to {
        emit(&format!(
            "{rn}\t{}\t{}",
            ledger.row_hash(rn)?,
            ledger.input_hash(rn)?
        ))?;
    }
    Ok(())
}

/// `ledger validate`: integrity scan.
pub fn validate(dir: &Path, from: Option<u64>, to: Option<u64>) -> Result<()> {
    let ledger = open_ledger(dir)?;
    let from = from.unwrap_or(1);
    let to = to.unwrap_or_else(|| ledger.size());
    ledger.check_integrity(from, to, || false)?;
    emit(&format!("rows {from}..={to} verify"))
}

/// `ledger rollback`: truncate rows and tracking past the cut.
pub fn rollback(dir: &Path, to: u64) -> Result<()> {
    let mut ledger = open_ledger(dir)?;
    if to >= ledger.size() {
        return Err(UserError(format!(
            "ledger holds {} row(s); nothing to roll back at {to}",
            ledger.size()
        ))
        .into());
    }
    ledger.truncate(to)?;
    let mut track = TrackDir::open(dir)?;
    track.truncate_to(to)?;
    emit(&format!(
        "rolled back to {} row(s); state hash {}",
        ledger.size(),
        ledger.ledger_hash()
    ))
}

/// `ledger witness`: store a crumtrail for a row.
pub fn witness(dir: &Path, rn: u64, trail_file: &Path) -> Result<()> {
    let mut ledger = open_ledger(dir)?;
    let bytes = fs::read(trail_file)
        .with_context(|| format!("Failed to read trail {}", trail_file.display()))?;
    let trail = Crumtrail::from_bytes(&bytes)?;
    ledger.put_crumtrail(rn, &trail)?;
    emit(&format!(
        "row {rn} witnessed at utc_ms {}",
        trail.utc_ms()
    ))
}

/// `ledger history`: witnessed rows and their anchor times.
pub fn history(dir: &Path) -> Result<()> {
    let ledger = open_ledger(dir)?;
    let rns = ledger.trailed_rns()?;
    if rns.is_empty() {
        return emit("no witnessed rows");
    }
    for rn in rns {
        if let Some(trail) = ledger.crumtrail(rn)? {
            emit(&format!(
                "{rn}\tutc_ms {}\t{}",
                trail.utc_ms(),
                trail.ref_url()
            ))?;
        }
    }
    Ok(())
}

/// `ledger morsel`: package rows and witnesses into a `.mrsl` file.
pub fn morsel(
    dir: &Path,
    out: &Path,
    targets: Option<&str>,
    log: Option<&Path>,
    name: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let mut ledger = open_ledger(dir)?;
    if ledger.size() == 0 {
        return Err(UserError("the ledger is empty".into()).into());
    }
    let rns = match targets {
        Some(list) => {
            let rns = parse_rn_list(list).map_err(|err| UserError(err.to_string()))?;
            if rns.is_empty() {
                return Err(UserError("no target rows given".into()).into());
            }
            Some(rns)
        }
        None => None,
    };
    let sources = match (&rns, log) {
        (Some(rns), Some(log)) => {
            let mut track = TrackDir::open(dir)?;
            let reader = BufReader::new(
                fs::File::open(log)
                    .with_context(|| format!("Failed to open log {}", log.display()))?,
            );
            let mut collector = SourceCollector::new(rns.iter().copied());
            Replay::new(&mut ledger, &mut track).play(reader, &mut collector)?;
            collector.into_rows()
        }
        _ => Vec::new(),
    };
    let path = match rns {
        Some(rns) => ledger.path_to(&rns)?,
        None => ledger.state_path()?,
    };
    let mut builder = MorselBuilder::from_path(&path);
    for source in sources {
        builder.add_source(source);
    }
    for rn in ledger.trailed_rns()? {
        if let Some(trail) = ledger.crumtrail(rn)? {
            builder.add_trail(rn, trail);
        }
    }
    if name.is_some() || description.is_some() {
        builder.meta(MorselMeta {
            name: name.unwrap_or_default(),
            description: description.unwrap_or_default(),
            ..MorselMeta::default()
        });
    }
    let morsel = builder.build()?;
    fs::write(out, morsel.to_bytes())
        .with_context(|| format!("Failed to write {}", out.display()))?;
    emit(&format!(
        "wrote {} ({} rows, {} witness(es)) declaring state {}",
        out.display(),
        morsel.rows().len(),
        morsel.trails().len(),
        morsel.hi_hash()
    ))
}

