use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use strata_geom::Aabb;
use thiserror::Error;

use crate::operation::TerrainOperation;

pub const JOURNAL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal i/o: {0}")]
    Io(#[from] io::Error),
    #[error("journal {} line {line}: {reason}", path.display())]
    Corruption {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("journal version {found} is not supported (expected {})", JOURNAL_VERSION)]
    UnsupportedVersion { found: u32 },
    #[error("journal encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// First line of every journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalHeader {
    pub version: u32,
    pub seed: i32,
}

/// One committed writer operation together with the region it was computed to touch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub region: Aabb,
    pub operation: TerrainOperation,
}

impl From<TerrainOperation> for JournalEntry {
    fn from(operation: TerrainOperation) -> Self {
        Self {
            region: operation.affected_region(),
            operation,
        }
    }
}

/// Append-only JSON-lines log: a header line followed by one entry per line.
pub struct Journal {
    path: PathBuf,
    out: BufWriter<File>,
    seed: i32,
    len: usize,
}

impl Journal {
    /// Opens the journal at `path` and reads back its entries, or starts a new one
    /// seeded with `seed_hint` (random when `None`). An existing journal keeps its
    /// own seed.
    pub fn open_or_create(
        path: &Path,
        seed_hint: Option<i32>,
    ) -> Result<(Self, Vec<JournalEntry>), JournalError> {
        let existing = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        if !existing {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let seed = seed_hint.unwrap_or_else(|| fastrand::i32(..));
            let mut out = BufWriter::new(File::create(path)?);
            let header = JournalHeader {
                version: JOURNAL_VERSION,
                seed,
            };
            serde_json::to_writer(&mut out, &header)?;
            out.write_all(b"\n")?;
            out.flush()?;
            log::info!(target: "journal", "new journal {} with seed {seed}", path.display());
            return Ok((
                Self {
                    path: path.to_path_buf(),
                    out,
                    seed,
                    len: 0,
                },
                Vec::new(),
            ));
        }

        let (header, entries) = read_journal(path)?;
        if let Some(hint) = seed_hint.filter(|&s| s != header.seed) {
            log::warn!(
                target: "journal",
                "configured seed {hint} ignored; {} was created with seed {}",
                path.display(),
                header.seed
            );
        }
        log::info!(
            target: "journal",
            "opened journal {} with {} entries",
            path.display(),
            entries.len()
        );
        let file = OpenOptions::new().append(true).open(path)?;
        Ok((
            Self {
                path: path.to_path_buf(),
                out: BufWriter::new(file),
                seed: header.seed,
                len: entries.len(),
            },
            entries,
        ))
    }

    /// Writes `entry` and flushes it to the file before returning.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        serde_json::to_writer(&mut self.out, entry)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.len += 1;
        log::debug!(target: "journal", "appended {} (#{})", entry.operation.name(), self.len);
        Ok(())
    }

    pub fn seed(&self) -> i32 {
        self.seed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn read_journal(path: &Path) -> Result<(JournalHeader, Vec<JournalEntry>), JournalError> {
    let corrupt = |line: usize, reason: String| JournalError::Corruption {
        path: path.to_path_buf(),
        line,
        reason,
    };
    let mut lines = BufReader::new(File::open(path)?).lines();
    let first = lines
        .next()
        .transpose()?
        .ok_or_else(|| corrupt(1, "missing header".into()))?;
    let header: JournalHeader =
        serde_json::from_str(&first).map_err(|e| corrupt(1, format!("bad header: {e}")))?;
    if header.version != JOURNAL_VERSION {
        return Err(JournalError::UnsupportedVersion {
            found: header.version,
        });
    }
    let mut entries = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|e| corrupt(i + 2, e.to_string()))?;
        entries.push(entry);
    }
    Ok((header, entries))
}
