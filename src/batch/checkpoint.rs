use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use csv::StringRecord;
use tracing::{error, info};

use super::accumulator::ResultAccumulator;
use crate::models::{ErrorRecord, MovementRecord};

const MOVEMENTS_PREFIX: &str = "movimentacoes";
const ERRORS_PREFIX: &str = "erros";

/// What a flush managed to persist.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub movements_written: usize,
    pub errors_written: usize,
    /// At least one file could not be written; its rows stay buffered.
    pub failed: bool,
}

/// Partial and final output files of one batch run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    tag_column: String,
    stamp: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, tag_column: impl Into<String>, started: DateTime<Local>) -> Self {
        Self {
            dir: dir.into(),
            tag_column: tag_column.into(),
            stamp: file_stamp(started),
        }
    }

    fn path(&self, prefix: &str, stage: &str, stamp: &str) -> PathBuf {
        self.dir.join(format!("{}_{}_{}.csv", prefix, stage, stamp))
    }

    /// Partial files are named after the batch start.
    pub fn partial_movements_path(&self) -> PathBuf {
        self.path(MOVEMENTS_PREFIX, "parcial", &self.stamp)
    }

    pub fn partial_errors_path(&self) -> PathBuf {
        self.path(ERRORS_PREFIX, "parcial", &self.stamp)
    }

    /// Final files are named after the moment the batch finished.
    pub fn final_movements_path(&self, completed: DateTime<Local>) -> PathBuf {
        self.path(MOVEMENTS_PREFIX, "final", &file_stamp(completed))
    }

    pub fn final_errors_path(&self, completed: DateTime<Local>) -> PathBuf {
        self.path(ERRORS_PREFIX, "final", &file_stamp(completed))
    }

    /// Merges buffered results into the partial files and clears what was written.
    ///
    /// A failed write is logged and leaves that buffer intact for the next flush.
    pub fn flush(&self, acc: &mut ResultAccumulator) -> FlushReport {
        let mut report = FlushReport::default();

        if !acc.records().is_empty() {
            let header = MovementRecord::csv_header(&self.tag_column);
            let rows: Vec<Vec<&str>> = acc.records().iter().map(MovementRecord::to_csv_row).collect();
            match merge_rows(&self.partial_movements_path(), &header, &rows) {
                Ok(total) => {
                    report.movements_written = rows.len();
                    info!(
                        "💾 Checkpoint: {} movimentações gravadas ({} no arquivo parcial)",
                        rows.len(),
                        total
                    );
                    acc.clear_records();
                }
                Err(e) => {
                    error!("❌ Erro ao salvar movimentações parciais: {:#}", e);
                    report.failed = true;
                }
            }
        }

        if !acc.failures().is_empty() {
            let rows: Vec<Vec<&str>> = acc
                .failures()
                .iter()
                .map(|f| vec![f.processo.as_str(), f.motivo.as_str()])
                .collect();
            match merge_rows(&self.partial_errors_path(), &ErrorRecord::CSV_HEADER, &rows) {
                Ok(total) => {
                    report.errors_written = rows.len();
                    info!(
                        "💾 Checkpoint: {} erros gravados ({} no arquivo parcial)",
                        rows.len(),
                        total
                    );
                    acc.clear_failures();
                }
                Err(e) => {
                    error!("❌ Erro ao salvar erros parciais: {:#}", e);
                    report.failed = true;
                }
            }
        }

        report
    }

    /// Promotes the partial files that exist to their final names.
    pub fn finalize(&self, completed: DateTime<Local>) -> Result<Vec<PathBuf>> {
        let mut promoted = Vec::new();
        for (partial, final_path) in [
            (self.partial_movements_path(), self.final_movements_path(completed)),
            (self.partial_errors_path(), self.final_errors_path(completed)),
        ] {
            if !partial.exists() {
                continue;
            }
            let final_path = vacant_path(final_path);
            fs::rename(&partial, &final_path).with_context(|| {
                format!(
                    "Unable to rename {} to {}",
                    partial.display(),
                    final_path.display()
                )
            })?;
            info!("✅ Arquivo final salvo: {}", final_path.display());
            promoted.push(final_path);
        }
        Ok(promoted)
    }
}

/// `path` itself, or the first `<stem>_<n>.csv` sibling that does not exist yet.
fn vacant_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let mut n = 1;
    loop {
        let candidate = path.with_file_name(format!("{}_{}.csv", stem, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn file_stamp(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Rewrites `path` as its existing rows plus `rows`, through a temporary sibling.
/// Returns the number of data rows now in the file.
fn merge_rows<H: AsRef<[u8]>>(path: &Path, header: &[H], rows: &[Vec<&str>]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Unable to create directory {}", parent.display()))?;
    }

    let existing = read_rows(path)?;
    let tmp_path = path.with_extension("csv.tmp");

    {
        let mut writer = csv::Writer::from_path(&tmp_path)
            .with_context(|| format!("Unable to create {}", tmp_path.display()))?;
        writer.write_record(header)?;
        for row in &existing {
            writer.write_record(row)?;
        }
        for row in rows {
            writer.write_record(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("Unable to write {}", tmp_path.display()))?;
    }

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Unable to replace {}", path.display()))?;
    Ok(existing.len() + rows.len())
}

fn read_rows(path: &Path) -> Result<Vec<StringRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Unable to open {}", path.display()))?;
    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Unable to read {}", path.display()))
}
