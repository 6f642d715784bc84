//! Post-run reconciliation of the input sheet against the output files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::StringRecord;
use tracing::info;

use crate::batch::input::column_index;
use crate::processo::CaseNumber;

/// How the input cases split across the output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingReport {
    pub total: usize,
    pub with_movements: usize,
    /// Cases only present in an errors file.
    pub with_errors: usize,
    pub pending: usize,
}

pub struct PendingAudit<'a> {
    pub input: &'a Path,
    pub case_column: &'a str,
    pub movements: &'a [PathBuf],
    pub errors: &'a [PathBuf],
    pub output: &'a Path,
}

impl PendingAudit<'_> {
    /// Writes the input rows whose case number appears in no output file.
    pub fn run(&self) -> Result<PendingReport> {
        let mut seen_movements = HashSet::new();
        for path in self.movements {
            seen_movements.extend(case_set(path, "processo")?);
        }
        let mut seen_errors = HashSet::new();
        for path in self.errors {
            seen_errors.extend(case_set(path, "Processo")?);
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(self.input)
            .with_context(|| format!("Unable to open {}", self.input.display()))?;
        let raw_headers = reader.byte_headers()?.clone();
        let headers = StringRecord::from_byte_record_lossy(raw_headers.clone());
        let Some(case_idx) = column_index(&headers, self.case_column) else {
            bail!("Coluna '{}' não encontrada em {}", self.case_column, self.input.display());
        };

        let mut writer = csv::Writer::from_path(self.output)
            .with_context(|| format!("Unable to create {}", self.output.display()))?;
        writer.write_byte_record(&raw_headers)?;

        let mut report = PendingReport::default();
        for row in reader.byte_records() {
            let row = row?;
            let raw = String::from_utf8_lossy(row.get(case_idx).unwrap_or_default());
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            report.total += 1;

            let digits = CaseNumber::normalize(raw).digits().to_string();
            if seen_movements.contains(&digits) {
                report.with_movements += 1;
            } else if seen_errors.contains(&digits) {
                report.with_errors += 1;
            } else {
                report.pending += 1;
                // original bytes, so the sheet keeps its encoding
                writer.write_byte_record(&row)?;
            }
        }
        writer.flush()?;

        info!(
            "🔎 {} processos: {} com movimentações, {} com erro, {} pendentes → {}",
            report.total,
            report.with_movements,
            report.with_errors,
            report.pending,
            self.output.display()
        );
        Ok(report)
    }
}

/// Normalized digits of every case number in `column` of an output file.
fn case_set(path: &Path, column: &str) -> Result<HashSet<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Unable to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let Some(idx) = column_index(&headers, column) else {
        bail!("Coluna '{}' não encontrada em {}", column, path.display());
    };

    let mut cases = HashSet::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("Unable to read {}", path.display()))?;
        if let Some(value) = row.get(idx).map(str::trim).filter(|v| !v.is_empty()) {
            cases.insert(CaseNumber::normalize(value).digits().to_string());
        }
    }
    Ok(cases)
}
