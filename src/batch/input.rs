use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::StringRecord;
use tracing::info;

/// One row of the input sheet: the case number as typed and its pass-through tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInput {
    pub raw: String,
    pub tag: String,
}

impl CaseInput {
    pub fn new(raw: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            tag: tag.into(),
        }
    }
}

/// Position of `name` in the header row, ignoring case and surrounding spaces.
pub fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
}

/// Loads the case list from a CSV file with a header row.
pub fn load_cases(path: &Path, case_column: &str, tag_column: &str) -> Result<Vec<CaseInput>> {
    if !path.exists() {
        bail!("Arquivo de entrada não encontrado: {}", path.display());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Unable to open {}", path.display()))?;

    // Excel exports in pt-BR are often Windows-1252; decode lossily instead of failing
    let headers = StringRecord::from_byte_record_lossy(
        reader
            .byte_headers()
            .with_context(|| format!("Unable to read header of {}", path.display()))?
            .clone(),
    );
    let Some(case_idx) = column_index(&headers, case_column) else {
        bail!("Coluna '{}' não encontrada em {}", case_column, path.display());
    };
    let Some(tag_idx) = column_index(&headers, tag_column) else {
        bail!("Coluna '{}' não encontrada em {}", tag_column, path.display());
    };

    let mut cases = Vec::new();
    for (line, row) in reader.byte_records().enumerate() {
        let row = row.with_context(|| format!("Invalid row {} in {}", line + 2, path.display()))?;
        let row = StringRecord::from_byte_record_lossy(row);
        let raw = row.get(case_idx).unwrap_or_default();
        if raw.is_empty() {
            continue;
        }
        cases.push(CaseInput::new(raw, row.get(tag_idx).unwrap_or_default()));
    }

    info!("📄 {} processos carregados de {}", cases.len(), path.display());
    Ok(cases)
}

/// Builds the case list from a comma-separated list of numbers (no tags).
pub fn cases_from_list(list: &str) -> Vec<CaseInput> {
    list.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| CaseInput::new(n, ""))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_cases_matches_columns_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entrada.csv");
        fs::write(
            &path,
            "id, Processo ,bradesco\n1,0001234-56.2023.8.16.0001,A1\n2,,A2\n3, 00000020020248210001 ,\n",
        )
        .unwrap();

        let cases = load_cases(&path, "PROCESSO", "BRADESCO").unwrap();
        assert_eq!(
            cases,
            vec![
                CaseInput::new("0001234-56.2023.8.16.0001", "A1"),
                CaseInput::new("00000020020248210001", ""),
            ]
        );
    }

    #[test]
    fn test_non_utf8_sheet_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entrada.csv");
        fs::write(
            &path,
            b"PROCESSO,BRADESCO\n0001234-56.2023.8.16.0001,Jo\xe3o\n00000020020248210001,B\n",
        )
        .unwrap();

        let cases = load_cases(&path, "PROCESSO", "BRADESCO").unwrap();
        assert_eq!(
            cases,
            vec![
                CaseInput::new("0001234-56.2023.8.16.0001", "Jo\u{FFFD}o"),
                CaseInput::new("00000020020248210001", "B"),
            ]
        );
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entrada.csv");
        fs::write(&path, "numero,BRADESCO\n1,A\n").unwrap();

        let err = load_cases(&path, "PROCESSO", "BRADESCO").unwrap_err();
        assert!(err.to_string().contains("PROCESSO"));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = load_cases(Path::new("/nao/existe.csv"), "PROCESSO", "BRADESCO").unwrap_err();
        assert!(err.to_string().contains("não encontrado"));
    }

    #[test]
    fn test_cases_from_list() {
        assert_eq!(
            cases_from_list(" 1, ,00000020020248210001,"),
            vec![CaseInput::new("1", ""), CaseInput::new("00000020020248210001", "")]
        );
    }
}
