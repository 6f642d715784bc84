use serde::{Deserialize, Serialize};

use crate::processo::CaseNumber;

/// Text written in place of field data when a case has no movement rows.
pub const NO_MOVEMENT_SENTINEL: &str =
    "Nenhuma movimentação correspondeu aos parâmetros de busca.";

pub const REASON_UNSUPPORTED: &str = "Tribunal não suportado";
pub const REASON_EMPTY: &str = "Nenhuma movimentação encontrada";
pub const REASON_TIMEOUT: &str = "Timeout";

/// One row of a case's procedural history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovementRecord {
    /// Formatted case number (`NNNNNNN-NN.NNNN.N.NN.NNNN`)
    pub processo: String,
    /// Pass-through tag copied from the input spreadsheet
    pub tag: String,
    pub evento: String,
    /// Date as `dd-mm-yyyy`
    pub data: String,
    pub descricao: String,
    pub usuario: String,
    /// Actor role, upper-cased
    pub tipo: String,
    pub arquivos: Option<String>,
    pub tipo_arquivo: Option<String>,
}

impl MovementRecord {
    /// Sentinel row for a case the portal knows but that has no movements.
    pub fn placeholder(processo: &CaseNumber) -> Self {
        Self {
            processo: processo.formatted(),
            arquivos: Some(NO_MOVEMENT_SENTINEL.to_string()),
            ..Self::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.arquivos.as_deref() == Some(NO_MOVEMENT_SENTINEL) && self.evento.is_empty()
    }

    /// CSV header for the movements file; the tag column name is configurable.
    pub fn csv_header(tag_column: &str) -> Vec<String> {
        [
            "processo",
            tag_column,
            "evento",
            "data",
            "descricao",
            "usuario",
            "tipo",
            "arquivos",
            "tipo_arquivo",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn to_csv_row(&self) -> Vec<&str> {
        vec![
            &self.processo,
            &self.tag,
            &self.evento,
            &self.data,
            &self.descricao,
            &self.usuario,
            &self.tipo,
            self.arquivos.as_deref().unwrap_or(""),
            self.tipo_arquivo.as_deref().unwrap_or(""),
        ]
    }
}

/// A case that produced no movement rows, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "Processo")]
    pub processo: String,
    #[serde(rename = "Erro")]
    pub motivo: String,
}

impl ErrorRecord {
    pub fn new(processo: &CaseNumber, motivo: impl Into<String>) -> Self {
        Self {
            processo: processo.formatted(),
            motivo: motivo.into(),
        }
    }

    pub const CSV_HEADER: [&'static str; 2] = ["Processo", "Erro"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_carries_sentinel() {
        let number = CaseNumber::normalize("00012345620248160001");
        let record = MovementRecord::placeholder(&number);
        assert_eq!(record.processo, "0001234-56.2024.8.16.0001");
        assert_eq!(record.arquivos.as_deref(), Some(NO_MOVEMENT_SENTINEL));
        assert!(record.evento.is_empty());
        assert!(record.is_placeholder());
    }

    #[test]
    fn test_csv_row_matches_header_width() {
        let record = MovementRecord {
            processo: "0001234-56.2024.8.16.0001".to_string(),
            tag: "ABC".to_string(),
            evento: "12".to_string(),
            data: "01-02-2024".to_string(),
            descricao: "Juntada de petição".to_string(),
            usuario: "FULANO".to_string(),
            tipo: "ADVOGADO".to_string(),
            arquivos: None,
            tipo_arquivo: None,
        };

        let header = MovementRecord::csv_header("BRADESCO");
        let row = record.to_csv_row();
        assert_eq!(header.len(), row.len());
        assert_eq!(header[1], "BRADESCO");
        assert_eq!(row[1], "ABC");
        assert_eq!(row[7], "");
    }

    #[test]
    fn test_error_record_formats_number() {
        let number = CaseNumber::normalize("82100016820258210001");
        let error = ErrorRecord::new(&number, REASON_TIMEOUT);
        assert_eq!(error.processo, "8210001-68.2025.8.21.0001");
        assert_eq!(error.motivo, "Timeout");
    }
}
