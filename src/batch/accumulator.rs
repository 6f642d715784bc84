use crate::models::{ErrorRecord, MovementRecord};
use crate::processo::CaseNumber;

/// In-memory buffers of results not yet written to a checkpoint.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    records: Vec<MovementRecord>,
    failures: Vec<ErrorRecord>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a case's movements, stamping each with the case and tag it was dispatched for.
    pub fn add_movements(&mut self, processo: &CaseNumber, tag: &str, records: Vec<MovementRecord>) -> usize {
        let formatted = processo.formatted();
        let count = records.len();
        self.records.extend(records.into_iter().map(|mut record| {
            record.processo = formatted.clone();
            record.tag = tag.to_string();
            record
        }));
        count
    }

    pub fn add_failure(&mut self, processo: &CaseNumber, motivo: impl Into<String>) {
        self.failures.push(ErrorRecord::new(processo, motivo));
    }

    pub fn records(&self) -> &[MovementRecord] {
        &self.records
    }

    pub fn failures(&self) -> &[ErrorRecord] {
        &self.failures
    }

    pub fn clear_records(&mut self) {
        self.records.clear();
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.failures.is_empty()
    }

    /// Releases spare buffer capacity back to the allocator.
    pub fn shrink(&mut self) {
        self.records.shrink_to_fit();
        self.failures.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movements_are_stamped() {
        let processo = CaseNumber::normalize("1234-56.2023.8.24.0001");
        let foreign = MovementRecord {
            processo: "outro".to_string(),
            tag: "x".to_string(),
            evento: "3".to_string(),
            ..MovementRecord::default()
        };

        let mut acc = ResultAccumulator::new();
        assert_eq!(acc.add_movements(&processo, "B-77", vec![foreign]), 1);

        let stored = &acc.records()[0];
        assert_eq!(stored.processo, "0001234-56.2023.8.24.0001");
        assert_eq!(stored.tag, "B-77");
        assert_eq!(stored.evento, "3");
    }

    #[test]
    fn test_clear_is_per_buffer() {
        let processo = CaseNumber::normalize("1");
        let mut acc = ResultAccumulator::new();
        acc.add_movements(&processo, "", vec![MovementRecord::placeholder(&processo)]);
        acc.add_failure(&processo, "Timeout");

        acc.clear_records();
        assert!(acc.records().is_empty());
        assert_eq!(acc.failures().len(), 1);
        assert!(!acc.is_empty());

        acc.clear_failures();
        acc.shrink();
        assert!(acc.is_empty());
    }
}
