use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of digits in a CNJ case number once normalized.
pub const CASE_NUMBER_DIGITS: usize = 20;

/// A CNJ case number normalized to 20 digits.
///
/// Normalization strips every non-digit character and left-pads with zeros.
/// Inputs with more than 20 digits are kept as-is so they never collide with a
/// real case number; they simply fail to route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseNumber(String);

impl CaseNumber {
    pub fn normalize(raw: &str) -> Self {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        Self(format!("{:0>width$}", digits, width = CASE_NUMBER_DIGITS))
    }

    /// The raw digits, without separators.
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// Whether the number has exactly the 20 digits a CNJ number carries.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == CASE_NUMBER_DIGITS
    }

    /// Court segment digits (positions 14-16, 1-indexed).
    pub fn court_code(&self) -> Option<&str> {
        if self.is_well_formed() {
            Some(&self.0[13..16])
        } else {
            None
        }
    }

    /// Display form `NNNNNNN-NN.NNNN.N.NN.NNNN`, the join key of every output row.
    pub fn formatted(&self) -> String {
        if !self.is_well_formed() {
            return self.0.clone();
        }
        let d = &self.0;
        format!(
            "{}-{}.{}.{}.{}.{}",
            &d[0..7],
            &d[7..9],
            &d[9..13],
            &d[13..14],
            &d[14..16],
            &d[16..20]
        )
    }
}

impl fmt::Display for CaseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators() {
        let number = CaseNumber::normalize("0001234-56.2024.8.16.0001");
        assert_eq!(number.digits(), "00012345620248160001");
        assert!(number.is_well_formed());
    }

    #[test]
    fn test_normalize_pads_short_numbers() {
        let number = CaseNumber::normalize("12345");
        assert_eq!(number.digits(), "00000000000000012345");
    }

    #[test]
    fn test_normalize_keeps_oversized_input() {
        let number = CaseNumber::normalize("123456789012345678901");
        assert_eq!(number.digits().len(), 21);
        assert!(!number.is_well_formed());
        assert_eq!(number.court_code(), None);
    }

    #[test]
    fn test_court_code() {
        let number = CaseNumber::normalize("82100016820258210001");
        assert_eq!(number.court_code(), Some("821"));
    }

    #[test]
    fn test_formatted() {
        let number = CaseNumber::normalize("00012345620248160001");
        assert_eq!(number.formatted(), "0001234-56.2024.8.16.0001");
        assert_eq!(number.to_string(), "0001234-56.2024.8.16.0001");
    }

    #[test]
    fn test_formatting_round_trip() {
        let inputs = [
            "00000000000000000000",
            "82100016820258210001",
            "50012345620238240023",
            "99999999999999999999",
        ];

        for input in inputs {
            let formatted = CaseNumber::normalize(input).formatted();
            let digits: String = formatted.chars().filter(|c| c.is_ascii_digit()).collect();
            assert_eq!(digits, input, "round trip failed for {}", input);
        }
    }
}
