use std::fmt;
use std::time::Duration;

const BOX_WIDTH: usize = 58;

/// End-of-run summary printed after the final files are written.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub total_cases: usize,
    pub with_movements: usize,
    pub errors: usize,
    pub unsupported: usize,
    pub timeouts: usize,
    pub elapsed: Duration,
    pub cases_per_minute: f64,
    pub success_rate: f64,
}

impl PerformanceReport {
    pub fn new(
        total_cases: usize,
        with_movements: usize,
        errors: usize,
        unsupported: usize,
        timeouts: usize,
        elapsed: Duration,
    ) -> Self {
        let minutes = elapsed.as_secs_f64() / 60.0;
        let cases_per_minute = if minutes > 0.0 {
            total_cases as f64 / minutes
        } else {
            0.0
        };

        // Unsupported cases never reach a portal, so they don't count against it.
        let attempted = total_cases.saturating_sub(unsupported);
        let success_rate = if attempted > 0 {
            (with_movements as f64 / attempted as f64) * 100.0
        } else {
            0.0
        };

        Self {
            total_cases,
            with_movements,
            errors,
            unsupported,
            timeouts,
            elapsed,
            cases_per_minute,
            success_rate,
        }
    }

    pub fn status(&self) -> &'static str {
        match self.success_rate {
            r if r >= 90.0 => "🟢 EXCELENTE",
            r if r >= 75.0 => "🟡 BOM",
            r if r >= 50.0 => "🟠 MODERADO",
            _ => "🔴 PRECISA DE ATENÇÃO",
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Processos", self.total_cases.to_string()),
            ("Com movimentações", self.with_movements.to_string()),
            ("Com erro", self.errors.to_string()),
            ("  Não suportados", self.unsupported.to_string()),
            ("  Timeouts", self.timeouts.to_string()),
            ("Tempo total", clock(self.elapsed)),
            ("Vazão", format!("{:.2} processos/min", self.cases_per_minute)),
            ("Taxa de sucesso", format!("{:.1}%", self.success_rate)),
            ("Status", self.status().to_string()),
        ]
    }

    pub fn display(&self) {
        println!("\n{}", self);
    }
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "═".repeat(BOX_WIDTH);
        writeln!(f, "╔{}╗", rule)?;
        writeln!(f, "║{:^width$}║", "RELATÓRIO DE EXECUÇÃO", width = BOX_WIDTH)?;
        writeln!(f, "╠{}╣", rule)?;
        for (label, value) in self.rows() {
            let label = format!("  {}:", label);
            let used = label.chars().count() + value.chars().count() + 2;
            let gap = BOX_WIDTH.saturating_sub(used);
            writeln!(f, "║{}{}{}  ║", label, " ".repeat(gap), value)?;
        }
        write!(f, "╚{}╝", rule)
    }
}

/// `HH:MM:SS`, with hours growing past two digits on very long runs.
fn clock(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let report = PerformanceReport::new(12, 8, 4, 2, 1, Duration::from_secs(120));
        assert_eq!(report.cases_per_minute, 6.0);
        assert_eq!(report.success_rate, 80.0);
        assert_eq!(report.status(), "🟡 BOM");
    }

    #[test]
    fn test_empty_run() {
        let report = PerformanceReport::new(0, 0, 0, 0, 0, Duration::ZERO);
        assert_eq!(report.cases_per_minute, 0.0);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.status(), "🔴 PRECISA DE ATENÇÃO");
    }

    #[test]
    fn test_clock() {
        assert_eq!(clock(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(clock(Duration::from_millis(9_900)), "00:00:09");
        assert_eq!(clock(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn test_rendered_box_lists_every_row() {
        let report = PerformanceReport::new(10, 9, 1, 0, 1, Duration::from_secs(65));
        let rendered = report.to_string();

        assert!(rendered.starts_with('╔'));
        assert!(rendered.ends_with('╝'));
        assert!(rendered.contains("Tempo total:"));
        assert!(rendered.contains("00:01:05"));
        assert!(rendered.contains("90.0%"));
        assert!(rendered.contains("🟢 EXCELENTE"));
        assert_eq!(rendered.lines().count(), 4 + report.rows().len());
    }
}
