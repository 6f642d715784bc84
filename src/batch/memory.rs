use std::fs;

use tracing::{debug, warn};

/// Resident memory of this process against the machine total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl MemorySample {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

pub trait MemorySampler: Send + Sync {
    /// `None` when the platform offers no reading.
    fn sample(&self) -> Option<MemorySample>;
}

/// Reads `VmRSS` from `/proc/self/status` and `MemTotal` from `/proc/meminfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcSampler;

impl MemorySampler for ProcSampler {
    fn sample(&self) -> Option<MemorySample> {
        let status = fs::read_to_string("/proc/self/status").ok()?;
        let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
        Some(MemorySample {
            used_bytes: kb_field(&status, "VmRSS:")? * 1024,
            total_bytes: kb_field(&meminfo, "MemTotal:")? * 1024,
        })
    }
}

/// Value of a `Key:   1234 kB` line.
fn kb_field(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

/// Samples memory use and triggers reclamation above a threshold.
pub struct MemoryGuard {
    threshold_percent: f64,
    sampler: Box<dyn MemorySampler>,
}

impl MemoryGuard {
    pub fn new(threshold_percent: f64) -> Self {
        Self::with_sampler(threshold_percent, ProcSampler)
    }

    pub fn with_sampler(threshold_percent: f64, sampler: impl MemorySampler + 'static) -> Self {
        Self {
            threshold_percent,
            sampler: Box::new(sampler),
        }
    }

    /// Samples once; runs `reclaim` when usage is above the threshold.
    /// Returns the measured percentage, if any.
    pub fn check<F: FnOnce()>(&self, reclaim: F) -> Option<f64> {
        let Some(sample) = self.sampler.sample() else {
            debug!("Leitura de memória indisponível nesta plataforma");
            return None;
        };

        let percent = sample.percent();
        debug!("Uso de memória: {:.1}%", percent);
        if percent > self.threshold_percent {
            warn!(
                "⚠️ Uso de memória alto ({:.1}% > {:.1}%). Liberando buffers...",
                percent, self.threshold_percent
            );
            reclaim();
        }
        Some(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fixed(Option<MemorySample>);

    impl MemorySampler for Fixed {
        fn sample(&self) -> Option<MemorySample> {
            self.0
        }
    }

    fn sample(used: u64, total: u64) -> Option<MemorySample> {
        Some(MemorySample {
            used_bytes: used,
            total_bytes: total,
        })
    }

    #[test]
    fn test_reclaims_above_threshold() {
        let guard = MemoryGuard::with_sampler(80.0, Fixed(sample(85, 100)));
        let reclaimed = Cell::new(false);
        assert_eq!(guard.check(|| reclaimed.set(true)), Some(85.0));
        assert!(reclaimed.get());
    }

    #[test]
    fn test_no_reclaim_at_or_below_threshold() {
        let guard = MemoryGuard::with_sampler(80.0, Fixed(sample(80, 100)));
        let reclaimed = Cell::new(false);
        guard.check(|| reclaimed.set(true));
        assert!(!reclaimed.get());
    }

    #[test]
    fn test_missing_sample_is_skipped() {
        let guard = MemoryGuard::with_sampler(0.0, Fixed(None));
        let reclaimed = Cell::new(false);
        assert_eq!(guard.check(|| reclaimed.set(true)), None);
        assert!(!reclaimed.get());
    }

    #[test]
    fn test_kb_field() {
        let status = "Name:\tcargo\nVmPeak:\t  2048 kB\nVmRSS:\t  1536 kB\n";
        assert_eq!(kb_field(status, "VmRSS:"), Some(1536));
        assert_eq!(kb_field(status, "VmSwap:"), None);
    }

    #[test]
    fn test_zero_total() {
        assert_eq!(MemorySample { used_bytes: 10, total_bytes: 0 }.percent(), 0.0);
    }
}
