//! Bounded retry with a fixed backoff, shared by the portal clients.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("{label}: falhou após {attempts} tentativas ({last_error})")]
pub struct RetryError {
    pub label: String,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Upper bound of random extra delay added to each wait.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(30),
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            jitter: Duration::ZERO,
        }
    }

    /// Retries back to back, for loops where the remote side is the bottleneck.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn wait_time(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(extra_ms)
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("✅ {} succeeded on attempt {}/{}", label, attempt, self.max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt == self.max_attempts {
                        break;
                    }
                    let wait = self.wait_time();
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}...",
                        label, attempt, self.max_attempts, last_error, wait
                    );
                    if !wait.is_zero() {
                        sleep(wait).await;
                    }
                }
            }
        }

        tracing::error!(
            "{} failed after {} attempts: {}",
            label,
            self.max_attempts,
            last_error
        );
        Err(RetryError {
            label: label.to_string(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}
