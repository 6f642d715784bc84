use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

use crate::models::MovementRecord;
use crate::portal::{AdapterError, PortalAdapter};
use crate::processo::CaseNumber;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Tempo limite de {0:?} excedido")]
    DeadlineExceeded(Duration),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// The isolated task panicked or was cancelled.
    #[error("Execução interrompida: {0}")]
    Aborted(String),
}

type AdapterResult = Result<Vec<MovementRecord>, AdapterError>;

/// Aborts the task when the caller stops waiting for it, including when the
/// caller's own future is dropped.
struct AbortOnDrop(JoinHandle<AdapterResult>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs one adapter call in its own task under a deadline.
///
/// When the deadline fires the task is aborted, which drops the adapter's
/// in-flight future at its next await point. Adapters that hold session state
/// across awaits must tolerate being dropped there.
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    deadline: Duration,
}

impl BoundedExecutor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn run_with_deadline(
        &self,
        adapter: Arc<dyn PortalAdapter>,
        processo: CaseNumber,
    ) -> Result<Vec<MovementRecord>, ExecutionError> {
        let mut task = AbortOnDrop(tokio::spawn(async move { adapter.execute(&processo).await }));

        match timeout(self.deadline, &mut task.0).await {
            Ok(Ok(result)) => result.map_err(ExecutionError::Adapter),
            Ok(Err(join_error)) => {
                let reason = if join_error.is_panic() {
                    format!("pânico no cliente do portal: {}", panic_message(join_error.into_panic()))
                } else {
                    "tarefa cancelada".to_string()
                };
                Err(ExecutionError::Aborted(reason))
            }
            Err(_) => {
                warn!("⏱️ Tempo limite de {:?} atingido, abortando tarefa", self.deadline);
                Err(ExecutionError::DeadlineExceeded(self.deadline))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "motivo desconhecido".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Scripted {
        delay: Duration,
        outcome: fn(&CaseNumber) -> Result<Vec<MovementRecord>, AdapterError>,
        finished: Arc<AtomicBool>,
    }

    impl PortalAdapter for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn execute<'a>(
            &'a self,
            processo: &'a CaseNumber,
        ) -> BoxFuture<'a, Result<Vec<MovementRecord>, AdapterError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.finished.store(true, Ordering::SeqCst);
                (self.outcome)(processo)
            })
        }
    }

    fn adapter(
        delay: Duration,
        outcome: fn(&CaseNumber) -> Result<Vec<MovementRecord>, AdapterError>,
    ) -> (Arc<dyn PortalAdapter>, Arc<AtomicBool>) {
        let finished = Arc::new(AtomicBool::new(false));
        let adapter = Scripted {
            delay,
            outcome,
            finished: finished.clone(),
        };
        (Arc::new(adapter), finished)
    }

    fn processo() -> CaseNumber {
        CaseNumber::normalize("00012345620238210001")
    }

    #[tokio::test]
    async fn test_returns_adapter_records() {
        let (adapter, _) = adapter(Duration::ZERO, |p| Ok(vec![MovementRecord::placeholder(p)]));
        let executor = BoundedExecutor::new(Duration::from_secs(5));

        let records = executor.run_with_deadline(adapter, processo()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_placeholder());
    }

    #[tokio::test]
    async fn test_adapter_error_is_wrapped() {
        let (adapter, _) = adapter(Duration::ZERO, |_| {
            Err(AdapterError::Login("senha expirada".to_string()))
        });
        let executor = BoundedExecutor::new(Duration::from_secs(5));

        let err = executor.run_with_deadline(adapter, processo()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Adapter(AdapterError::Login(_))));
    }

    #[tokio::test]
    async fn test_deadline_aborts_task() {
        let (adapter, finished) = adapter(Duration::from_millis(300), |_| Ok(Vec::new()));
        let executor = BoundedExecutor::new(Duration::from_millis(30));

        let err = executor.run_with_deadline(adapter, processo()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::DeadlineExceeded(d) if d == Duration::from_millis(30)));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let (adapter, _) = adapter(Duration::ZERO, |_| panic!("tabela corrompida"));
        let executor = BoundedExecutor::new(Duration::from_secs(5));

        let err = executor.run_with_deadline(adapter, processo()).await.unwrap_err();
        match err {
            ExecutionError::Aborted(reason) => assert!(reason.contains("tabela corrompida")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
