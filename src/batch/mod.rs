//! Sequential batch over the input cases: routing, bounded execution,
//! periodic checkpoints and memory checks, and the final promotion of the
//! partial files.

pub mod accumulator;
pub mod checkpoint;
pub mod executor;
pub mod input;
pub mod memory;
pub mod report;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::BatchSettings;
use crate::models::{REASON_EMPTY, REASON_TIMEOUT, REASON_UNSUPPORTED};
use crate::portal::PortalAdapter;
use crate::processo::CaseNumber;
use crate::router::{classify_number, Route, Tribunal};

use accumulator::ResultAccumulator;
use checkpoint::CheckpointStore;
use executor::{BoundedExecutor, ExecutionError};
use input::CaseInput;
use memory::MemoryGuard;
use report::PerformanceReport;

pub const REASON_NO_CLIENT: &str = "Cliente do tribunal não configurado";

/// How a single case ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    /// Records were accumulated (the placeholder row counts as one).
    Movements(usize),
    Unsupported,
    /// The adapter returned nothing or the portal does not know the case.
    Empty,
    TimedOut,
    Failed(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeCounters {
    pub with_movements: usize,
    pub unsupported: usize,
    pub empty: usize,
    pub timeouts: usize,
    pub failed: usize,
}

impl OutcomeCounters {
    fn record(&mut self, outcome: &CaseOutcome) {
        match outcome {
            CaseOutcome::Movements(_) => self.with_movements += 1,
            CaseOutcome::Unsupported => self.unsupported += 1,
            CaseOutcome::Empty => self.empty += 1,
            CaseOutcome::TimedOut => self.timeouts += 1,
            CaseOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn errors(&self) -> usize {
        self.unsupported + self.empty + self.timeouts + self.failed
    }
}

/// Working set of one run.
pub struct BatchState {
    pub run_id: Uuid,
    cases: Vec<CaseInput>,
    pub accumulator: ResultAccumulator,
    since_checkpoint: usize,
    processed: usize,
    memory_reclaims: usize,
    pub counters: OutcomeCounters,
}

impl BatchState {
    pub fn new(cases: Vec<CaseInput>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cases,
            accumulator: ResultAccumulator::new(),
            since_checkpoint: 0,
            processed: 0,
            memory_reclaims: 0,
            counters: OutcomeCounters::default(),
        }
    }

    pub fn total(&self) -> usize {
        self.cases.len()
    }
}

/// What a run left behind.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub processed: usize,
    pub counters: OutcomeCounters,
    /// Memory checks that went over the threshold and shrank the buffers.
    pub memory_reclaims: usize,
    pub interrupted: bool,
    pub final_files: Vec<PathBuf>,
    pub report: PerformanceReport,
}

pub struct BatchOrchestrator {
    adapters: HashMap<Tribunal, Arc<dyn PortalAdapter>>,
    executor: BoundedExecutor,
    checkpoints: CheckpointStore,
    memory: MemoryGuard,
    save_interval: usize,
    memory_check_interval: usize,
}

impl BatchOrchestrator {
    pub fn new(settings: &BatchSettings, started: DateTime<Local>) -> Self {
        Self {
            adapters: HashMap::new(),
            executor: BoundedExecutor::new(settings.request_timeout),
            checkpoints: CheckpointStore::new(&settings.output_dir, &settings.tag_column, started),
            memory: MemoryGuard::new(settings.memory_threshold_percent),
            save_interval: settings.save_interval.max(1),
            memory_check_interval: settings.memory_check_interval.max(1),
        }
    }

    pub fn with_adapter(mut self, tribunal: Tribunal, adapter: Arc<dyn PortalAdapter>) -> Self {
        self.adapters.insert(tribunal, adapter);
        self
    }

    pub fn with_memory_guard(mut self, memory: MemoryGuard) -> Self {
        self.memory = memory;
        self
    }

    /// Processes every case in order, then flushes and promotes the partial files.
    ///
    /// When `shutdown` resolves first the in-flight case is dropped and the
    /// run finalizes with what was accumulated so far.
    pub async fn run<S>(&self, cases: Vec<CaseInput>, shutdown: S) -> Result<BatchSummary>
    where
        S: Future<Output = ()>,
    {
        let mut state = BatchState::new(cases);
        let span = info_span!("batch", run_id = %state.run_id);

        async move {
            info!(
                "🚀 Iniciando processamento de {} processos (timeout {:?}, checkpoint a cada {})",
                state.total(),
                self.executor.deadline(),
                self.save_interval
            );
            let started = Instant::now();

            tokio::pin!(shutdown);
            let interrupted = tokio::select! {
                _ = self.dispatch_all(&mut state) => false,
                _ = &mut shutdown => {
                    warn!("🛑 Interrupção recebida. Salvando resultados acumulados...");
                    true
                }
            };

            self.finalize(state, started, interrupted)
        }
        .instrument(span)
        .await
    }

    async fn dispatch_all(&self, state: &mut BatchState) {
        let total = state.total();
        for idx in 0..total {
            let case = state.cases[idx].clone();
            let position = idx + 1;

            if position % self.memory_check_interval == 0 {
                let accumulator = &mut state.accumulator;
                let mut reclaimed = false;
                self.memory.check(|| {
                    accumulator.shrink();
                    reclaimed = true;
                });
                if reclaimed {
                    state.memory_reclaims += 1;
                }
            }

            let processo = CaseNumber::normalize(&case.raw);
            info!("Processando processo {}/{}: {}", position, total, processo);
            let outcome = self.process_case(&mut state.accumulator, &processo, &case.tag).await;
            state.counters.record(&outcome);
            state.processed += 1;
            state.since_checkpoint += 1;

            if state.since_checkpoint >= self.save_interval {
                self.checkpoints.flush(&mut state.accumulator);
                state.since_checkpoint = 0;
                info!("📊 Progresso: {}/{} processos processados", position, total);
            }
        }
    }

    /// Routes, executes and records one case. Never fails: every outcome lands
    /// in the accumulator as movements or as one error row.
    pub async fn process_case(
        &self,
        acc: &mut ResultAccumulator,
        processo: &CaseNumber,
        tag: &str,
    ) -> CaseOutcome {
        let tribunal = match classify_number(processo) {
            Route::Supported(tribunal) => tribunal,
            Route::Unsupported => {
                warn!("Processo {} não pertence a nenhum tribunal suportado", processo);
                acc.add_failure(processo, REASON_UNSUPPORTED);
                return CaseOutcome::Unsupported;
            }
        };
        let Some(adapter) = self.adapters.get(&tribunal) else {
            error!("Nenhum cliente configurado para {} ({})", tribunal, processo);
            acc.add_failure(processo, REASON_NO_CLIENT);
            return CaseOutcome::Failed(REASON_NO_CLIENT.to_string());
        };
        info!(
            "Processo {} identificado como {} (cliente {})",
            processo,
            tribunal,
            adapter.name()
        );

        let started = Instant::now();
        match self
            .executor
            .run_with_deadline(adapter.clone(), processo.clone())
            .await
        {
            Ok(records) if records.is_empty() => {
                warn!("Nenhuma movimentação encontrada para o processo {}", processo);
                acc.add_failure(processo, REASON_EMPTY);
                CaseOutcome::Empty
            }
            Ok(records) => {
                let count = acc.add_movements(processo, tag, records);
                info!(
                    "✅ Processo {} processado com sucesso em {:.2} segundos ({} movimentações)",
                    processo,
                    started.elapsed().as_secs_f64(),
                    count
                );
                CaseOutcome::Movements(count)
            }
            Err(ExecutionError::Adapter(e)) if e.is_not_found() => {
                warn!("{} no {}", e, tribunal);
                acc.add_failure(processo, REASON_EMPTY);
                CaseOutcome::Empty
            }
            Err(ExecutionError::DeadlineExceeded(_)) => {
                error!("⏱️ Timeout ao processar processo {}", processo);
                acc.add_failure(processo, REASON_TIMEOUT);
                CaseOutcome::TimedOut
            }
            Err(e) => {
                let reason = e.to_string();
                error!("❌ Erro ao processar processo {}: {}", processo, reason);
                acc.add_failure(processo, reason.clone());
                CaseOutcome::Failed(reason)
            }
        }
    }

    fn finalize(&self, mut state: BatchState, started: Instant, interrupted: bool) -> Result<BatchSummary> {
        let flush = self.checkpoints.flush(&mut state.accumulator);
        if flush.failed {
            error!(
                "❌ Falha no checkpoint final; {} movimentações e {} erros não foram gravados",
                state.accumulator.records().len(),
                state.accumulator.failures().len()
            );
        }

        let final_files = self.checkpoints.finalize(Local::now())?;
        let report = PerformanceReport::new(
            state.processed,
            state.counters.with_movements,
            state.counters.errors(),
            state.counters.unsupported,
            state.counters.timeouts,
            started.elapsed(),
        );

        info!(
            "Processamento {}. Total de processos processados: {}/{}",
            if interrupted { "interrompido" } else { "concluído" },
            state.processed,
            state.total()
        );

        Ok(BatchSummary {
            run_id: state.run_id,
            total: state.total(),
            processed: state.processed,
            counters: state.counters,
            memory_reclaims: state.memory_reclaims,
            interrupted,
            final_files,
            report,
        })
    }
}
