use crate::error::BatchError;
use crate::source::BarSource;
use crate::summary::{InstrumentStatus, SummaryRow, sort_rows};
use analytics::{AnalyticsEngine, PerformanceReport};
use backtester::{Backtester, RunResult};
use chrono::{DateTime, Utc};
use configuration::Config;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strategies::create_strategy;
use uuid::Uuid;

/// A cooperative stop flag shared between the caller and a running batch.
///
/// Cancelling does not interrupt instruments already running; it only keeps
/// new ones from starting.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one instrument.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentOutcome {
    pub instrument: String,
    pub status: InstrumentStatus,
    pub error: Option<String>,
    pub report: Option<PerformanceReport>,
    pub run: Option<RunResult>,
}

impl InstrumentOutcome {
    fn skipped(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            status: InstrumentStatus::Skipped,
            error: Some("batch cancelled before start".to_string()),
            report: None,
            run: None,
        }
    }
}

/// The aggregated output of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted summary rows.
    pub rows: Vec<SummaryRow>,
    /// Per-instrument detail, in instrument order.
    pub outcomes: Vec<InstrumentOutcome>,
}

impl BatchReport {
    pub fn count(&self, status: InstrumentStatus) -> usize {
        self.rows.iter().filter(|row| row.status == status).count()
    }
}

/// Runs one independent engine per instrument on a worker pool.
pub struct BatchRunner {
    batch_id: Uuid,
    config: Config,
    source: Box<dyn BarSource>,
    analytics_engine: AnalyticsEngine,
    progress: ProgressBar,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(config: Config, source: Box<dyn BarSource>) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self {
            batch_id: Uuid::new_v4(),
            config,
            source,
            analytics_engine: AnalyticsEngine::new(),
            progress: ProgressBar::hidden(),
            cancel: CancellationToken::new(),
        })
    }

    /// Reports completed instruments on `progress`. Hidden by default.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// A handle that stops the batch from starting further instruments.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uses a token created elsewhere, so the batch can be stopped by whoever holds it.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs every configured instrument. Per-instrument failures become failed
    /// rows; only setup problems (no instruments, no worker pool) are errors.
    pub fn run(&self) -> Result<BatchReport, BatchError> {
        let instruments = &self.config.batch.instruments;
        if instruments.is_empty() {
            return Err(BatchError::NoInstruments);
        }

        let workers = self.config.batch.workers.unwrap_or_else(num_cpus::get).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| BatchError::ThreadPool(e.to_string()))?;

        let started_at = Utc::now();
        tracing::info!(
            batch_id = %self.batch_id,
            instruments = instruments.len(),
            workers,
            strategy = ?self.config.strategy.id,
            "starting batch"
        );
        self.progress.set_length(instruments.len() as u64);

        let outcomes: Vec<InstrumentOutcome> = pool.install(|| {
            instruments
                .par_iter()
                .map(|instrument| {
                    let outcome = if self.cancel.is_cancelled() {
                        tracing::info!(instrument = %instrument, "batch cancelled; skipping");
                        InstrumentOutcome::skipped(instrument)
                    } else {
                        self.run_instrument(instrument)
                    };
                    self.progress.inc(1);
                    outcome
                })
                .collect()
        });
        self.progress.finish_and_clear();

        let mut rows: Vec<SummaryRow> = outcomes.iter().map(SummaryRow::from_outcome).collect();
        sort_rows(&mut rows, self.config.batch.sort_by, self.config.batch.descending);

        let report = BatchReport {
            batch_id: self.batch_id,
            started_at,
            finished_at: Utc::now(),
            rows,
            outcomes,
        };
        tracing::info!(
            batch_id = %self.batch_id,
            ok = report.count(InstrumentStatus::Ok),
            failed = report.count(InstrumentStatus::Failed),
            skipped = report.count(InstrumentStatus::Skipped),
            "batch finished"
        );
        Ok(report)
    }

    /// Runs a single instrument, converting any error, or a panic, into a
    /// failed outcome.
    pub fn run_instrument(&self, instrument: &str) -> InstrumentOutcome {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.try_run(instrument))).unwrap_or_else(|payload| {
            Err(BatchError::Panicked {
                instrument: instrument.to_string(),
                message: panic_message(payload.as_ref()),
            })
        });

        match attempt {
            Ok((run, report)) => InstrumentOutcome {
                instrument: instrument.to_string(),
                status: InstrumentStatus::Ok,
                error: None,
                report: Some(report),
                run: Some(run),
            },
            Err(e) => {
                tracing::error!(instrument, error = %e, "instrument failed");
                InstrumentOutcome {
                    instrument: instrument.to_string(),
                    status: InstrumentStatus::Failed,
                    error: Some(e.to_string()),
                    report: None,
                    run: None,
                }
            }
        }
    }

    fn try_run(&self, instrument: &str) -> Result<(RunResult, PerformanceReport), BatchError> {
        let batch = &self.config.batch;
        let bars = self.source.load(instrument, batch.start_date, batch.end_date)?;

        // Every instrument gets a fresh strategy and its own capital.
        let strategy = create_strategy(&self.config.strategy)?;
        let backtester = Backtester::new(
            instrument,
            self.config.engine.clone(),
            self.config.sizing.clone(),
            strategy,
        )?;
        let run = backtester.run(&bars)?;

        let report = self
            .analytics_engine
            .calculate(&run.equity_curve, run.ledger.as_slice(), batch.risk_free_rate)?;
        Ok((run, report))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
