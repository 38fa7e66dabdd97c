use crate::error::BatchError;
use crate::runner::{BatchReport, InstrumentOutcome};
use configuration::SortKey;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentStatus {
    Ok,
    Failed,
    /// Not started before the batch was cancelled.
    Skipped,
}

impl InstrumentStatus {
    fn rank(self) -> u8 {
        match self {
            InstrumentStatus::Ok => 0,
            InstrumentStatus::Failed => 1,
            InstrumentStatus::Skipped => 2,
        }
    }
}

impl std::fmt::Display for InstrumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            InstrumentStatus::Ok => "ok",
            InstrumentStatus::Failed => "failed",
            InstrumentStatus::Skipped => "skipped",
        };
        f.write_str(text)
    }
}

/// One line of the batch summary. Metrics are empty for failed or skipped
/// instruments and for metrics that are undefined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub instrument: String,
    pub status: InstrumentStatus,
    pub total_return: Option<Decimal>,
    pub annualized_return: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>,
    pub max_drawdown: Option<Decimal>,
    pub win_rate: Option<Decimal>,
    pub profit_factor: Option<Decimal>,
    pub trade_count: Option<usize>,
    pub round_trips: Option<usize>,
    pub final_equity: Option<Decimal>,
    pub unexecuted_signals: Option<u32>,
    pub strategy_faults: Option<usize>,
    pub skipped_bars: Option<usize>,
    pub error: Option<String>,
}

impl SummaryRow {
    pub fn from_outcome(outcome: &InstrumentOutcome) -> Self {
        let report = outcome.report.as_ref();
        let run = outcome.run.as_ref();
        Self {
            instrument: outcome.instrument.clone(),
            status: outcome.status,
            total_return: report.map(|r| r.total_return),
            annualized_return: report.and_then(|r| r.annualized_return),
            sharpe_ratio: report.and_then(|r| r.sharpe_ratio),
            max_drawdown: report.map(|r| r.max_drawdown),
            win_rate: report.and_then(|r| r.win_rate),
            profit_factor: report.and_then(|r| r.profit_factor),
            trade_count: run.map(|r| r.ledger.len()),
            round_trips: report.map(|r| r.round_trip_count),
            final_equity: run.map(|r| r.final_equity()),
            unexecuted_signals: run.map(|r| r.unexecuted_signals),
            strategy_faults: run.map(|r| r.strategy_faults.len()),
            skipped_bars: run.map(|r| r.skipped_bars.len()),
            error: outcome.error.clone(),
        }
    }

    fn key(&self, key: SortKey) -> Option<Decimal> {
        match key {
            SortKey::Instrument => None,
            SortKey::TotalReturn => self.total_return,
            SortKey::AnnualizedReturn => self.annualized_return,
            SortKey::SharpeRatio => self.sharpe_ratio,
            SortKey::MaxDrawdown => self.max_drawdown,
            SortKey::WinRate => self.win_rate,
            SortKey::TradeCount => self.trade_count.map(Decimal::from),
        }
    }
}

/// Orders rows deterministically: successful rows first, by `key` (rows
/// without a value last), then by instrument code; failed and skipped rows
/// follow, by instrument code.
pub fn sort_rows(rows: &mut [SummaryRow], key: SortKey, descending: bool) {
    rows.sort_by(|a, b| {
        a.status
            .rank()
            .cmp(&b.status.rank())
            .then_with(|| compare_key(a, b, key, descending))
            .then_with(|| a.instrument.cmp(&b.instrument))
    });
}

fn compare_key(a: &SummaryRow, b: &SummaryRow, key: SortKey, descending: bool) -> Ordering {
    if key == SortKey::Instrument {
        let ordering = a.instrument.cmp(&b.instrument);
        return if descending { ordering.reverse() } else { ordering };
    }
    match (a.key(key), b.key(key)) {
        (Some(x), Some(y)) if descending => y.cmp(&x),
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Writes the summary as comma-separated text with a header row.
pub fn write_summary_csv(rows: &[SummaryRow], path: &Path) -> Result<(), BatchError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), rows = rows.len(), "summary written");
    Ok(())
}

/// Writes the whole batch report, including every run's ledger and metrics, as JSON.
pub fn write_report_json(report: &BatchReport, path: &Path) -> Result<(), BatchError> {
    let file = File::create(path).map_err(|source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
