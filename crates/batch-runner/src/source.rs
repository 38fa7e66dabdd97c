use crate::error::BatchError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use core_types::Bar;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Supplies the bar history of one instrument.
///
/// Implementations return bars sorted ascending by timestamp and restricted to
/// the inclusive `[start, end]` date range. An instrument with no bars in range
/// is a `DataUnavailable` error.
pub trait BarSource: Send + Sync {
    fn load(&self, instrument: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<Bar>, BatchError>;
}

fn in_range(bar: &Bar, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    let date = bar.timestamp.date_naive();
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

fn finish(instrument: &str, mut bars: Vec<Bar>) -> Result<Vec<Bar>, BatchError> {
    if bars.is_empty() {
        return Err(BatchError::DataUnavailable {
            instrument: instrument.to_string(),
            reason: "no bars in the requested date range".to_string(),
        });
    }
    bars.sort_by_key(|bar| bar.timestamp);
    Ok(bars)
}

/// Reads `<dir>/<instrument>.csv`.
///
/// The header must name a time column (`time`, `date`, `datetime` or
/// `trade_date`) plus `open`, `high`, `low` and `close`; `volume` is optional.
/// Dates may be `YYYY-MM-DD`, `YYYYMMDD` or `YYYY-MM-DD HH:MM:SS`. Rows that do
/// not parse are skipped with a warning.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    dir: PathBuf,
}

struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, String> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|name| h.trim().eq_ignore_ascii_case(name)))
        };
        let require = |names: &[&str]| find(names).ok_or_else(|| format!("missing '{}' column", names[0]));

        Ok(Self {
            time: require(&["time", "date", "datetime", "trade_date"])?,
            open: require(&["open"])?,
            high: require(&["high"])?,
            low: require(&["low"])?,
            close: require(&["close"])?,
            volume: find(&["volume", "vol"]),
        })
    }

    fn parse(&self, record: &csv::StringRecord) -> Result<Bar, String> {
        let field = |index: usize| record.get(index).map(str::trim).ok_or_else(|| format!("missing field {index}"));
        let decimal = |index: usize| {
            let raw = field(index)?;
            raw.parse::<Decimal>().map_err(|e| format!("bad number '{raw}': {e}"))
        };

        Ok(Bar {
            timestamp: parse_timestamp(field(self.time)?)?,
            open: decimal(self.open)?,
            high: decimal(self.high)?,
            low: decimal(self.low)?,
            close: decimal(self.close)?,
            volume: match self.volume {
                Some(index) => decimal(index)?,
                None => Decimal::ZERO,
            },
        })
    }
}

/// Accepts `YYYY-MM-DD`, `YYYYMMDD` and `YYYY-MM-DD HH:MM:SS`, all as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt.and_utc());
            }
        }
    }
    Err(format!("unrecognized date '{raw}'"))
}

impl CsvBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{instrument}.csv"))
    }
}

impl BarSource for CsvBarSource {
    fn load(&self, instrument: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<Bar>, BatchError> {
        let path = self.path_for(instrument);
        if !path.is_file() {
            return Err(BatchError::DataUnavailable {
                instrument: instrument.to_string(),
                reason: format!("file not found: {}", path.display()),
            });
        }

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(&path)?;
        let columns = Columns::from_headers(reader.headers()?).map_err(|reason| BatchError::DataUnavailable {
            instrument: instrument.to_string(),
            reason,
        })?;

        let mut bars = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let parsed = record.map_err(|e| e.to_string()).and_then(|r| columns.parse(&r));
            match parsed {
                Ok(bar) if in_range(&bar, start, end) => bars.push(bar),
                Ok(_) => {}
                Err(reason) => {
                    tracing::warn!(instrument, row = row + 1, %reason, "skipping unparsable row");
                }
            }
        }

        tracing::debug!(instrument, bars = bars.len(), path = %path.display(), "loaded bars");
        finish(instrument, bars)
    }
}

/// Bars held in memory, keyed by instrument.
#[derive(Debug, Clone, Default)]
pub struct MemoryBarSource {
    bars: HashMap<String, Vec<Bar>>,
}

impl MemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: impl Into<String>, bars: Vec<Bar>) {
        self.bars.insert(instrument.into(), bars);
    }
}

impl BarSource for MemoryBarSource {
    fn load(&self, instrument: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<Bar>, BatchError> {
        let bars = self
            .bars
            .get(instrument)
            .ok_or_else(|| BatchError::DataUnavailable {
                instrument: instrument.to_string(),
                reason: "unknown instrument".to_string(),
            })?
            .iter()
            .filter(|bar| in_range(bar, start, end))
            .cloned()
            .collect();
        finish(instrument, bars)
    }
}
