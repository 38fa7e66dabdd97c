use crate::error::ConfigError;
use chrono::NaiveDate;
use core_types::StrategyId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub sizing: SizingConfig,
    pub strategy: StrategyConfig,
    pub batch: BatchConfig,
}

impl Config {
    /// Parses a configuration from TOML text. Mostly useful in tests.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section for values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.sizing.validate()?;
        self.strategy.validate()?;
        self.batch.validate()?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn check_fraction(name: &str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO || value >= Decimal::ONE {
        return Err(invalid(format!("{name} must be within [0, 1), got {value}")));
    }
    Ok(())
}

/// Parameters of a single-instrument engine run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Starting cash for every instrument.
    pub initial_capital: Decimal,
    /// Commission charged on both sides, as a fraction of notional.
    /// 0.0003 corresponds to 0.03%.
    pub commission_rate: Decimal,
    /// Sell-side transaction tax, as a fraction of notional.
    pub stamp_duty_rate: Decimal,
    /// Floor applied to every commission.
    pub min_commission: Decimal,
    /// Shares per board lot; buy quantities are rounded down to a multiple of this.
    pub lot_size: u64,
    /// Fraction of cash the all-in sizing rule may spend on one buy.
    pub deployable_fraction: Decimal,
    /// Adverse price adjustment applied to the fill price (0.001 = 0.1%).
    pub slippage: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(100000),
            commission_rate: dec!(0.0003),
            stamp_duty_rate: dec!(0.001),
            min_commission: dec!(5),
            lot_size: 100,
            deployable_fraction: dec!(0.99),
            slippage: Decimal::ZERO,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(invalid(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        check_fraction("commission_rate", self.commission_rate)?;
        check_fraction("stamp_duty_rate", self.stamp_duty_rate)?;
        check_fraction("slippage", self.slippage)?;
        if self.min_commission < Decimal::ZERO {
            return Err(invalid("min_commission cannot be negative"));
        }
        if self.lot_size == 0 {
            return Err(invalid("lot_size must be at least 1"));
        }
        if self.deployable_fraction <= Decimal::ZERO || self.deployable_fraction > Decimal::ONE {
            return Err(invalid(format!(
                "deployable_fraction must be within (0, 1], got {}",
                self.deployable_fraction
            )));
        }
        Ok(())
    }
}

/// How the quantity of a buy order is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    /// Spend `deployable_fraction` of current cash.
    #[default]
    AllIn,
    /// Spend `fraction` of the cash above the reserve.
    FixedFraction,
    /// Spend up to `fixed_cash` per buy, never touching the reserve.
    FixedCash,
}

/// Parameters for buy-order sizing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SizingConfig {
    pub method: SizingMethod,
    /// Fraction of allocatable cash per buy (`fixed_fraction`).
    pub fraction: Decimal,
    /// Cash amount per buy (`fixed_cash`).
    pub fixed_cash: Decimal,
    /// Cash to keep in reserve, as a fraction of initial capital.
    /// Ignored by `all_in`.
    pub min_cash_fraction: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::AllIn,
            fraction: dec!(0.6),
            fixed_cash: dec!(20000),
            min_cash_fraction: dec!(0.4),
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fraction <= Decimal::ZERO || self.fraction > Decimal::ONE {
            return Err(invalid(format!("sizing.fraction must be within (0, 1], got {}", self.fraction)));
        }
        if self.fixed_cash <= Decimal::ZERO {
            return Err(invalid("sizing.fixed_cash must be positive"));
        }
        check_fraction("sizing.min_cash_fraction", self.min_cash_fraction)
    }
}

/// Parameters for the moving average crossover strategy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MaCrossoverParams {
    pub short_window: usize,
    pub long_window: usize,
}

impl Default for MaCrossoverParams {
    fn default() -> Self {
        Self { short_window: 10, long_window: 30 }
    }
}

/// Parameters for the RSI threshold strategy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RsiParams {
    pub period: usize,
    pub overbought: Decimal,
    pub oversold: Decimal,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            overbought: dec!(70),
            oversold: dec!(30),
        }
    }
}

/// Selects the strategy and holds the parameter sets of all of them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub id: StrategyId,
    pub ma_crossover: MaCrossoverParams,
    pub rsi: RsiParams,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            id: StrategyId::MaCrossover,
            ma_crossover: MaCrossoverParams::default(),
            rsi: RsiParams::default(),
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ma = &self.ma_crossover;
        if ma.short_window == 0 || ma.short_window >= ma.long_window {
            return Err(invalid(format!(
                "ma_crossover windows must satisfy 0 < short < long, got {} / {}",
                ma.short_window, ma.long_window
            )));
        }
        let rsi = &self.rsi;
        if rsi.period == 0 {
            return Err(invalid("rsi.period must be at least 1"));
        }
        if rsi.oversold < Decimal::ZERO || rsi.oversold >= rsi.overbought || rsi.overbought > dec!(100) {
            return Err(invalid(format!(
                "rsi thresholds must satisfy 0 <= oversold < overbought <= 100, got {} / {}",
                rsi.oversold, rsi.overbought
            )));
        }
        Ok(())
    }
}

/// The column a batch summary is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Instrument,
    #[default]
    TotalReturn,
    AnnualizedReturn,
    SharpeRatio,
    MaxDrawdown,
    WinRate,
    TradeCount,
}

/// Parameters for a multi-instrument batch run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Instrument codes, e.g. "510300.SH".
    pub instruments: Vec<String>,
    /// Directory holding one `<instrument>.csv` file per instrument.
    pub data_dir: PathBuf,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sort_by: SortKey,
    pub descending: bool,
    /// Worker threads; `None` uses one per CPU.
    pub workers: Option<usize>,
    /// Annual risk-free rate used by the Sharpe ratio.
    pub risk_free_rate: Decimal,
    /// Where the summary table is written.
    pub output_path: PathBuf,
    /// Optional JSON file receiving every instrument's full report.
    pub report_path: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            data_dir: PathBuf::from("storage/data"),
            start_date: None,
            end_date: None,
            sort_by: SortKey::TotalReturn,
            descending: true,
            workers: None,
            risk_free_rate: Decimal::ZERO,
            output_path: PathBuf::from("backtest_summary.csv"),
            report_path: None,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(invalid(format!("batch.start_date {start} is after end_date {end}")));
            }
        }
        if self.workers == Some(0) {
            return Err(invalid("batch.workers must be at least 1"));
        }
        Ok(())
    }
}
