//! Core backtesting engine.
//!
//! Runs one independent pipeline per volatility variant:
//! 1. Prepare records for the variant
//! 2. Price every record with Black-Scholes
//! 3. Generate signals and aggregate daily returns
//! 4. Compute performance metrics on the value path
//!
//! Variants share nothing, so they run on the rayon pool when enabled. Results
//! are merged in configuration order whatever the completion order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{load_rate_curve, DataPreparation, FramePreparer};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::{MetricsCalculator, PerformanceReport};
use crate::pricing::price_records;

use super::aggregate::{Aggregator, CumulativeValueSeries, DailyReturnSeries};
use super::commission::CommissionModel;
use super::tables::{PnlTable, ResultTable};

/// Configuration for backtest execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Volatility column identifiers, one per parameterization.
    pub volatility_variants: Vec<String>,

    /// Mispricing thresholds, index-aligned with `volatility_variants`.
    pub thresholds: Vec<f64>,

    /// Flat commission subtracted from every daily return.
    #[serde(default)]
    pub commission: f64,

    /// Reference rate curve CSV.
    #[serde(default)]
    pub rate_curve_path: Option<PathBuf>,

    /// Rate curve tenor column used as the risk-free rate.
    #[serde(default = "default_rate_tenor_column")]
    pub rate_tenor_column: String,

    /// First trading date included.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    /// Last trading date included.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    /// Run variants on the rayon pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_rate_tenor_column() -> String {
    "1".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            volatility_variants: Vec::new(),
            thresholds: Vec::new(),
            commission: 0.0,
            rate_curve_path: None,
            rate_tenor_column: default_rate_tenor_column(),
            start_date: None,
            end_date: None,
            parallel: true,
        }
    }
}

impl BacktestConfig {
    /// Config for index-aligned variants and thresholds.
    pub fn new<S: Into<String>>(
        variants: impl IntoIterator<Item = S>,
        thresholds: impl IntoIterator<Item = f64>,
    ) -> Self {
        Self {
            volatility_variants: variants.into_iter().map(Into::into).collect(),
            thresholds: thresholds.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_commission(mut self, commission: f64) -> Self {
        self.commission = commission;
        self
    }

    pub fn with_rate_curve(mut self, path: impl Into<PathBuf>) -> Self {
        self.rate_curve_path = Some(path.into());
        self
    }

    pub fn with_rate_tenor_column(mut self, column: impl Into<String>) -> Self {
        self.rate_tenor_column = column.into();
        self
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check run-level constraints before any work starts.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.volatility_variants.len() != self.thresholds.len() {
            return Err(PipelineError::config(format!(
                "{} volatility variants but {} thresholds",
                self.volatility_variants.len(),
                self.thresholds.len()
            )));
        }

        let mut seen = HashSet::new();
        for variant in &self.volatility_variants {
            if !seen.insert(variant.as_str()) {
                return Err(PipelineError::config(format!(
                    "duplicate volatility variant '{}'",
                    variant
                )));
            }
        }

        if let Some(thr) = self.thresholds.iter().find(|t| !t.is_finite()) {
            return Err(PipelineError::config(format!(
                "threshold must be finite, got {}",
                thr
            )));
        }

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(PipelineError::config(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
        }

        CommissionModel::new(self.commission)?;
        Ok(())
    }

    /// `(variant, threshold)` pairs in run order.
    pub fn parameterizations(&self) -> impl Iterator<Item = (&str, f64)> {
        self.volatility_variants
            .iter()
            .map(String::as_str)
            .zip(self.thresholds.iter().copied())
    }
}

/// Everything produced for one parameterization.
#[derive(Debug, Clone)]
pub struct VariantResult {
    pub label: String,
    pub threshold: f64,
    pub report: PerformanceReport,
    pub value_series: CumulativeValueSeries,
    pub daily_returns: DailyReturnSeries,
    pub records_used: usize,
    pub active_positions: usize,
}

/// A parameterization that was dropped from the tables.
#[derive(Debug)]
pub struct VariantFailure {
    pub label: String,
    pub error: PipelineError,
}

/// Result of a completed backtest.
#[derive(Debug, Default)]
pub struct BacktestOutput {
    /// One performance report per successful variant.
    pub results: ResultTable,

    /// One value path per successful variant.
    pub pnl: PnlTable,

    /// Variants omitted from both tables, with the reason.
    pub failures: Vec<VariantFailure>,
}

impl BacktestOutput {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The main backtesting engine.
pub struct BacktestEngine {
    config: BacktestConfig,
    commission: CommissionModel,
}

impl BacktestEngine {
    /// Create a new engine; the configuration is validated up front.
    pub fn new(config: BacktestConfig) -> PipelineResult<Self> {
        config.validate()?;
        let commission = CommissionModel::new(config.commission)?;
        Ok(Self { config, commission })
    }

    /// Run every parameterization against a preparation source.
    ///
    /// A failing variant is logged, recorded in `failures` and left out of
    /// both tables; the others are unaffected.
    pub fn run<P>(&self, preparer: &P) -> BacktestOutput
    where
        P: DataPreparation + Sync,
    {
        let params: Vec<(&str, f64)> = self.config.parameterizations().collect();
        info!(
            "Running {} parameterizations (commission {}, parallel: {})",
            params.len(),
            self.commission.per_period,
            self.config.parallel
        );

        let outcomes: Vec<PipelineResult<VariantResult>> = if self.config.parallel {
            params
                .par_iter()
                .map(|&(variant, threshold)| self.run_variant(preparer, variant, threshold))
                .collect()
        } else {
            params
                .iter()
                .map(|&(variant, threshold)| self.run_variant(preparer, variant, threshold))
                .collect()
        };

        let mut output = BacktestOutput::default();
        for ((variant, _), outcome) in params.into_iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    output.results.insert(result.label.clone(), result.report);
                    output.pnl.insert(result.label, result.value_series);
                }
                Err(error) => {
                    warn!("Variant {} failed: {}", variant, error);
                    output.failures.push(VariantFailure {
                        label: variant.to_string(),
                        error,
                    });
                }
            }
        }

        info!(
            "Backtest complete: {} succeeded, {} failed",
            output.results.len(),
            output.failures.len()
        );
        output
    }

    /// Run the full pipeline for one parameterization.
    pub fn run_variant<P>(
        &self,
        preparer: &P,
        variant: &str,
        threshold: f64,
    ) -> PipelineResult<VariantResult>
    where
        P: DataPreparation + ?Sized,
    {
        info!("Variant {}: threshold {}", variant, threshold);

        let aggregator = Aggregator::new(threshold, self.commission)?;
        let mut records = preparer.prepare(variant)?;
        info!("Variant {}: {} prepared records", variant, records.len());

        price_records(&mut records);
        let aggregation = aggregator.run(&mut records)?;
        let report = MetricsCalculator::calculate(&aggregation.value_series)?;

        info!(
            "Variant {}: {} days, total return {:.2}%, Sharpe {:.2}",
            variant,
            report.observations,
            report.total_return * 100.0,
            report.sharpe_ratio
        );

        Ok(VariantResult {
            label: variant.to_string(),
            threshold,
            report,
            value_series: aggregation.value_series,
            daily_returns: aggregation.daily_returns,
            records_used: aggregation.records_used,
            active_positions: aggregation.active_positions,
        })
    }

    /// Build a frame-backed preparer from raw frames and the configured
    /// rate curve file.
    pub fn frame_preparer(
        &self,
        options: DataFrame,
        vol_index: DataFrame,
    ) -> PipelineResult<FramePreparer> {
        let path = self
            .config
            .rate_curve_path
            .as_ref()
            .ok_or_else(|| PipelineError::config("rate_curve_path is not set"))?;
        let rate_curve = load_rate_curve(path, crate::data::prepare::DATE)?;
        Ok(self.frame_preparer_with_rates(options, vol_index, rate_curve))
    }

    /// Build a frame-backed preparer with an in-memory rate curve.
    pub fn frame_preparer_with_rates(
        &self,
        options: DataFrame,
        vol_index: DataFrame,
        rate_curve: DataFrame,
    ) -> FramePreparer {
        let mut preparer = FramePreparer::new(options, vol_index, rate_curve)
            .with_rate_column(self.config.rate_tenor_column.clone());
        if let (Some(start), Some(end)) = (self.config.start_date, self.config.end_date) {
            preparer = preparer.with_date_range(start, end);
        }
        preparer
    }
}

/// Validate `config`, load its rate curve and run every parameterization over
/// the raw options and volatility-index frames.
pub fn run_backtest(
    config: BacktestConfig,
    options: DataFrame,
    vol_index: DataFrame,
) -> PipelineResult<BacktestOutput> {
    let engine = BacktestEngine::new(config)?;
    let preparer = engine.frame_preparer(options, vol_index)?;
    Ok(engine.run(&preparer))
}
