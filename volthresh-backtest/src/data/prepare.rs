//! Data preparation for one volatility variant.
//!
//! Joins the raw options frame with the volatility-index frame (underlying
//! price plus the chosen volatility column) and with the short-term reference
//! rate, all on the trading date. Volatility and rate are quoted in percent
//! upstream and are rescaled to decimals here.
//!
//! Expected columns:
//! - options: `date`, `code`, `close`, `K`, `opt_type`, `T`, `ret`
//! - volatility index: `date`, `asset_price`, one column per variant
//! - rate curve: `date`, one column per tenor

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

use super::types::{OptionRecord, OptionType};

pub const DATE: &str = "date";
pub const INSTRUMENT: &str = "code";
pub const CLOSE: &str = "close";
pub const STRIKE: &str = "K";
pub const OPTION_TYPE: &str = "opt_type";
pub const TIME_TO_EXPIRY: &str = "T";
pub const REALIZED_RETURN: &str = "ret";
pub const UNDERLYING: &str = "asset_price";

const SIGMA: &str = "sigma";
const RATE: &str = "rf";

/// Source of prepared records, one call per volatility variant.
pub trait DataPreparation {
    /// Records for `variant`, joined, rescaled and without missing returns.
    fn prepare(&self, variant: &str) -> PipelineResult<Vec<OptionRecord>>;
}

/// Records prepared elsewhere, keyed by variant.
#[derive(Debug, Clone, Default)]
pub struct PreparedRecords {
    by_variant: BTreeMap<String, Vec<OptionRecord>>,
}

impl PreparedRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variant(mut self, variant: impl Into<String>, records: Vec<OptionRecord>) -> Self {
        self.by_variant.insert(variant.into(), records);
        self
    }
}

impl DataPreparation for PreparedRecords {
    fn prepare(&self, variant: &str) -> PipelineResult<Vec<OptionRecord>> {
        self.by_variant
            .get(variant)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.has_return())
                    .cloned()
                    .collect()
            })
            .ok_or_else(|| PipelineError::data(format!("no records for variant '{}'", variant)))
    }
}

/// Polars-backed preparation over in-memory frames.
pub struct FramePreparer {
    options: DataFrame,
    vol_index: DataFrame,
    rate_curve: DataFrame,
    rate_column: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl FramePreparer {
    pub fn new(options: DataFrame, vol_index: DataFrame, rate_curve: DataFrame) -> Self {
        Self {
            options,
            vol_index,
            rate_curve,
            rate_column: "1".to_string(),
            start_date: None,
            end_date: None,
        }
    }

    /// Set the rate-curve tenor column used as the risk-free rate.
    pub fn with_rate_column(mut self, column: impl Into<String>) -> Self {
        self.rate_column = column.into();
        self
    }

    /// Restrict the rate curve, and therefore the records, to a date range.
    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    fn rates(&self) -> PipelineResult<LazyFrame> {
        let mut lf = normalize_dates(&self.rate_curve)?.lazy().select([
            col(DATE),
            col(self.rate_column.as_str())
                .cast(DataType::Float64)
                .alias(RATE),
        ]);

        // Normalized dates are `YYYY-MM-DD`, so lexical order is chronological.
        if let Some(start) = self.start_date {
            lf = lf.filter(col(DATE).gt_eq(lit(iso_date(start))));
        }
        if let Some(end) = self.end_date {
            lf = lf.filter(col(DATE).lt_eq(lit(iso_date(end))));
        }
        Ok(lf)
    }

    fn joined_frame(&self, variant: &str) -> PipelineResult<DataFrame> {
        if self.vol_index.column(variant).is_err() {
            return Err(PipelineError::data(format!(
                "volatility column '{}' not found",
                variant
            )));
        }
        if self.rate_curve.column(&self.rate_column).is_err() {
            return Err(PipelineError::data(format!(
                "rate column '{}' not found",
                self.rate_column
            )));
        }

        let vol = normalize_dates(&self.vol_index)?.lazy().select([
            col(DATE),
            col(UNDERLYING).cast(DataType::Float64),
            col(variant).cast(DataType::Float64).alias(SIGMA),
        ]);

        let df = normalize_dates(&self.options)?
            .lazy()
            .join(vol, [col(DATE)], [col(DATE)], JoinArgs::new(JoinType::Inner))
            .join(self.rates()?, [col(DATE)], [col(DATE)], JoinArgs::new(JoinType::Inner))
            .filter(col(REALIZED_RETURN).is_not_null())
            .with_columns([
                (col(SIGMA) / lit(100.0)).alias(SIGMA),
                (col(RATE) / lit(100.0)).alias(RATE),
            ])
            .collect()?;

        if df.height() == 0 && self.options.height() > 0 {
            warn!(
                "Variant {}: no rows left after joining on date and dropping null returns",
                variant
            );
        }

        Ok(df)
    }
}

impl DataPreparation for FramePreparer {
    fn prepare(&self, variant: &str) -> PipelineResult<Vec<OptionRecord>> {
        let df = self.joined_frame(variant)?;
        debug!("Joined {} rows for variant {}", df.height(), variant);

        let mut records = dataframe_to_records(&df)?;
        records.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.instrument_id.cmp(&b.instrument_id))
        });
        Ok(records)
    }
}

fn f64_column(df: &DataFrame, name: &str) -> PipelineResult<Float64Chunked> {
    Ok(df.column(name)?.cast(&DataType::Float64)?.f64()?.clone())
}

fn str_column(df: &DataFrame, name: &str) -> PipelineResult<StringChunked> {
    Ok(df.column(name)?.cast(&DataType::String)?.str()?.clone())
}

/// Option kinds arrive either as text (`call` / `put`) or as 0 / 1 codes.
fn option_kinds(df: &DataFrame) -> PipelineResult<Vec<Option<PipelineResult<OptionType>>>> {
    let column = df.column(OPTION_TYPE)?;
    if matches!(column.dtype(), DataType::String) {
        Ok(column
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.parse::<OptionType>()))
            .collect())
    } else {
        Ok(column
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map(OptionType::try_from))
            .collect())
    }
}

fn parse_date(s: &str) -> PipelineResult<NaiveDate> {
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| PipelineError::data(format!("invalid date '{}': {}", s, e)))
}

fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Rewrite the `date` column as `YYYY-MM-DD` strings.
///
/// Frames arrive with text, `Date` or `Datetime` dates; the join key must
/// have one representation across all three inputs.
fn normalize_dates(df: &DataFrame) -> PipelineResult<DataFrame> {
    let raw = str_column(df, DATE)?;
    let days = raw
        .into_iter()
        .map(|v| v.map(|s| parse_date(s).map(iso_date)).transpose())
        .collect::<PipelineResult<Vec<Option<String>>>>()?;

    let mut out = df.clone();
    out.with_column(Column::new(DATE.into(), days))?;
    Ok(out)
}

/// Convert a joined frame into records.
///
/// Rows that fail validation (unknown option kind, missing numeric fields,
/// non-positive T or sigma) are skipped with a warning; the rest are kept.
fn dataframe_to_records(df: &DataFrame) -> PipelineResult<Vec<OptionRecord>> {
    let dates = str_column(df, DATE)?;
    let codes = str_column(df, INSTRUMENT)?;
    let close = f64_column(df, CLOSE)?;
    let strike = f64_column(df, STRIKE)?;
    let time = f64_column(df, TIME_TO_EXPIRY)?;
    let ret = f64_column(df, REALIZED_RETURN)?;
    let spot = f64_column(df, UNDERLYING)?;
    let sigma = f64_column(df, SIGMA)?;
    let rate = f64_column(df, RATE)?;
    let kinds = option_kinds(df)?;

    let mut records = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    let mut missing_returns = 0usize;

    for (idx, kind) in kinds.into_iter().enumerate() {
        // NaN counts as a missing return, like a null.
        let realized_return = ret.get(idx).filter(|r| !r.is_nan());
        if realized_return.is_none() {
            missing_returns += 1;
            continue;
        }

        let row = build_record(
            dates.get(idx),
            codes.get(idx),
            kind,
            [
                close.get(idx),
                spot.get(idx),
                strike.get(idx),
                time.get(idx),
                sigma.get(idx),
                rate.get(idx),
            ],
            realized_return,
        );

        match row {
            Ok(record) => records.push(record),
            Err(PipelineError::InvalidInput(msg)) => {
                warn!("Skipping row {}: {}", idx, msg);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if skipped > 0 {
        warn!("Skipped {} of {} rows", skipped, df.height());
    }
    if missing_returns > 0 {
        debug!("Dropped {} rows with a NaN return", missing_returns);
    }

    Ok(records)
}

fn build_record(
    date: Option<&str>,
    code: Option<&str>,
    kind: Option<PipelineResult<OptionType>>,
    numbers: [Option<f64>; 6],
    realized_return: Option<f64>,
) -> PipelineResult<OptionRecord> {
    let date = parse_date(date.ok_or_else(|| PipelineError::data("missing date"))?)?;
    let code = code.unwrap_or_default();
    let kind = kind.ok_or_else(|| {
        PipelineError::invalid_input(format!("{} on {}: missing option kind", code, date))
    })??;

    let [close, spot, strike, time, sigma, rate] = numbers;
    let required = |v: Option<f64>, field: &str| {
        v.ok_or_else(|| {
            PipelineError::invalid_input(format!("{} on {}: missing {}", code, date, field))
        })
    };

    let record = OptionRecord::new(
        date,
        code,
        required(close, CLOSE)?,
        kind,
        required(spot, UNDERLYING)?,
        required(strike, STRIKE)?,
        required(time, TIME_TO_EXPIRY)?,
        required(sigma, SIGMA)?,
        required(rate, RATE)?,
        realized_return,
    );
    record.validate()?;
    Ok(record)
}
