//! Daily return aggregation.
//!
//! Turns signed per-record returns into one portfolio return per trading day,
//! then into the value path the metrics are computed on:
//! 1. Drop records without a realized return (null or NaN)
//! 2. Generate signals against the threshold
//! 3. Average `realized_return * signal` over all records of a date
//! 4. Subtract the flat commission
//! 5. Cumulative-sum from a base of 1.0 and shift forward one day

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::OptionRecord;
use crate::error::{PipelineError, PipelineResult};

use super::commission::CommissionModel;
use super::signal::{check_threshold, generate_signals};

/// Base value of every cumulative path.
pub const BASE_VALUE: f64 = 1.0;

/// A dated scalar observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Commission-adjusted portfolio return per trading day, ascending unique dates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyReturnSeries {
    pub points: Vec<SeriesPoint>,
}

impl DailyReturnSeries {
    /// Group signed record returns by date and net out the commission.
    ///
    /// Records lacking a realized return are ignored and do not count towards
    /// the daily average. A record with a return but no signal is an error.
    pub fn from_records(
        records: &[OptionRecord],
        commission: &CommissionModel,
    ) -> PipelineResult<Self> {
        let mut by_date: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();

        for record in records.iter().filter(|r| r.has_return()) {
            let position_return = record.position_return().ok_or_else(|| {
                PipelineError::invalid_input(format!(
                    "{} on {} has no signal",
                    record.instrument_id, record.date
                ))
            })?;

            let entry = by_date.entry(record.date).or_insert((0.0, 0));
            entry.0 += position_return;
            entry.1 += 1;
        }

        let points = by_date
            .into_iter()
            .map(|(date, (sum, count))| {
                SeriesPoint::new(date, commission.apply(sum / count as f64))
            })
            .collect();

        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Build the value path.
    ///
    /// `value[0] = 1.0` and `value[t] = 1.0 + sum(daily[0..t])`: the return of
    /// day t shows up in the value reported on day t + 1, so the last day's
    /// return is not part of the path.
    pub fn to_value_series(&self) -> CumulativeValueSeries {
        let mut running = BASE_VALUE;
        let points = self
            .points
            .iter()
            .map(|p| {
                let point = SeriesPoint::new(p.date, running);
                running += p.value;
                point
            })
            .collect();

        CumulativeValueSeries { points }
    }
}

/// Portfolio value path starting at 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeValueSeries {
    pub points: Vec<SeriesPoint>,
}

impl CumulativeValueSeries {
    pub fn new(points: Vec<SeriesPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.points[idx].value)
    }
}

/// Output of one aggregation pass.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub daily_returns: DailyReturnSeries,
    pub value_series: CumulativeValueSeries,
    /// Records that entered the daily average.
    pub records_used: usize,
    /// Records with a non-flat signal.
    pub active_positions: usize,
}

/// Signal generation plus daily aggregation for one parameterization.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    threshold: f64,
    commission: CommissionModel,
}

impl Aggregator {
    pub fn new(threshold: f64, commission: CommissionModel) -> PipelineResult<Self> {
        check_threshold(threshold)?;
        Ok(Self {
            threshold,
            commission,
        })
    }

    /// Run signal generation and aggregation over priced records.
    ///
    /// Records without a realized return are removed from `records` first.
    pub fn run(&self, records: &mut Vec<OptionRecord>) -> PipelineResult<Aggregation> {
        let before = records.len();
        records.retain(|r| r.has_return());
        if records.len() < before {
            debug!(
                "Dropped {} records without realized return",
                before - records.len()
            );
        }

        generate_signals(records, self.threshold)?;

        let active_positions = records
            .iter()
            .filter(|r| r.signal.map(|s| s.is_active()).unwrap_or(false))
            .count();

        let daily_returns = DailyReturnSeries::from_records(records, &self.commission)?;
        let value_series = daily_returns.to_value_series();

        debug!(
            "Aggregated {} records into {} trading days ({} active positions)",
            records.len(),
            daily_returns.len(),
            active_positions
        );

        Ok(Aggregation {
            daily_returns,
            value_series,
            records_used: records.len(),
            active_positions,
        })
    }
}
