//! Performance metrics calculator.
//!
//! Computes the report for one portfolio value path. The path is first
//! resampled to one observation per calendar day; every statistic below is
//! derived from the compounded return path rebuilt from it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::warn;

use crate::backtest::{CumulativeValueSeries, SeriesPoint};
use crate::error::{PipelineError, PipelineResult};

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Row labels of a formatted report, in presentation order.
pub const METRIC_NAMES: [&str; 8] = [
    "Total Return",
    "Annualized Return",
    "Annualized Volatility",
    "Maximum Drawdown",
    "Sharpe Ratio",
    "Calmar Ratio",
    "Maximum Drawdown Start Date",
    "Maximum Drawdown End Date",
];

/// Performance statistics of one value path.
///
/// Ratios are plain decimals (0.12 = 12%). Sharpe and Calmar are left
/// non-finite when volatility or drawdown is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown_start: NaiveDate,
    pub max_drawdown_end: NaiveDate,
    /// Number of resampled daily observations.
    pub observations: usize,
}

impl PerformanceReport {
    /// Formatted values keyed by metric name, in [`METRIC_NAMES`] order.
    pub fn formatted(&self) -> Vec<(&'static str, String)> {
        let values = [
            format_pct(self.total_return),
            format_pct(self.annualized_return),
            format_pct(self.annualized_volatility),
            format_pct(self.max_drawdown),
            format!("{:.2}", self.sharpe_ratio),
            format!("{:.2}", self.calmar_ratio),
            self.max_drawdown_start.format("%Y-%m-%d").to_string(),
            self.max_drawdown_end.format("%Y-%m-%d").to_string(),
        ];

        METRIC_NAMES.into_iter().zip(values).collect()
    }

    /// Names of ratio fields that came out non-finite.
    pub fn non_finite_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("Total Return", self.total_return),
            ("Annualized Return", self.annualized_return),
            ("Annualized Volatility", self.annualized_volatility),
            ("Maximum Drawdown", self.max_drawdown),
            ("Sharpe Ratio", self.sharpe_ratio),
            ("Calmar Ratio", self.calmar_ratio),
        ];
        fields
            .into_iter()
            .filter(|(_, v)| !v.is_finite())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn is_finite(&self) -> bool {
        self.non_finite_fields().is_empty()
    }

    /// Generate a summary report.
    pub fn summary(&self) -> String {
        self.formatted()
            .into_iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn format_pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Drawdown analysis details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    /// Largest peak-to-trough loss relative to the running peak.
    pub max_drawdown: f64,
    /// Date of the largest absolute gap below the running peak.
    pub trough_date: NaiveDate,
    /// Date of the highest value on or before the trough.
    pub peak_date: NaiveDate,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate the report for a cumulative value series.
    pub fn calculate(series: &CumulativeValueSeries) -> PipelineResult<PerformanceReport> {
        Self::calculate_points(&series.points)
    }

    /// Calculate the report for arbitrary dated values.
    pub fn calculate_points(points: &[SeriesPoint]) -> PipelineResult<PerformanceReport> {
        let daily = Self::resample_daily(points);
        if daily.len() < 2 {
            return Err(PipelineError::insufficient_data(format!(
                "need at least 2 daily observations, got {}",
                daily.len()
            )));
        }

        let dates: Vec<NaiveDate> = daily.iter().map(|p| p.date).collect();
        let values: Vec<f64> = daily.iter().map(|p| p.value).collect();
        let n = values.len();

        let returns = Self::daily_returns(&values);
        let cum_returns = Self::cumulative_returns(&returns);

        let final_growth = cum_returns[n - 1];
        let total_return = final_growth - 1.0;
        let annualized_return = final_growth.powf(TRADING_DAYS_PER_YEAR / n as f64) - 1.0;
        let annualized_volatility = returns.iter().std_dev() * TRADING_DAYS_PER_YEAR.sqrt();

        let drawdown = Self::analyze_drawdown(&dates, &cum_returns);

        let sharpe_ratio = annualized_return / annualized_volatility;
        let calmar_ratio = annualized_return / drawdown.max_drawdown;

        let report = PerformanceReport {
            total_return,
            annualized_return,
            annualized_volatility,
            max_drawdown: drawdown.max_drawdown,
            sharpe_ratio,
            calmar_ratio,
            max_drawdown_start: drawdown.peak_date,
            max_drawdown_end: drawdown.trough_date,
            observations: n,
        };

        let non_finite = report.non_finite_fields();
        if !non_finite.is_empty() {
            warn!("Non-finite metrics: {}", non_finite.join(", "));
        }

        Ok(report)
    }

    /// Keep the last observation of each calendar day, ascending by date.
    /// Missing (NaN) observations are skipped.
    fn resample_daily(points: &[SeriesPoint]) -> Vec<SeriesPoint> {
        let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for point in points.iter().filter(|p| !p.value.is_nan()) {
            by_day.insert(point.date, point.value);
        }
        by_day
            .into_iter()
            .map(|(date, value)| SeriesPoint::new(date, value))
            .collect()
    }

    /// Period-over-period returns, one shorter than `values`.
    fn daily_returns(values: &[f64]) -> Vec<f64> {
        values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
    }

    /// Compounded growth path aligned with the value index; starts at 1.
    fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
        let mut growth = 1.0;
        let mut path = Vec::with_capacity(returns.len() + 1);
        path.push(growth);
        for r in returns {
            growth *= 1.0 + r;
            path.push(growth);
        }
        path
    }

    /// Analyze drawdown of a growth path.
    ///
    /// Ties resolve to the first occurrence for both the trough and the peak.
    pub fn analyze_drawdown(dates: &[NaiveDate], cum_returns: &[f64]) -> DrawdownAnalysis {
        let mut running_max = f64::NEG_INFINITY;
        let mut max_drawdown = 0.0_f64;
        let mut widest_gap = f64::NEG_INFINITY;
        let mut trough_idx = 0;

        for (idx, &value) in cum_returns.iter().enumerate() {
            running_max = running_max.max(value);
            let gap = running_max - value;

            max_drawdown = max_drawdown.max(gap / running_max);
            if gap > widest_gap {
                widest_gap = gap;
                trough_idx = idx;
            }
        }

        let mut peak_idx = 0;
        for idx in 1..=trough_idx {
            if cum_returns[idx] > cum_returns[peak_idx] {
                peak_idx = idx;
            }
        }

        DrawdownAnalysis {
            max_drawdown,
            trough_date: dates[trough_idx],
            peak_date: dates[peak_idx],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 4).unwrap()
    }

    fn series(values: &[f64]) -> CumulativeValueSeries {
        CumulativeValueSeries::new(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| SeriesPoint::new(start() + Duration::days(i as i64), v))
                .collect(),
        )
    }

    #[test]
    fn test_known_total_return_round_trip() {
        let total = 0.21;
        let n = 60;
        let values: Vec<f64> = (0..n)
            .map(|i| (1.0_f64 + total).powf(i as f64 / (n - 1) as f64))
            .collect();

        let report = MetricsCalculator::calculate(&series(&values)).unwrap();

        assert_eq!(report.observations, n);
        assert_relative_eq!(report.total_return, total, epsilon = 1e-9);
        assert_relative_eq!(
            report.annualized_return,
            (1.0_f64 + total).powf(252.0 / n as f64) - 1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_monotonic_series_has_no_drawdown() {
        let values: Vec<f64> = (0..20).map(|i| 1.0 + 0.01 * i as f64).collect();
        let report = MetricsCalculator::calculate(&series(&values)).unwrap();

        assert_eq!(report.max_drawdown, 0.0);
        assert!(report.calmar_ratio.is_infinite());
        assert_eq!(report.max_drawdown_end, start());
        assert_eq!(report.max_drawdown_start, start());
    }

    #[test]
    fn test_drawdown_dates() {
        let report =
            MetricsCalculator::calculate(&series(&[1.0, 1.2, 0.9, 1.1, 0.8, 1.3])).unwrap();

        // (1.2 - 0.8) / 1.2
        assert_relative_eq!(report.max_drawdown, 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(report.max_drawdown_start, start() + Duration::days(1));
        assert_eq!(report.max_drawdown_end, start() + Duration::days(4));
        assert_relative_eq!(report.total_return, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_volatility_uses_sample_std() {
        let report = MetricsCalculator::calculate(&series(&[1.0, 1.1, 0.99])).unwrap();
        // returns 0.1 and -0.1, sample std = sqrt(0.02)
        assert_relative_eq!(
            report.annualized_volatility,
            0.02_f64.sqrt() * 252.0_f64.sqrt(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            report.sharpe_ratio,
            report.annualized_return / report.annualized_volatility,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_constant_series_is_non_finite_not_error() {
        let report = MetricsCalculator::calculate(&series(&[1.0, 1.0, 1.0, 1.0])).unwrap();

        assert_eq!(report.annualized_volatility, 0.0);
        assert!(report.sharpe_ratio.is_nan());
        assert!(report.calmar_ratio.is_nan());
        assert!(!report.is_finite());
        assert_eq!(
            report.non_finite_fields(),
            vec!["Sharpe Ratio", "Calmar Ratio"]
        );
    }

    #[test]
    fn test_insufficient_data() {
        let err = MetricsCalculator::calculate(&series(&[1.0])).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));

        let err = MetricsCalculator::calculate(&CumulativeValueSeries::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
    }

    #[test]
    fn test_resample_keeps_last_of_day() {
        let day = start();
        let points = vec![
            SeriesPoint::new(day, 1.0),
            SeriesPoint::new(day + Duration::days(1), 5.0),
            SeriesPoint::new(day + Duration::days(1), 1.1),
            SeriesPoint::new(day + Duration::days(3), f64::NAN),
        ];

        let report = MetricsCalculator::calculate_points(&points).unwrap();

        assert_eq!(report.observations, 2);
        assert_relative_eq!(report.total_return, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_formatting() {
        let report = PerformanceReport {
            total_return: 0.12346,
            annualized_return: -0.05,
            annualized_volatility: 0.2,
            max_drawdown: 0.0789,
            sharpe_ratio: 1.234,
            calmar_ratio: f64::INFINITY,
            max_drawdown_start: NaiveDate::from_ymd_opt(2016, 2, 3).unwrap(),
            max_drawdown_end: NaiveDate::from_ymd_opt(2016, 11, 30).unwrap(),
            observations: 100,
        };

        let formatted = report.formatted();
        let values: Vec<&str> = formatted.iter().map(|(_, v)| v.as_str()).collect();

        assert_eq!(
            values,
            vec!["12.35%", "-5.00%", "20.00%", "7.89%", "1.23", "inf", "2016-02-03", "2016-11-30"]
        );
        assert_eq!(formatted[0].0, "Total Return");
        assert!(report.summary().contains("Maximum Drawdown End Date: 2016-11-30"));
    }
}
