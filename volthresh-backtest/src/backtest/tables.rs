//! Result tables, one column per parameterization.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;
use crate::metrics::{PerformanceReport, METRIC_NAMES};

use super::aggregate::CumulativeValueSeries;

/// Performance report per variant label, in run order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<(String, PerformanceReport)>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, report: PerformanceReport) {
        self.columns.push((label.into(), report));
    }

    pub fn get(&self, label: &str) -> Option<&PerformanceReport> {
        self.columns
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, report)| report)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PerformanceReport)> {
        self.columns.iter().map(|(l, r)| (l.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Formatted table: a `metric` column plus one text column per variant.
    pub fn to_dataframe(&self) -> PipelineResult<DataFrame> {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(Column::new("metric".into(), METRIC_NAMES.to_vec()));

        for (label, report) in self.iter() {
            let values: Vec<String> = report.formatted().into_iter().map(|(_, v)| v).collect();
            columns.push(Column::new(label.into(), values));
        }

        Ok(DataFrame::new(columns)?)
    }
}

/// Portfolio value path per variant label, in run order.
///
/// Each column keeps its own dates; nothing is reindexed until export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PnlTable {
    columns: Vec<(String, CumulativeValueSeries)>,
}

impl PnlTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, series: CumulativeValueSeries) {
        self.columns.push((label.into(), series));
    }

    pub fn get(&self, label: &str) -> Option<&CumulativeValueSeries> {
        self.columns
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, series)| series)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Frame with a `date` column over every date seen in any column.
    /// Dates a variant did not trade are left null.
    pub fn to_dataframe(&self) -> PipelineResult<DataFrame> {
        let dates: BTreeSet<NaiveDate> = self
            .columns
            .iter()
            .flat_map(|(_, series)| series.dates())
            .collect();

        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        let date_strings: Vec<String> = dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();
        columns.push(Column::new("date".into(), date_strings));

        for (label, series) in &self.columns {
            let values: Vec<Option<f64>> = dates.iter().map(|d| series.value_at(*d)).collect();
            columns.push(Column::new(label.as_str().into(), values));
        }

        Ok(DataFrame::new(columns)?)
    }
}
