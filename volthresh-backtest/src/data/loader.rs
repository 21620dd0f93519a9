//! CSV loading for reference data.
//!
//! The reference rate curve is a CSV file with one row per trading date: a
//! date column followed by one column per tenor, rates quoted in percent.

use std::path::Path;

use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Read a headed CSV file into a DataFrame. Dates are kept as strings.
pub fn load_csv(path: impl AsRef<Path>) -> PipelineResult<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.display().to_string()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!("Loaded {} rows from {}", df.height(), path.display());
    Ok(df)
}

/// Load a rate curve and normalize its date column name.
///
/// Spreadsheet exports often leave the index column unnamed; the first column
/// is therefore always treated as the date and renamed to `date_column`.
pub fn load_rate_curve(path: impl AsRef<Path>, date_column: &str) -> PipelineResult<DataFrame> {
    let mut df = load_csv(path)?;

    let first = df
        .get_column_names()
        .first()
        .map(|name| name.to_string())
        .ok_or_else(|| PipelineError::data("rate curve has no columns"))?;

    if first != date_column {
        df.rename(&first, date_column.into())?;
    }

    Ok(df)
}
