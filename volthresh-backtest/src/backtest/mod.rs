//! Backtesting pipeline for the volatility-threshold strategy.
//!
//! This module provides:
//! - Mispricing signals against a threshold band
//! - Daily return aggregation with a flat commission
//! - The value path used for performance metrics
//! - Orchestration across volatility variants

pub mod aggregate;
pub mod commission;
pub mod engine;
pub mod signal;
pub mod tables;

pub use aggregate::{
    Aggregation, Aggregator, CumulativeValueSeries, DailyReturnSeries, SeriesPoint, BASE_VALUE,
};
pub use commission::CommissionModel;
pub use engine::{
    run_backtest, BacktestConfig, BacktestEngine, BacktestOutput, VariantFailure, VariantResult,
};
pub use signal::{generate_signals, Signal};
pub use tables::{PnlTable, ResultTable};
