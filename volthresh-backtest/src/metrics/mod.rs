//! Performance metrics module.
//!
//! Turns a portfolio value path into a fixed report:
//! - Total and annualized return
//! - Annualized volatility
//! - Maximum drawdown with peak and trough dates
//! - Sharpe and Calmar ratios

pub mod calculator;

pub use calculator::{
    DrawdownAnalysis, MetricsCalculator, PerformanceReport, METRIC_NAMES, TRADING_DAYS_PER_YEAR,
};
