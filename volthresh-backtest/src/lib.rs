pub mod backtest;
pub mod data;
pub mod error;
pub mod metrics;
pub mod pricing;

// Re-export commonly used types
pub use backtest::{
    run_backtest, BacktestConfig, BacktestEngine, BacktestOutput, CumulativeValueSeries,
    DailyReturnSeries, PnlTable, ResultTable, Signal,
};
pub use data::{DataPreparation, FramePreparer, OptionRecord, OptionType, PreparedRecords};
pub use error::{PipelineError, PipelineResult};
pub use metrics::{MetricsCalculator, PerformanceReport};
pub use pricing::BlackScholes;
