use std::fs;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use polars::prelude::*;

use volthresh_backtest::{
    run_backtest, BacktestConfig, BacktestEngine, BlackScholes, OptionRecord, OptionType,
    PipelineError, PreparedRecords,
};

const COMMISSION: f64 = 0.0005;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 8, d).unwrap()
}

fn scenario_call(date: NaiveDate, close: f64, ret: Option<f64>) -> OptionRecord {
    OptionRecord::new(date, "10005001", close, OptionType::Call, 100.0, 95.0, 0.1, 0.2, 0.03, ret)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn scenario_call_price_matches_reference() {
    let bs = BlackScholes::new(0.03);
    let call = bs.call_price(100.0, 95.0, 0.1, 0.2);
    let put = bs.put_price(100.0, 95.0, 0.1, 0.2);

    assert_relative_eq!(call, 5.951044288896142, epsilon = 1e-9);
    assert_relative_eq!(call - put, 100.0 - 95.0 * (-0.03_f64 * 0.1).exp(), epsilon = 1e-9);
    assert!(call > 5.0);
}

#[test]
fn scenario_close_inside_band_stays_flat() {
    init_tracing();
    // 5.951 lies inside [0.99 * 6.00, 1.01 * 6.00].
    let prepared = PreparedRecords::new().with_variant(
        "ivix",
        vec![
            scenario_call(day(1), 6.00, Some(0.02)),
            scenario_call(day(2), 6.00, Some(0.02)),
        ],
    );
    let config = BacktestConfig::new(["ivix"], [0.01]).with_commission(COMMISSION);
    let engine = BacktestEngine::new(config).unwrap();

    let result = engine.run_variant(&prepared, "ivix", 0.01).unwrap();

    assert_eq!(result.active_positions, 0);
    assert_relative_eq!(result.daily_returns.points[0].value, -COMMISSION, epsilon = 1e-15);
    let values = result.value_series.values();
    assert_eq!(values[0], 1.0);
    assert_relative_eq!(values[1], 1.0 - COMMISSION, epsilon = 1e-15);
}

#[test]
fn scenario_underpriced_call_goes_long() {
    init_tracing();
    let prepared = PreparedRecords::new().with_variant(
        "ivix",
        vec![
            scenario_call(day(1), 5.85, Some(0.02)),
            scenario_call(day(2), 5.85, Some(0.02)),
        ],
    );
    let config = BacktestConfig::new(["ivix"], [0.01]).with_commission(COMMISSION);
    let engine = BacktestEngine::new(config).unwrap();

    let result = engine.run_variant(&prepared, "ivix", 0.01).unwrap();

    assert_eq!(result.active_positions, 2);
    assert_relative_eq!(result.daily_returns.points[0].value, 0.02 - COMMISSION, epsilon = 1e-15);
    let values = result.value_series.values();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0], 1.0);
    assert_relative_eq!(values[1], 1.0 + (0.02 - COMMISSION), epsilon = 1e-15);
    assert_eq!(result.report.observations, 2);
    assert_relative_eq!(result.report.total_return, 0.02 - COMMISSION, epsilon = 1e-12);
}

#[test]
fn single_trading_day_is_insufficient() {
    let prepared = PreparedRecords::new()
        .with_variant("ivix", vec![scenario_call(day(1), 5.85, Some(0.02))]);
    let engine = BacktestEngine::new(BacktestConfig::new(["ivix"], [0.01])).unwrap();

    let output = engine.run(&prepared);

    assert!(output.results.is_empty());
    assert!(output.pnl.is_empty());
    assert!(matches!(
        output.failures[0].error,
        PipelineError::InsufficientData(_)
    ));
}

#[test]
fn mismatched_lists_fail_before_any_work() {
    let config =
        BacktestConfig::new(["ivix", "hv20"], [0.01]).with_rate_curve("does/not/exist.csv");

    let err = run_backtest(config, DataFrame::empty(), DataFrame::empty()).unwrap_err();

    // Config is checked before the rate curve is touched.
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn missing_return_is_excluded_from_the_average() {
    let mut underpriced_no_return = scenario_call(day(1), 1.0, None);
    underpriced_no_return.instrument_id = "no-return".to_string();

    let prepared = PreparedRecords::new().with_variant(
        "ivix",
        vec![
            scenario_call(day(1), 5.85, Some(0.04)),
            underpriced_no_return,
            scenario_call(day(2), 5.85, Some(0.01)),
        ],
    );
    let engine = BacktestEngine::new(BacktestConfig::new(["ivix"], [0.01])).unwrap();

    let result = engine.run_variant(&prepared, "ivix", 0.01).unwrap();

    assert_eq!(result.records_used, 2);
    assert_relative_eq!(result.daily_returns.points[0].value, 0.04, epsilon = 1e-15);
}

#[test]
fn frames_end_to_end() {
    init_tracing();

    let dates = ["2023-08-01", "2023-08-02", "2023-08-03", "2023-08-04"];
    let options = df!(
        "date" => [dates[0], dates[0], dates[1], dates[1], dates[2], dates[2], dates[3]],
        "code" => ["C1", "P1", "C1", "P1", "C1", "P1", "C1"],
        "close" => [5.85, 0.50, 5.85, 0.80, 6.50, 0.66, 5.85],
        "K" => [95.0, 95.0, 95.0, 95.0, 95.0, 95.0, 95.0],
        "opt_type" => ["call", "put", "call", "put", "call", "put", "call"],
        "T" => [0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1],
        "ret" => [Some(0.02), Some(-0.01), Some(0.01), None, Some(0.03), Some(0.0), Some(0.02)]
    )
    .unwrap();

    let vol_index = df!(
        "date" => dates,
        "asset_price" => [100.0, 100.0, 100.0, 100.0],
        "ivix" => [20.0, 20.0, 20.0, 20.0],
        "hv20" => [10.0, 10.0, 10.0, 10.0]
    )
    .unwrap();

    let dir = std::env::temp_dir().join("volthresh-backtest-it");
    fs::create_dir_all(&dir).unwrap();
    let rate_path = dir.join("rates.csv");
    let mut rate_csv = String::from("Unnamed: 0,1,7\n");
    for date in dates {
        rate_csv.push_str(&format!("{},3.0,3.2\n", date));
    }
    fs::write(&rate_path, rate_csv).unwrap();

    let config = BacktestConfig::new(["ivix", "hv20", "hv60"], [0.01, 0.01, 0.01])
        .with_commission(COMMISSION)
        .with_rate_curve(&rate_path)
        .with_date_range(day(1), day(3));

    let output = run_backtest(config, options, vol_index).unwrap();

    assert_eq!(output.results.labels(), vec!["ivix", "hv20"]);
    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].label, "hv60");

    // Date range ends on 08-03, so three trading days per variant.
    let ivix = output.pnl.get("ivix").unwrap();
    assert_eq!(ivix.len(), 3);
    assert_eq!(ivix.first().unwrap().value, 1.0);

    // With 20% vol the 5.85 call is cheap (model 5.951) and the 0.50 put is
    // cheap too (model 0.666), so day one averages 0.02 and -0.01.
    assert_relative_eq!(
        ivix.value_at(day(2)).unwrap(),
        1.0 + (0.02 - 0.01) / 2.0 - COMMISSION,
        epsilon = 1e-12
    );

    let results = output.results.to_dataframe().unwrap();
    assert_eq!(results.shape(), (8, 3));

    let pnl = output.pnl.to_dataframe().unwrap();
    assert_eq!(pnl.height(), 3);

    let report = output.results.get("hv20").unwrap();
    assert_eq!(report.observations, 3);
    assert!(report.max_drawdown >= 0.0);
}
