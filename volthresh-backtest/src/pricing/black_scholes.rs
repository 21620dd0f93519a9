//! Closed-form Black-Scholes-Merton pricing of European options.
//!
//! Inputs are taken as given: callers guarantee `time > 0` and `vol > 0`.
//! Nothing is clamped near zero.

use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use crate::data::{OptionRecord, OptionType};
use crate::error::PipelineResult;

/// Black-Scholes calculator for a fixed risk-free rate.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Annualized risk-free rate, decimal
    pub rate: f64,
}

impl BlackScholes {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Calculate d1 parameter.
    fn d1(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let numerator = (spot / strike).ln() + (self.rate + 0.5 * vol * vol) * time;
        numerator / (vol * time.sqrt())
    }

    /// Calculate d2 parameter.
    fn d2(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        self.d1(spot, strike, time, vol) - vol * time.sqrt()
    }

    /// Standard normal CDF.
    fn norm_cdf(x: f64) -> f64 {
        Normal::standard().cdf(x)
    }

    /// Calculate call option price.
    pub fn call_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        spot * Self::norm_cdf(d1) - strike * (-self.rate * time).exp() * Self::norm_cdf(d2)
    }

    /// Calculate put option price.
    pub fn put_price(&self, spot: f64, strike: f64, time: f64, vol: f64) -> f64 {
        let d1 = self.d1(spot, strike, time, vol);
        let d2 = self.d2(spot, strike, time, vol);

        strike * (-self.rate * time).exp() * Self::norm_cdf(-d2) - spot * Self::norm_cdf(-d1)
    }

    /// Calculate option price based on type.
    pub fn price(&self, spot: f64, strike: f64, time: f64, vol: f64, opt_type: OptionType) -> f64 {
        match opt_type {
            OptionType::Call => self.call_price(spot, strike, time, vol),
            OptionType::Put => self.put_price(spot, strike, time, vol),
        }
    }
}

/// Price one option from its raw numeric kind code (0 = call, 1 = put).
///
/// Unknown codes fail with `InvalidInput` before any arithmetic is done.
pub fn price_with_code(
    kind_code: i64,
    spot: f64,
    strike: f64,
    time: f64,
    vol: f64,
    rate: f64,
) -> PipelineResult<f64> {
    let opt_type = OptionType::try_from(kind_code)?;
    Ok(BlackScholes::new(rate).price(spot, strike, time, vol, opt_type))
}

/// Model price of a single prepared record.
pub fn price_record(record: &OptionRecord) -> f64 {
    BlackScholes::new(record.risk_free_rate).price(
        record.underlying_price,
        record.strike,
        record.time_to_expiry_years,
        record.volatility_estimate,
        record.option_kind,
    )
}

/// Fill `model_price` on every record.
pub fn price_records(records: &mut [OptionRecord]) {
    records.par_iter_mut().for_each(|record| {
        record.model_price = Some(price_record(record));
    });
    debug!("Priced {} records", records.len());
}
