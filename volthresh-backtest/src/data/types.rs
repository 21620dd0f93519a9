//! Core data types for the options backtest.
//!
//! An [`OptionRecord`] is one observed option quote on one trading day, already
//! joined with the volatility estimate and the reference rate for a single
//! volatility variant.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::backtest::Signal;
use crate::error::PipelineError;

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Intrinsic value at expiry.
    pub fn intrinsic(&self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => (spot - strike).max(0.0),
            Self::Put => (strike - spot).max(0.0),
        }
    }
}

impl FromStr for OptionType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Ok(Self::Call),
            "P" | "PUT" => Ok(Self::Put),
            other => Err(PipelineError::invalid_input(format!(
                "unrecognized option kind '{}'",
                other
            ))),
        }
    }
}

/// Numeric encoding used by upstream frames: 0 = call, 1 = put.
impl TryFrom<i64> for OptionType {
    type Error = PipelineError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Call),
            1 => Ok(Self::Put),
            other => Err(PipelineError::invalid_input(format!(
                "unrecognized option kind code {}",
                other
            ))),
        }
    }
}

/// A single option quote prepared for one volatility variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionRecord {
    /// Trading date of the quote
    pub date: NaiveDate,

    /// Contract code
    pub instrument_id: String,

    /// Observed option close
    pub market_close_price: f64,

    pub option_kind: OptionType,

    /// Underlying price (S0)
    pub underlying_price: f64,

    /// Strike (K)
    pub strike: f64,

    /// Time to expiry in years (T), strictly positive
    pub time_to_expiry_years: f64,

    /// Volatility estimate as a decimal (0.20, not 20)
    pub volatility_estimate: f64,

    /// Short-term reference rate as a decimal
    pub risk_free_rate: f64,

    /// Forward realized return over the record's horizon
    pub realized_return: Option<f64>,

    /// Filled by the pricer.
    #[serde(default)]
    pub model_price: Option<f64>,

    /// Filled by signal generation.
    #[serde(default)]
    pub signal: Option<Signal>,
}

impl OptionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        date: NaiveDate,
        instrument_id: impl Into<String>,
        market_close_price: f64,
        option_kind: OptionType,
        underlying_price: f64,
        strike: f64,
        time_to_expiry_years: f64,
        volatility_estimate: f64,
        risk_free_rate: f64,
        realized_return: Option<f64>,
    ) -> Self {
        Self {
            date,
            instrument_id: instrument_id.into(),
            market_close_price,
            option_kind,
            underlying_price,
            strike,
            time_to_expiry_years,
            volatility_estimate,
            risk_free_rate,
            realized_return,
            model_price: None,
            signal: None,
        }
    }

    /// Check the pricing invariants: T > 0 and sigma > 0, both finite.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.time_to_expiry_years.is_finite() && self.time_to_expiry_years > 0.0) {
            return Err(PipelineError::invalid_input(format!(
                "{} on {}: time to expiry must be positive, got {}",
                self.instrument_id, self.date, self.time_to_expiry_years
            )));
        }
        if !(self.volatility_estimate.is_finite() && self.volatility_estimate > 0.0) {
            return Err(PipelineError::invalid_input(format!(
                "{} on {}: volatility must be positive, got {}",
                self.instrument_id, self.date, self.volatility_estimate
            )));
        }
        Ok(())
    }

    /// True when the realized return is present and not NaN.
    pub fn has_return(&self) -> bool {
        self.realized_return.is_some_and(|r| !r.is_nan())
    }

    /// Signed return of the position implied by the signal.
    ///
    /// `None` until both a realized return and a signal are present.
    pub fn position_return(&self) -> Option<f64> {
        match (self.realized_return, self.signal) {
            (Some(ret), Some(signal)) => Some(ret * signal.as_f64()),
            _ => None,
        }
    }
}
