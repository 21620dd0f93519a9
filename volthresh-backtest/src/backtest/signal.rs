//! Mispricing signal.
//!
//! A record goes long when the model price exceeds the market close by more
//! than the threshold, short when it falls below by more than the threshold,
//! and stays flat inside the band `[(1 - thr) * close, (1 + thr) * close]`.

use serde::{Deserialize, Serialize};

use crate::data::OptionRecord;
use crate::error::{PipelineError, PipelineResult};

/// Discrete position signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Flat,
    Short,
}

impl Signal {
    /// Compare a model price against the market close.
    pub fn from_mispricing(model_price: f64, market_close: f64, threshold: f64) -> Self {
        if model_price > (1.0 + threshold) * market_close {
            Self::Long
        } else if model_price < (1.0 - threshold) * market_close {
            Self::Short
        } else {
            Self::Flat
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Flat => 0.0,
            Self::Short => -1.0,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Flat)
    }
}

pub fn check_threshold(threshold: f64) -> PipelineResult<()> {
    if !threshold.is_finite() {
        return Err(PipelineError::config(format!(
            "threshold must be finite, got {}",
            threshold
        )));
    }
    Ok(())
}

/// Fill `signal` on every priced record.
///
/// Every record must carry a model price; an unpriced record is reported as
/// `InvalidInput` and no signal is written for the slice.
pub fn generate_signals(records: &mut [OptionRecord], threshold: f64) -> PipelineResult<()> {
    check_threshold(threshold)?;

    if let Some(unpriced) = records.iter().find(|r| r.model_price.is_none()) {
        return Err(PipelineError::invalid_input(format!(
            "{} on {} has no model price",
            unpriced.instrument_id, unpriced.date
        )));
    }

    for record in records.iter_mut() {
        if let Some(model_price) = record.model_price {
            record.signal = Some(Signal::from_mispricing(
                model_price,
                record.market_close_price,
                threshold,
            ));
        }
    }

    Ok(())
}
