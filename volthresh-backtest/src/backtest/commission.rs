//! Commission model for the daily return stream.
//!
//! The cost is a flat drag subtracted from every day's portfolio return,
//! whether or not any position was open that day.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Flat per-period commission, in return units (0.0005 = 5 bp per day).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommissionModel {
    pub per_period: f64,
}

impl Default for CommissionModel {
    fn default() -> Self {
        Self { per_period: 0.0 }
    }
}

impl CommissionModel {
    pub fn new(per_period: f64) -> PipelineResult<Self> {
        if !per_period.is_finite() {
            return Err(PipelineError::config(format!(
                "commission must be finite, got {}",
                per_period
            )));
        }
        Ok(Self { per_period })
    }

    /// Create a zero-commission model.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Net daily return after commission.
    pub fn apply(&self, gross_return: f64) -> f64 {
        gross_return - self.per_period
    }
}
