//! Option pricing.
//!
//! Closed-form Black-Scholes-Merton valuation of European calls and puts,
//! applied record-by-record to a prepared dataset.

pub mod black_scholes;

pub use black_scholes::{price_record, price_records, price_with_code, BlackScholes};
