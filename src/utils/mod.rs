//! Utility functions shared across the crate.
//!
//! - [`arithmetic`] - SQL-compatible rounding and guarded ratios
//! - [`backoff`] - exponential retry delays

mod arithmetic;
mod backoff;

pub use arithmetic::{round_to, rounded_ratio};
pub use backoff::backoff_delay;
