//! Numeric helpers mirroring the warehouse's SQL semantics.

/// `ROUND(numerator / NULLIF(denominator, 0))`: rounds half away from zero,
/// `None` instead of a division by zero.
#[inline]
pub fn rounded_ratio(numerator: u64, denominator: u64) -> Option<i64> {
    if denominator == 0 {
        return None;
    }
    Some((numerator as f64 / denominator as f64).round() as i64)
}

/// `ROUND(value, decimals)`
#[inline]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}
