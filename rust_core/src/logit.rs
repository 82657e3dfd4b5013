//! Log-odds transforms shared by the table, adjustments and mixing engine.

/// Logistic function for probability calculation
#[inline]
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Converts a probability to log-odds.
///
/// Input is clamped away from 0 and 1 so the transform is total.
#[inline]
pub fn prob_to_log_odds(p: f64) -> f64 {
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    (p / (1.0 - p)).ln()
}
