//! Small bounded-signal helpers shared by TS/OX/DX/EDX, in the same spirit
//! as the teacher's free-function statistical utilities: no state, no
//! side effects, clamped output.

#[inline]
pub fn clamp01(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

/// Logistic sigmoid: 1 / (1 + e^(-k*x)).
#[inline]
pub fn sigmoid(x: f64, k: f64) -> f64 {
    if !x.is_finite() {
        return 0.5;
    }
    1.0 / (1.0 + (-k * x).exp())
}

#[inline]
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Simple returns over a slice of prices, oldest-to-newest.
pub fn returns(prices: &[f64]) -> Vec<f64> {
    if prices.len() < 2 {
        return vec![];
    }
    prices
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sigmoid_at_zero_is_half() {
        assert_relative_eq!(sigmoid(0.0, 0.5), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn clamp01_clips_out_of_range() {
        assert_relative_eq!(clamp01(1.5), 1.0);
        assert_relative_eq!(clamp01(-0.3), 0.0);
    }
}
