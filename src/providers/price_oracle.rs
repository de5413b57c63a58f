use async_trait::async_trait;

/// Factor that leaves the base amount unchanged.
pub const NEUTRAL_FACTOR: f64 = 1.0;

/// Lowest and highest factor an execution will apply.
pub const MIN_FACTOR: f64 = 0.0;
pub const MAX_FACTOR: f64 = 2.0;

/// Market signal that scales a plan's base amount.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Multiplicative factor for `asset_id`, nominally in `[0, 2]`.
    ///
    /// Never fails: implementations return [`NEUTRAL_FACTOR`] when they
    /// cannot produce a signal.
    async fn get_price_factor(&self, asset_id: &str) -> f64;
}

/// Bring an oracle reading into `[MIN_FACTOR, MAX_FACTOR]`; non-finite values become neutral.
pub fn sanitize_factor(factor: f64) -> f64 {
    if !factor.is_finite() {
        return NEUTRAL_FACTOR;
    }

    factor.clamp(MIN_FACTOR, MAX_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_factor() {
        assert_eq!(sanitize_factor(0.5), 0.5);
        assert_eq!(sanitize_factor(-1.0), 0.0);
        assert_eq!(sanitize_factor(7.0), 2.0);
        assert_eq!(sanitize_factor(f64::NAN), NEUTRAL_FACTOR);
        assert_eq!(sanitize_factor(f64::INFINITY), NEUTRAL_FACTOR);
    }
}
