//! Normal distribution utilities.

/// Natural log of `sqrt(2π)`.
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Log-normalizer of an isotropic `dim`-dimensional normal with scale `sigma`.
///
/// `log Z = dim * (ln(sigma) + ln(sqrt(2π)))`, so that
/// `log N(x; 0, sigma^2 I) = -0.5 * |x|^2 / sigma^2 - log Z`.
///
/// ```
/// use mf_prob::normal::{LN_SQRT_2PI, isotropic_log_normalizer};
///
/// assert_eq!(isotropic_log_normalizer(0, 1e-3), 0.0);
/// assert!((isotropic_log_normalizer(2, 1.0) - 2.0 * LN_SQRT_2PI).abs() < 1e-15);
/// ```
#[inline]
pub fn isotropic_log_normalizer(dim: usize, sigma: f64) -> f64 {
    dim as f64 * (sigma.ln() + LN_SQRT_2PI)
}
