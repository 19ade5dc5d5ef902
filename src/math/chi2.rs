//! Chi-square distribution helpers.
//!
//! `chi2_prob` is the survival function `P(X ≥ chi2)` for `X ~ χ²(ndof)`, the
//! asymptotic p-value of both the nested-model test and the goodness-of-fit test.

use statrs::distribution::{ChiSquared, Continuous, ContinuousCDF};

/// Survival probability of `chi2` under a chi-square with `ndof` degrees of freedom.
///
/// Conventions:
/// - `ndof <= 0` has no distribution and returns `0`
/// - `chi2 <= 0` returns `1` (no improvement at all)
pub fn chi2_prob(chi2: f64, ndof: i64) -> f64 {
    if ndof <= 0 || chi2.is_nan() {
        return 0.0;
    }
    if chi2 <= 0.0 {
        return 1.0;
    }
    match ChiSquared::new(ndof as f64) {
        Ok(dist) => dist.sf(chi2).clamp(0.0, 1.0),
        Err(_) => 0.0,
    }
}

/// Chi-square density, used for the toy-distribution overlays.
pub fn chi2_pdf(x: f64, ndof: i64) -> f64 {
    if ndof <= 0 || x <= 0.0 {
        return 0.0;
    }
    match ChiSquared::new(ndof as f64) {
        Ok(dist) => dist.pdf(x),
        Err(_) => 0.0,
    }
}

/// Central 68.27% Poisson (Garwood) interval around an observed count `n`,
/// returned as `(low_error, high_error)`.
pub fn poisson_errors(n: f64) -> (f64, f64) {
    const ALPHA: f64 = 1.0 - 0.682_689_492_137_086;
    if !(n.is_finite() && n >= 0.0) {
        return (0.0, 0.0);
    }
    let low = if n > 0.0 {
        ChiSquared::new(2.0 * n)
            .map(|d| 0.5 * d.inverse_cdf(0.5 * ALPHA))
            .unwrap_or(n)
    } else {
        0.0
    };
    let high = ChiSquared::new(2.0 * (n + 1.0))
        .map(|d| 0.5 * d.inverse_cdf(1.0 - 0.5 * ALPHA))
        .unwrap_or(n + 1.0);
    (n - low, high - n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survival_matches_reference_values() {
        // χ²(1): P(X ≥ 3.841) ≈ 0.05; χ²(2): P(X ≥ x) = exp(-x/2).
        assert!((chi2_prob(3.841_458_820_694_124, 1) - 0.05).abs() < 1e-7);
        assert!((chi2_prob(4.0, 2) - (-2.0f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn survival_is_non_increasing_in_chi2() {
        for ndof in 1..6 {
            let mut last = 1.0;
            for i in 0..200 {
                let p = chi2_prob(i as f64 * 0.1, ndof);
                assert!(p <= last + 1e-15, "ndof={ndof} i={i}");
                assert!((0.0..=1.0).contains(&p));
                last = p;
            }
        }
    }

    #[test]
    fn poisson_errors_match_tabulated_values() {
        // n = 0: upper limit 1.841; n = 4: interval [2.086, 7.163].
        let (lo, hi) = poisson_errors(0.0);
        assert_eq!(lo, 0.0);
        assert!((hi - 1.841).abs() < 1e-3);
        let (lo, hi) = poisson_errors(4.0);
        assert!((lo - (4.0 - 2.086)).abs() < 1e-3);
        assert!((hi - (7.163 - 4.0)).abs() < 1e-3);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(chi2_prob(2.0, 0), 0.0);
        assert_eq!(chi2_prob(0.0, 3), 1.0);
        assert_eq!(chi2_pdf(-1.0, 2), 0.0);
    }
}
