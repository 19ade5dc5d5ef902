//! Shape evaluation for the five background families.
//!
//! The fit engine relies on two primitive operations:
//! - evaluate the (unnormalized) shape `f(x; θ)` for a parameter vector
//! - integrate it over the bins of a dataset to get bin probabilities
//!
//! Parameter layouts (`n` = order):
//!
//! - Bernstein:   `[c_1..c_n]`, coefficient `c_0 = 1` fixed, `c_i → c_i²`
//! - Chebyshev:   `[a_1..a_n]`, `f = 1 + Σ a_k T_k(v)`, clipped at 0
//! - Exponential: `[p_0, f_1, p_1, ..]`, `f = e^{p_0 t} + Σ f_j² e^{p_j t}`, `t = x - low`
//! - PowerLaw:    `[p_0, f_1, p_1, ..]`, `f = s^{p_0} + Σ f_j² s^{p_j}`, `s = x / low`
//! - Laurent:     `[c_1..c_n]`, `f = s^{g_0} + Σ c_j² s^{g_j}`, `g = -4, -5, -3, -6, -2, ..`
//!
//! Squared coefficients keep every family except Chebyshev non-negative
//! without bounded minimisation.

use crate::domain::{BinnedDataset, FunctionFamily};
use crate::math::{bernstein_basis, chebyshev, simpson};

/// Smallest bin probability used in the likelihood.
pub const MIN_BIN_PROB: f64 = 1e-12;

/// Panels used when integrating the shape over the whole range.
const RANGE_PANELS: usize = 200;

/// Everything needed to evaluate a family's shape except the parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeSpec {
    pub family: FunctionFamily,
    pub order: u32,
    pub low: f64,
    pub high: f64,
}

impl ShapeSpec {
    /// Number of free parameters a model of this family/order carries.
    pub fn param_count(&self) -> usize {
        self.order as usize
    }

    /// Unnormalized shape value at `x`. Never negative; may be non-finite for
    /// extreme parameters.
    pub fn value(&self, params: &[f64], x: f64) -> f64 {
        let v = match self.family {
            FunctionFamily::Bernstein => self.bernstein(params, x),
            FunctionFamily::Chebyshev => self.chebyshev(params, x),
            FunctionFamily::Exponential => {
                let t = x - self.low;
                sum_of_terms(params, |p| (p * t).exp())
            }
            FunctionFamily::PowerLaw => {
                let s = x / self.low;
                sum_of_terms(params, |p| s.powf(p))
            }
            FunctionFamily::Laurent => self.laurent(params, x),
        };
        if v.is_nan() { v } else { v.max(0.0) }
    }

    /// Normalized probability per bin of `data`'s binning.
    ///
    /// Returns `None` when the shape integrates to zero or a non-finite value.
    pub fn bin_probabilities(&self, params: &[f64], data: &BinnedDataset) -> Option<Vec<f64>> {
        let mut integrals = Vec::with_capacity(data.nbins());
        for i in 0..data.nbins() {
            let (a, b) = data.bin_edges(i);
            integrals.push(simpson(a, b, |x| self.value(params, x)));
        }
        let total: f64 = integrals.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return None;
        }
        Some(
            integrals
                .into_iter()
                .map(|v| (v / total).max(MIN_BIN_PROB))
                .collect(),
        )
    }

    /// Integral of the shape over the full observable range.
    pub fn integral(&self, params: &[f64]) -> f64 {
        let h = (self.high - self.low) / RANGE_PANELS as f64;
        (0..RANGE_PANELS)
            .map(|i| {
                let a = self.low + h * i as f64;
                simpson(a, a + h, |x| self.value(params, x))
            })
            .sum()
    }

    fn bernstein(&self, params: &[f64], x: f64) -> f64 {
        let u = (x - self.low) / (self.high - self.low);
        let mut basis = Vec::with_capacity(params.len() + 1);
        bernstein_basis(params.len(), u, &mut basis);
        basis[0]
            + params
                .iter()
                .zip(basis.iter().skip(1))
                .map(|(c, b)| c * c * b)
                .sum::<f64>()
    }

    fn chebyshev(&self, params: &[f64], x: f64) -> f64 {
        let v = 2.0 * (x - self.low) / (self.high - self.low) - 1.0;
        1.0 + params
            .iter()
            .enumerate()
            .map(|(k, a)| a * chebyshev(k + 1, v))
            .sum::<f64>()
    }

    fn laurent(&self, params: &[f64], x: f64) -> f64 {
        let s = x / self.low;
        let mut v = s.powi(laurent_power(0));
        for (j, c) in params.iter().enumerate() {
            v += c * c * s.powi(laurent_power(j + 1));
        }
        v
    }
}

/// Exponent of the `j`-th Laurent term: -4, -5, -3, -6, -2, -7, -1, ...
pub fn laurent_power(j: usize) -> i32 {
    let step = j.div_ceil(2) as i32;
    if j % 2 == 1 { -4 - step } else { -4 + step }
}

/// `term(p_0) + Σ_j f_j² term(p_j)` over the `[p_0, f_1, p_1, ...]` layout.
///
/// The layout has odd length; builders never produce even orders for these
/// families.
fn sum_of_terms(params: &[f64], term: impl Fn(f64) -> f64) -> f64 {
    let Some((&p0, rest)) = params.split_first() else {
        return 0.0;
    };
    let mut v = term(p0);
    for pair in rest.chunks_exact(2) {
        v += pair[0] * pair[0] * term(pair[1]);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(family: FunctionFamily, order: u32) -> ShapeSpec {
        ShapeSpec {
            family,
            order,
            low: 110.0,
            high: 170.0,
        }
    }

    fn flat_data() -> BinnedDataset {
        BinnedDataset::from_counts("d", 110.0, 170.0, vec![1.0; 60])
    }

    #[test]
    fn laurent_powers_alternate_around_minus_four() {
        let powers: Vec<i32> = (0..7).map(laurent_power).collect();
        assert_eq!(powers, vec![-4, -5, -3, -6, -2, -7, -1]);
    }

    #[test]
    fn bin_probabilities_sum_to_one() {
        let cases = [
            (FunctionFamily::Bernstein, 3, vec![0.8, 0.5, 0.2]),
            (FunctionFamily::Chebyshev, 2, vec![-0.3, 0.05]),
            (FunctionFamily::Exponential, 3, vec![-0.03, 0.5, -0.08]),
            (FunctionFamily::PowerLaw, 1, vec![-4.0]),
            (FunctionFamily::Laurent, 2, vec![0.4, 0.7]),
        ];
        for (family, order, params) in cases {
            let p = spec(family, order).bin_probabilities(&params, &flat_data()).unwrap();
            let total: f64 = p.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "{family}: {total}");
        }
    }

    #[test]
    fn single_exponential_falls_at_the_expected_rate() {
        let s = spec(FunctionFamily::Exponential, 1);
        let ratio = s.value(&[-0.05], 130.0) / s.value(&[-0.05], 110.0);
        assert!((ratio - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn chebyshev_is_clipped_at_zero() {
        let s = spec(FunctionFamily::Chebyshev, 1);
        // 1 + 2 v is negative for v < -0.5.
        assert_eq!(s.value(&[2.0], 110.0), 0.0);
        assert!(s.value(&[2.0], 170.0) > 0.0);
    }

    #[test]
    fn degenerate_shape_has_no_probabilities() {
        let s = spec(FunctionFamily::Exponential, 1);
        assert!(s.bin_probabilities(&[1e6], &flat_data()).is_none());
    }
}
