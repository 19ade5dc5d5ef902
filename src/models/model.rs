//! Candidate background model: a named family/order with a mutable parameter vector.

use serde::Serialize;

use crate::domain::{BinnedDataset, FunctionFamily, Observable};
use crate::models::shape::ShapeSpec;

/// A candidate background pdf.
///
/// The parameter vector is the only mutable state; whoever holds `&mut Model`
/// owns the snapshot/restore discipline for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    spec: ShapeSpec,
    params: Vec<f64>,
}

/// Serializable view of a model for the output container.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRecord {
    pub name: String,
    pub family: FunctionFamily,
    pub order: u32,
    pub params: Vec<f64>,
}

impl Model {
    /// Build a model; `params` must have `order` entries.
    pub fn new(
        name: impl Into<String>,
        family: FunctionFamily,
        order: u32,
        observable: &Observable,
        params: Vec<f64>,
    ) -> Self {
        let spec = ShapeSpec {
            family,
            order,
            low: observable.low,
            high: observable.high,
        };
        debug_assert_eq!(params.len(), spec.param_count());
        Self {
            name: name.into(),
            spec,
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> FunctionFamily {
        self.spec.family
    }

    pub fn order(&self) -> u32 {
        self.spec.order
    }

    pub fn spec(&self) -> &ShapeSpec {
        &self.spec
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Overwrite the parameter values (the layout never changes).
    pub fn set_params(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.params.len());
        for (dst, src) in self.params.iter_mut().zip(values) {
            *dst = *src;
        }
    }

    /// Number of floating shape parameters.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn bin_probabilities(&self, data: &BinnedDataset) -> Option<Vec<f64>> {
        self.spec.bin_probabilities(&self.params, data)
    }

    /// Expected counts per bin for a total yield `total`.
    pub fn expected_counts(&self, data: &BinnedDataset, total: f64) -> Option<Vec<f64>> {
        self.bin_probabilities(data)
            .map(|p| p.into_iter().map(|v| v * total).collect())
    }

    /// Sampled curve `(x, y)` of the normalized density scaled by `scale`.
    ///
    /// With `scale = total × bin_width` the curve overlays a histogram of the data.
    pub fn curve(&self, points: usize, scale: f64) -> Vec<(f64, f64)> {
        let points = points.max(2);
        let norm = self.spec.integral(&self.params);
        if !(norm.is_finite() && norm > 0.0) {
            return Vec::new();
        }
        (0..points)
            .map(|i| {
                let u = i as f64 / (points as f64 - 1.0);
                let x = self.spec.low + u * (self.spec.high - self.spec.low);
                (x, scale * self.spec.value(&self.params, x) / norm)
            })
            .collect()
    }

    pub fn to_record(&self) -> ModelRecord {
        ModelRecord {
            name: self.name.clone(),
            family: self.spec.family,
            order: self.spec.order,
            params: self.params.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs() -> Observable {
        Observable::new("m", 110.0, 170.0)
    }

    #[test]
    fn expected_counts_preserve_total() {
        let m = Model::new("env_pdf_cat0_13TeV_exp1", FunctionFamily::Exponential, 1, &obs(), vec![-0.04]);
        let data = BinnedDataset::from_counts("d", 110.0, 170.0, vec![0.0; 60]);
        let e = m.expected_counts(&data, 500.0).unwrap();
        assert!((e.iter().sum::<f64>() - 500.0).abs() < 1e-6);
        assert!(e[0] > e[59]);
    }

    #[test]
    fn curve_integrates_to_scale() {
        let m = Model::new("b", FunctionFamily::Bernstein, 2, &obs(), vec![0.7, 0.3]);
        let c = m.curve(601, 1.0);
        let h = 60.0 / 600.0;
        let trapezoid: f64 = c.windows(2).map(|w| 0.5 * (w[0].1 + w[1].1) * h).sum();
        assert!((trapezoid - 1.0).abs() < 1e-4);
    }
}
