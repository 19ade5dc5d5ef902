//! Model builders.
//!
//! The order search never constructs shapes itself: it asks a [`ModelBuilder`]
//! for `(family, order)` and treats `None` as "this order does not exist for
//! this family, try the next one".

use crate::domain::{FunctionFamily, Observable};
use crate::models::model::Model;

/// Builds candidate models on demand.
pub trait ModelBuilder {
    /// Build a model named `<prefix>_<tag><order>`, or `None` if the family
    /// rejects this order.
    fn build(&self, family: FunctionFamily, order: u32, prefix: &str) -> Option<Model>;
}

/// Builder for the five standard families over one observable.
///
/// Orders outside [`FunctionFamily::accepts_order`] have no parameter layout
/// and are never built. An extra order rule can narrow the search further.
pub struct StandardBuilder {
    observable: Observable,
    accepts: fn(FunctionFamily, u32) -> bool,
}

impl StandardBuilder {
    pub fn new(observable: Observable) -> Self {
        Self {
            observable,
            accepts: |_, _| true,
        }
    }

    pub fn with_order_rule(mut self, accepts: fn(FunctionFamily, u32) -> bool) -> Self {
        self.accepts = accepts;
        self
    }
}

impl ModelBuilder for StandardBuilder {
    fn build(&self, family: FunctionFamily, order: u32, prefix: &str) -> Option<Model> {
        if !family.accepts_order(order) || !(self.accepts)(family, order) {
            return None;
        }
        let name = format!("{prefix}_{}{order}", family.model_tag());
        Some(Model::new(
            name,
            family,
            order,
            &self.observable,
            initial_params(family, order),
        ))
    }
}

/// Starting point for the minimiser: a gently falling spectrum.
fn initial_params(family: FunctionFamily, order: u32) -> Vec<f64> {
    let n = order as usize;
    match family {
        FunctionFamily::Bernstein => (0..n).map(|i| (1.0 / (i as f64 + 2.0)).sqrt()).collect(),
        FunctionFamily::Chebyshev => (0..n).map(|i| if i == 0 { -0.3 } else { 0.0 }).collect(),
        FunctionFamily::Exponential => term_params(n, |j| -0.02 * (j as f64 + 1.0)),
        FunctionFamily::PowerLaw => term_params(n, |j| -2.0 - 2.0 * j as f64),
        FunctionFamily::Laurent => vec![0.5; n],
    }
}

/// `[p_0, f_1, p_1, ...]` with fractions starting at 0.5.
fn term_params(n: usize, exponent: impl Fn(usize) -> f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(n);
    out.push(exponent(0));
    let mut j = 1;
    while out.len() < n {
        out.push(0.5);
        out.push(exponent(j));
        j += 1;
    }
    out.truncate(n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> StandardBuilder {
        StandardBuilder::new(Observable::new("CMS_higgs_mass", 110.0, 170.0))
    }

    #[test]
    fn names_follow_prefix_tag_order() {
        let m = builder()
            .build(FunctionFamily::PowerLaw, 3, "ftest_pdf_cat0_13TeV")
            .unwrap();
        assert_eq!(m.name(), "ftest_pdf_cat0_13TeV_pow3");
        assert_eq!(m.param_count(), 3);
    }

    #[test]
    fn even_exponential_orders_are_refused() {
        assert!(builder().build(FunctionFamily::Exponential, 2, "p").is_none());
        assert!(builder().build(FunctionFamily::Exponential, 5, "p").is_some());
    }

    #[test]
    fn order_rule_narrows_but_cannot_add_even_term_sums() {
        let b = builder().with_order_rule(|_, order| order <= 2);
        assert!(b.build(FunctionFamily::Bernstein, 2, "p").is_some());
        assert!(b.build(FunctionFamily::Bernstein, 3, "p").is_none());
        assert!(b.build(FunctionFamily::Exponential, 1, "p").is_some());

        let permissive = builder().with_order_rule(|_, _| true);
        for family in [FunctionFamily::Exponential, FunctionFamily::PowerLaw] {
            assert!(permissive.build(family, 2, "p").is_none(), "{family}");
            assert!(permissive.build(family, 4, "p").is_none(), "{family}");
        }
    }

    #[test]
    fn every_family_builds_the_right_parameter_count() {
        for family in [
            FunctionFamily::Bernstein,
            FunctionFamily::Chebyshev,
            FunctionFamily::Exponential,
            FunctionFamily::PowerLaw,
            FunctionFamily::Laurent,
        ] {
            for order in 1..=6 {
                if let Some(m) = builder().build(family, order, "p") {
                    assert_eq!(m.param_count(), order as usize, "{family}{order}");
                }
            }
        }
    }
}
