//! Discrete multi-pdf: an ordered set of candidate models with one active index.

use serde::Serialize;

use crate::error::AppError;
use crate::fit::{ParamSnapshot, ParamStore};
use crate::models::{Model, ModelRecord};

/// Envelope of candidate models for one category.
///
/// The index always points at an existing candidate; construction refuses an
/// empty set.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    name: String,
    index_name: String,
    models: Vec<Model>,
    index: usize,
    penalty_factor: f64,
}

/// Serializable view of a candidate set.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSetRecord {
    pub name: String,
    pub index_name: String,
    pub index: usize,
    pub penalty_factor: f64,
    pub candidates: Vec<ModelRecord>,
}

impl CandidateSet {
    pub fn new(
        name: impl Into<String>,
        index_name: impl Into<String>,
        models: Vec<Model>,
        penalty_factor: f64,
    ) -> Result<Self, AppError> {
        let name = name.into();
        if models.is_empty() {
            return Err(AppError::new(3, format!("No envelope candidates for {name}.")));
        }
        Ok(Self {
            name,
            index_name: index_name.into(),
            models,
            index: 0,
            penalty_factor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn select(&mut self, index: usize) -> Result<(), AppError> {
        if index >= self.models.len() {
            return Err(AppError::new(
                4,
                format!("Index {index} out of range for {} ({} candidates).", self.name, self.models.len()),
            ));
        }
        self.index = index;
        Ok(())
    }

    pub fn active(&self) -> &Model {
        &self.models[self.index]
    }

    pub fn active_mut(&mut self) -> &mut Model {
        &mut self.models[self.index]
    }

    /// Complexity penalty added to the active candidate's NLL.
    pub fn correction(&self) -> f64 {
        self.penalty_factor * self.active().param_count() as f64
    }

    pub fn to_record(&self) -> CandidateSetRecord {
        CandidateSetRecord {
            name: self.name.clone(),
            index_name: self.index_name.clone(),
            index: self.index,
            penalty_factor: self.penalty_factor,
            candidates: self.models.iter().map(Model::to_record).collect(),
        }
    }
}

/// All candidates' parameters, concatenated in candidate order.
impl ParamStore for CandidateSet {
    fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot::new(
            self.models
                .iter()
                .flat_map(|m| m.params().iter().copied())
                .collect(),
        )
    }

    fn restore(&mut self, snapshot: &ParamSnapshot) {
        let mut offset = 0;
        for m in &mut self.models {
            let n = m.param_count();
            if let Some(values) = snapshot.values().get(offset..offset + n) {
                m.set_params(values);
            }
            offset += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FunctionFamily, Observable};

    fn models() -> Vec<Model> {
        let obs = Observable::new("m", 110.0, 170.0);
        vec![
            Model::new("env_pdf_cat0_13TeV_bern2", FunctionFamily::Bernstein, 2, &obs, vec![0.1, 0.2]),
            Model::new("env_pdf_cat0_13TeV_exp3", FunctionFamily::Exponential, 3, &obs, vec![-0.1, 0.5, -0.2]),
        ]
    }

    #[test]
    fn empty_set_is_rejected() {
        let err = CandidateSet::new("CMS_higgs_cat0_13TeV_bkgshape", "pdfindex_cat0_13TeV", Vec::new(), 0.5)
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn out_of_range_index_keeps_selection() {
        let mut set = CandidateSet::new("s", "i", models(), 0.5).unwrap();
        set.select(1).unwrap();
        assert!(set.select(2).is_err());
        assert_eq!(set.index(), 1);
        assert_eq!(set.correction(), 1.5);
    }

    #[test]
    fn snapshot_covers_every_candidate() {
        let mut set = CandidateSet::new("s", "i", models(), 0.5).unwrap();
        let snap = set.snapshot();
        assert_eq!(snap.values().len(), 5);

        set.active_mut().set_params(&[7.0, 7.0]);
        set.select(1).unwrap();
        set.active_mut().set_params(&[8.0, 8.0, 8.0]);
        set.restore(&snap);
        assert_eq!(set.models()[0].params(), &[0.1, 0.2]);
        assert_eq!(set.models()[1].params(), &[-0.1, 0.5, -0.2]);
    }
}
