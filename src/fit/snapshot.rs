//! Parameter snapshots.
//!
//! Every routine that perturbs model parameters (toys, randomized retries,
//! best-index scans) takes a snapshot first and restores it on the way out.
//! [`SnapshotGuard`] makes the restore unconditional: it runs from `Drop`, so
//! early returns and `?` still leave the parameters as they were.

use std::ops::{Deref, DerefMut};

use crate::models::Model;

/// Frozen copy of a parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSnapshot {
    values: Vec<f64>,
}

impl ParamSnapshot {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Anything whose floating parameters can be snapshotted and restored.
pub trait ParamStore {
    fn snapshot(&self) -> ParamSnapshot;
    fn restore(&mut self, snapshot: &ParamSnapshot);
}

impl ParamStore for Model {
    fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot::new(self.params().to_vec())
    }

    fn restore(&mut self, snapshot: &ParamSnapshot) {
        self.set_params(snapshot.values());
    }
}

/// Restores the wrapped store to the snapshot taken at construction when dropped.
pub struct SnapshotGuard<'a, T: ParamStore + ?Sized> {
    target: &'a mut T,
    saved: ParamSnapshot,
}

impl<'a, T: ParamStore + ?Sized> SnapshotGuard<'a, T> {
    pub fn new(target: &'a mut T) -> Self {
        let saved = target.snapshot();
        Self { target, saved }
    }

    /// Put the parameters back without releasing the guard.
    pub fn reset(&mut self) {
        self.target.restore(&self.saved);
    }
}

impl<T: ParamStore + ?Sized> Deref for SnapshotGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: ParamStore + ?Sized> DerefMut for SnapshotGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: ParamStore + ?Sized> Drop for SnapshotGuard<'_, T> {
    fn drop(&mut self) {
        self.target.restore(&self.saved);
    }
}
