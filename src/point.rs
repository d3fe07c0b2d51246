//! Phase-space state shared by the Hamiltonian samplers.

use ndarray::Array1;

/// A point in phase space: position `q`, momentum `p`, and the cached
/// potential energy `v = -log π(q)` with its gradient `g = ∂v/∂q`.
///
/// All buffers are sized once at construction. Samplers mutate the point in
/// place; a rejected trajectory is rolled back from a value copy taken at
/// trajectory start.
#[derive(Debug, Clone, PartialEq)]
pub struct PhasePoint {
    pub q: Array1<f64>,
    pub p: Array1<f64>,
    pub v: f64,
    pub g: Array1<f64>,
}

impl PhasePoint {
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "dimension must be positive");
        Self {
            q: Array1::zeros(dim),
            p: Array1::zeros(dim),
            v: 0.0,
            g: Array1::zeros(dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.q.len()
    }
}
