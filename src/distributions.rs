/*!
Model contract for gradient-based inference, plus Gaussian targets.

This module is the seam between the inference engines and the probabilistic
model. A [`Model`] exposes its unnormalized log density over the continuous
parameters together with the gradient of that log density, written into a
caller-provided buffer. The samplers in [`crate::hmc`] and [`crate::nuts`]
and the variational engine in [`crate::variational`] consume nothing else.

A model signals an unevaluable point (out-of-support input, non-finite
intermediate) with a [`ModelError`]. How that error is absorbed depends on
the engine: the Hamiltonian samplers treat it as a rejection, the ELBO
estimator drops the draw and keeps count.

## Example

```rust
use gradient_inference::distributions::{DiagGaussian, Model};
use ndarray::{arr1, Array1};

let target = DiagGaussian::new(arr1(&[1.0, -1.0]), arr1(&[1.0, 4.0]));
let q = arr1(&[0.0, 0.0]);
let mut grad = Array1::zeros(2);
let logp = target.log_prob_grad(&q.view(), &mut grad).unwrap();
assert!(logp < 0.0);
assert_eq!(grad[0], 1.0);
```
*/

use ndarray::{Array1, ArrayView1};
use std::error::Error;
use std::fmt;

/// Error raised by a model when the log density or its gradient cannot be
/// evaluated at a point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelError {
    what: String,
}

impl ModelError {
    pub fn new(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model evaluation failed: {}", self.what)
    }
}

impl Error for ModelError {}

/// A differentiable target density over continuous parameters.
///
/// Log densities may drop additive constants; the engines only ever compare
/// or differentiate them.
pub trait Model {
    /// Number of continuous parameters.
    fn num_params_r(&self) -> usize;

    /// Log density `log π(q)`.
    ///
    /// Returns a [`ModelError`] when `q` lies outside the model's support or
    /// the evaluation produces an invalid intermediate.
    fn log_prob(&self, q: &ArrayView1<f64>) -> Result<f64, ModelError>;

    /// Log density and its gradient; writes `∇_q log π(q)` into `grad`.
    ///
    /// `grad` must have length [`Model::num_params_r`]. No allocation beyond
    /// what the model itself performs.
    fn log_prob_grad(
        &self,
        q: &ArrayView1<f64>,
        grad: &mut Array1<f64>,
    ) -> Result<f64, ModelError>;
}

/// Standard normal target in `dim` dimensions.
#[derive(Debug, Clone)]
pub struct StdNormal {
    dim: usize,
}

impl StdNormal {
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "dimension must be positive");
        Self { dim }
    }
}

impl Model for StdNormal {
    fn num_params_r(&self) -> usize {
        self.dim
    }

    fn log_prob(&self, q: &ArrayView1<f64>) -> Result<f64, ModelError> {
        Ok(-0.5 * q.dot(q))
    }

    fn log_prob_grad(
        &self,
        q: &ArrayView1<f64>,
        grad: &mut Array1<f64>,
    ) -> Result<f64, ModelError> {
        grad.zip_mut_with(q, |g, &x| *g = -x);
        Ok(-0.5 * q.dot(q))
    }
}

/// Independent Gaussian target with per-axis mean and variance.
#[derive(Debug, Clone)]
pub struct DiagGaussian {
    mean: Array1<f64>,
    var: Array1<f64>,
}

impl DiagGaussian {
    /// # Panics
    /// Panics if the lengths differ or any variance is not strictly positive.
    pub fn new(mean: Array1<f64>, var: Array1<f64>) -> Self {
        assert_eq!(mean.len(), var.len(), "mean and variance lengths differ");
        assert!(
            var.iter().all(|&v| v > 0.0 && v.is_finite()),
            "variances must be positive and finite"
        );
        Self { mean, var }
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn var(&self) -> &Array1<f64> {
        &self.var
    }
}

impl Model for DiagGaussian {
    fn num_params_r(&self) -> usize {
        self.mean.len()
    }

    fn log_prob(&self, q: &ArrayView1<f64>) -> Result<f64, ModelError> {
        let mut lp = 0.0;
        for i in 0..self.mean.len() {
            let d = q[i] - self.mean[i];
            lp -= 0.5 * d * d / self.var[i];
        }
        Ok(lp)
    }

    fn log_prob_grad(
        &self,
        q: &ArrayView1<f64>,
        grad: &mut Array1<f64>,
    ) -> Result<f64, ModelError> {
        let mut lp = 0.0;
        for i in 0..self.mean.len() {
            let d = q[i] - self.mean[i];
            lp -= 0.5 * d * d / self.var[i];
            grad[i] = -d / self.var[i];
        }
        Ok(lp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn std_normal_gradient_points_to_origin() {
        let target = StdNormal::new(3);
        let q = arr1(&[1.0, -2.0, 0.5]);
        let mut grad = Array1::zeros(3);
        let lp = target.log_prob_grad(&q.view(), &mut grad).unwrap();
        assert_eq!(lp, target.log_prob(&q.view()).unwrap());
        assert_eq!(grad, arr1(&[-1.0, 2.0, -0.5]));
    }

    #[test]
    fn diag_gaussian_peaks_at_mean() {
        let target = DiagGaussian::new(arr1(&[1.0, -1.0]), arr1(&[1.0, 4.0]));
        let at_mean = target.log_prob(&arr1(&[1.0, -1.0]).view()).unwrap();
        let away = target.log_prob(&arr1(&[2.0, 0.0]).view()).unwrap();
        assert!(at_mean > away);

        let mut grad = Array1::zeros(2);
        target
            .log_prob_grad(&arr1(&[1.0, -1.0]).view(), &mut grad)
            .unwrap();
        assert_eq!(grad, arr1(&[0.0, 0.0]));
    }

    #[test]
    #[should_panic(expected = "variances must be positive")]
    fn diag_gaussian_rejects_nonpositive_variance() {
        DiagGaussian::new(arr1(&[0.0]), arr1(&[0.0]));
    }
}
