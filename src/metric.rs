//! Mass metrics and the Euclidean Hamiltonian built on top of them.
//!
//! A [`Metric`] fixes the kinetic-energy geometry `T(p) = ½ pᵀ M⁻¹ p` seen by
//! the samplers. The inverse mass matrix is what both the kinetic energy and
//! the leapfrog drift need, so that is what each variant stores; the dense
//! variant additionally keeps the lower Cholesky factor of `M⁻¹` for momentum
//! sampling. A [`Hamiltonian`] pairs a metric with a borrowed [`Model`] and
//! caches the potential energy and its gradient into the [`PhasePoint`].

use crate::distributions::Model;
use crate::io::MetricWriter;
use crate::point::PhasePoint;
use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Mass metric for a Euclidean Hamiltonian.
#[derive(Debug, Clone)]
pub enum Metric {
    /// Implicit identity mass matrix.
    Unit { dim: usize },
    /// Positive diagonal of the inverse mass matrix.
    Diag { inv_mass: Array1<f64> },
    /// Symmetric positive-definite inverse mass matrix together with its
    /// lower Cholesky factor (`inv_mass = chol · cholᵀ`).
    Dense {
        inv_mass: Array2<f64>,
        chol: Array2<f64>,
    },
}

impl Metric {
    pub fn unit(dim: usize) -> Self {
        assert!(dim > 0, "dimension must be positive");
        Self::Unit { dim }
    }

    /// # Panics
    /// Panics unless every diagonal entry is strictly positive and finite.
    pub fn diag(inv_mass: Array1<f64>) -> Self {
        assert!(!inv_mass.is_empty(), "dimension must be positive");
        assert!(
            inv_mass.iter().all(|&m| m > 0.0 && m.is_finite()),
            "inverse mass diagonal must be positive and finite"
        );
        Self::Diag { inv_mass }
    }

    /// # Panics
    /// Panics unless `inv_mass` is square, symmetric, and positive-definite.
    pub fn dense(inv_mass: Array2<f64>) -> Self {
        let (rows, cols) = inv_mass.dim();
        assert_eq!(rows, cols, "inverse mass matrix must be square");
        assert!(rows > 0, "dimension must be positive");
        for i in 0..rows {
            for j in (i + 1)..cols {
                assert!(
                    (inv_mass[[i, j]] - inv_mass[[j, i]]).abs()
                        <= 1e-12 * inv_mass[[i, i]].abs().max(1.0),
                    "inverse mass matrix must be symmetric"
                );
            }
        }
        let chol = cholesky_spd(&inv_mass)
            .expect("inverse mass matrix must be positive-definite");
        Self::Dense { inv_mass, chol }
    }

    pub fn dim(&self) -> usize {
        match self {
            Self::Unit { dim } => *dim,
            Self::Diag { inv_mass } => inv_mass.len(),
            Self::Dense { inv_mass, .. } => inv_mass.nrows(),
        }
    }

    /// Draws a momentum from the metric's kinetic distribution into `p`.
    ///
    /// Unit: `p ~ N(0, I)`. Diag: `pᵢ = zᵢ / √(m⁻¹ᵢ)`. Dense: draw
    /// `z ~ N(0, I)` and back-substitute `cholᵀ p = z`, so `E[p pᵀ] = M`.
    pub fn sample_p(&self, p: &mut Array1<f64>, rng: &mut SmallRng) {
        for v in p.iter_mut() {
            *v = rng.sample(StandardNormal);
        }
        match self {
            Self::Unit { .. } => {}
            Self::Diag { inv_mass } => {
                p.zip_mut_with(inv_mass, |pi, &mi| *pi /= mi.sqrt());
            }
            Self::Dense { chol, .. } => {
                let n = chol.nrows();
                for i in (0..n).rev() {
                    let mut rhs = p[i];
                    for k in (i + 1)..n {
                        rhs -= chol[[k, i]] * p[k];
                    }
                    p[i] = rhs / chol[[i, i]];
                }
            }
        }
    }

    /// Kinetic energy `½ pᵀ M⁻¹ p`.
    pub fn kinetic(&self, p: &Array1<f64>) -> f64 {
        match self {
            Self::Unit { .. } => 0.5 * p.dot(p),
            Self::Diag { inv_mass } => {
                let mut t = 0.0;
                for i in 0..p.len() {
                    t += inv_mass[i] * p[i] * p[i];
                }
                0.5 * t
            }
            Self::Dense { inv_mass, .. } => {
                let mut t = 0.0;
                for i in 0..p.len() {
                    let mut row = 0.0;
                    for j in 0..p.len() {
                        row += inv_mass[[i, j]] * p[j];
                    }
                    t += p[i] * row;
                }
                0.5 * t
            }
        }
    }

    /// Writes `M⁻¹ p` into `out`.
    pub fn mul_inv_mass(&self, p: &Array1<f64>, out: &mut Array1<f64>) {
        match self {
            Self::Unit { .. } => out.assign(p),
            Self::Diag { inv_mass } => {
                for i in 0..p.len() {
                    out[i] = inv_mass[i] * p[i];
                }
            }
            Self::Dense { inv_mass, .. } => {
                for i in 0..p.len() {
                    let mut acc = 0.0;
                    for j in 0..p.len() {
                        acc += inv_mass[[i, j]] * p[j];
                    }
                    out[i] = acc;
                }
            }
        }
    }

    /// Accumulates the leapfrog drift `q += ε · M⁻¹ p` in place.
    pub(crate) fn drift(&self, q: &mut Array1<f64>, p: &Array1<f64>, epsilon: f64) {
        match self {
            Self::Unit { .. } => {
                q.zip_mut_with(p, |qi, &pi| *qi += epsilon * pi);
            }
            Self::Diag { inv_mass } => {
                for i in 0..p.len() {
                    q[i] += epsilon * inv_mass[i] * p[i];
                }
            }
            Self::Dense { inv_mass, .. } => {
                for i in 0..p.len() {
                    let mut acc = 0.0;
                    for j in 0..p.len() {
                        acc += inv_mass[[i, j]] * p[j];
                    }
                    q[i] += epsilon * acc;
                }
            }
        }
    }

    /// Inner product `(M⁻¹ p) · w`, the pairing of a momentum with a
    /// tangent vector in the metric's dual.
    pub fn dual_dot(&self, p: &Array1<f64>, w: &Array1<f64>) -> f64 {
        match self {
            Self::Unit { .. } => p.dot(w),
            Self::Diag { inv_mass } => {
                let mut acc = 0.0;
                for i in 0..p.len() {
                    acc += inv_mass[i] * p[i] * w[i];
                }
                acc
            }
            Self::Dense { inv_mass, .. } => {
                let mut acc = 0.0;
                for i in 0..p.len() {
                    let mut row = 0.0;
                    for j in 0..p.len() {
                        row += inv_mass[[i, j]] * p[j];
                    }
                    acc += row * w[i];
                }
                acc
            }
        }
    }

    /// Describes the metric through a [`MetricWriter`].
    pub fn write_metric(&self, writer: &mut dyn MetricWriter) {
        match self {
            Self::Unit { .. } => {
                writer.comment("No free parameters for unit metric");
            }
            Self::Diag { inv_mass } => {
                writer.comment("Diagonal elements of inverse mass matrix:");
                writer.vector("M_inv", &inv_mass.view());
            }
            Self::Dense { inv_mass, .. } => {
                writer.comment("Elements of inverse mass matrix:");
                writer.matrix("M_inv", &inv_mass.view());
            }
        }
    }
}

/// Cholesky factorization of a symmetric positive-definite matrix.
/// Returns the lower factor, or `None` if the matrix is not SPD.
fn cholesky_spd(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                let d = l[[j, j]];
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[[i, j]] = sum / d;
            }
        }
    }
    Some(l)
}

/// Euclidean Hamiltonian `H(z) = T(p) + V(q)` over a borrowed model.
///
/// `V = -log π` and its gradient are evaluated through the model and cached
/// into the point by [`Hamiltonian::init`]; a failed or non-finite
/// evaluation caches `V = +∞`, which every transition treats as a rejection.
pub struct Hamiltonian<'a, M: Model> {
    model: &'a M,
    metric: Metric,
}

impl<'a, M: Model> Hamiltonian<'a, M> {
    /// # Panics
    /// Panics if the metric dimension differs from the model's.
    pub fn new(model: &'a M, metric: Metric) -> Self {
        assert_eq!(
            metric.dim(),
            model.num_params_r(),
            "metric dimension must match the model"
        );
        Self { model, metric }
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    pub fn model(&self) -> &M {
        self.model
    }

    /// Resamples the momentum of `z` from the metric's kinetic distribution.
    pub fn sample_p(&self, z: &mut PhasePoint, rng: &mut SmallRng) {
        self.metric.sample_p(&mut z.p, rng);
    }

    /// Kinetic energy `T(p)`.
    pub fn t(&self, z: &PhasePoint) -> f64 {
        self.metric.kinetic(&z.p)
    }

    /// Potential energy `V(q) = -log π(q)`, as cached by [`Hamiltonian::init`].
    pub fn v(&self, z: &PhasePoint) -> f64 {
        z.v
    }

    /// Total energy `H(z) = T(z) + V(z)`.
    pub fn h(&self, z: &PhasePoint) -> f64 {
        self.t(z) + z.v
    }

    /// Writes `∂T/∂p = M⁻¹ p` into `out`.
    pub fn dtau_dp(&self, z: &PhasePoint, out: &mut Array1<f64>) {
        self.metric.mul_inv_mass(&z.p, out);
    }

    /// `∂T/∂q`, identically zero for Euclidean metrics.
    pub fn dtau_dq(&self, _z: &PhasePoint, out: &mut Array1<f64>) {
        out.fill(0.0);
    }

    /// Writes `∂V/∂q` into `out`, as cached by [`Hamiltonian::init`].
    pub fn dphi_dq(&self, z: &PhasePoint, out: &mut Array1<f64>) {
        out.assign(&z.g);
    }

    /// Accumulates the drift `q += ε · ∂T/∂p` in place.
    pub(crate) fn drift(&self, z: &mut PhasePoint, epsilon: f64) {
        self.metric.drift(&mut z.q, &z.p, epsilon);
    }

    /// Evaluates the potential and its gradient at `z.q`, caching both into
    /// the point. Caches `V = +∞` when the model raises a domain error or
    /// produces non-finite values.
    pub fn init(&self, z: &mut PhasePoint) {
        match self.model.log_prob_grad(&z.q.view(), &mut z.g) {
            Ok(logp) if logp.is_finite() => {
                z.v = -logp;
                // g caches ∂V/∂q = -∇ log π
                z.g.mapv_inplace(|x| -x);
                if z.g.iter().any(|x| !x.is_finite()) {
                    z.v = f64::INFINITY;
                }
            }
            _ => {
                z.v = f64::INFINITY;
            }
        }
    }
}
