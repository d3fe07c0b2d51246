//! Full-rank normal variational family.

use crate::distributions::Model;
use crate::variational::{dropped_eval_limit_err, write_dropped_eval_msg, VariationalFamily};
use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::StandardNormal;
use std::error::Error;
use std::f64::consts::PI;
use std::io::Write;

/// `Q(ζ) = N(ζ | μ, L Lᵀ)`, parameterized by the location `μ` and the
/// lower-triangular Cholesky factor `L` with positive diagonal.
///
/// The upper triangle of `L` is structurally zero and stays zero through the
/// elementwise operations.
#[derive(Debug, Clone, PartialEq)]
pub struct FullRank {
    mu: Array1<f64>,
    l_chol: Array2<f64>,
}

impl FullRank {
    pub fn new(mu: Array1<f64>, l_chol: Array2<f64>) -> Self {
        assert_eq!(l_chol.nrows(), l_chol.ncols(), "Cholesky factor must be square");
        assert_eq!(mu.len(), l_chol.nrows(), "mu and L dimensions differ");
        Self { mu, l_chol }
    }

    pub fn mu(&self) -> &Array1<f64> {
        &self.mu
    }

    pub fn l_chol(&self) -> &Array2<f64> {
        &self.l_chol
    }

    /// Covariance `L Lᵀ`.
    pub fn covariance(&self) -> Array2<f64> {
        let n = self.mu.len();
        let mut cov = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                let mut acc = 0.0;
                for k in 0..=i.min(j) {
                    acc += self.l_chol[[i, k]] * self.l_chol[[j, k]];
                }
                cov[[i, j]] = acc;
            }
        }
        cov
    }
}

impl VariationalFamily for FullRank {
    fn from_initial(mu: &Array1<f64>) -> Self {
        Self {
            mu: mu.clone(),
            l_chol: Array2::eye(mu.len()),
        }
    }

    fn zeros(dim: usize) -> Self {
        Self {
            mu: Array1::zeros(dim),
            l_chol: Array2::zeros((dim, dim)),
        }
    }

    fn dimension(&self) -> usize {
        self.mu.len()
    }

    fn mean(&self) -> Array1<f64> {
        self.mu.clone()
    }

    fn sample(&self, rng: &mut SmallRng, zeta: &mut Array1<f64>) {
        let n = self.mu.len();
        let eta: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
        for i in 0..n {
            let mut acc = self.mu[i];
            for k in 0..=i {
                acc += self.l_chol[[i, k]] * eta[k];
            }
            zeta[i] = acc;
        }
    }

    fn entropy(&self) -> f64 {
        let n = self.mu.len();
        let mut log_det = 0.0;
        for i in 0..n {
            log_det += self.l_chol[[i, i]].abs().ln();
        }
        0.5 * n as f64 * (1.0 + (2.0 * PI).ln()) + log_det
    }

    fn calc_grad<M: Model, W: Write>(
        &self,
        model: &M,
        cont_params: &Array1<f64>,
        n_samples: usize,
        rng: &mut SmallRng,
        mut msgs: Option<&mut W>,
    ) -> Result<Self, Box<dyn Error>> {
        let dim = self.dimension();
        assert_eq!(
            dim,
            cont_params.len(),
            "family dimension must match the model's continuous parameters"
        );

        let mut grad_mu = Array1::<f64>::zeros(dim);
        let mut grad_l = Array2::<f64>::zeros((dim, dim));
        let mut eta = Array1::<f64>::zeros(dim);
        let mut zeta = Array1::<f64>::zeros(dim);
        let mut grad_logp = Array1::<f64>::zeros(dim);

        let mut accepted = 0;
        let mut dropped = 0;
        while accepted < n_samples {
            for i in 0..dim {
                eta[i] = rng.sample(StandardNormal);
            }
            for i in 0..dim {
                let mut acc = self.mu[i];
                for k in 0..=i {
                    acc += self.l_chol[[i, k]] * eta[k];
                }
                zeta[i] = acc;
            }
            match model.log_prob_grad(&zeta.view(), &mut grad_logp) {
                Ok(lp) if lp.is_finite() && grad_logp.iter().all(|g| g.is_finite()) => {
                    for i in 0..dim {
                        grad_mu[i] += grad_logp[i];
                        for k in 0..=i {
                            grad_l[[i, k]] += grad_logp[i] * eta[k];
                        }
                    }
                    accepted += 1;
                }
                res => {
                    let what = match res {
                        Err(e) => e.to_string(),
                        Ok(lp) => format!("non-finite gradient evaluation (log density {lp})"),
                    };
                    write_dropped_eval_msg(&mut msgs, &what);
                    dropped += 1;
                    if dropped >= n_samples {
                        return Err(dropped_eval_limit_err(n_samples));
                    }
                }
            }
        }

        let n = n_samples as f64;
        grad_mu.mapv_inplace(|g| g / n);
        grad_l.mapv_inplace(|g| g / n);
        // Entropy contributes d(log det L)/dL_ii = 1/L_ii.
        for i in 0..dim {
            grad_l[[i, i]] += 1.0 / self.l_chol[[i, i]];
        }

        Ok(Self {
            mu: grad_mu,
            l_chol: grad_l,
        })
    }

    fn square(&self) -> Self {
        Self {
            mu: self.mu.mapv(|x| x * x),
            l_chol: self.l_chol.mapv(|x| x * x),
        }
    }

    fn sqrt(&self) -> Self {
        Self {
            mu: self.mu.mapv(f64::sqrt),
            l_chol: self.l_chol.mapv(f64::sqrt),
        }
    }

    fn scaled(&self, a: f64) -> Self {
        Self {
            mu: self.mu.mapv(|x| a * x),
            l_chol: self.l_chol.mapv(|x| a * x),
        }
    }

    fn add(&self, other: &Self) -> Self {
        Self {
            mu: &self.mu + &other.mu,
            l_chol: &self.l_chol + &other.l_chol,
        }
    }

    fn div(&self, other: &Self) -> Self {
        Self {
            mu: &self.mu / &other.mu,
            l_chol: &self.l_chol / &other.l_chol,
        }
    }

    fn add_scalar(&self, a: f64) -> Self {
        Self {
            mu: self.mu.mapv(|x| x + a),
            l_chol: self.l_chol.mapv(|x| x + a),
        }
    }
}
