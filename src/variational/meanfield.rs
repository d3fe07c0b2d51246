//! Independent-normal (mean-field) variational family.

use crate::distributions::Model;
use crate::variational::{dropped_eval_limit_err, write_dropped_eval_msg, VariationalFamily};
use ndarray::Array1;
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::StandardNormal;
use std::error::Error;
use std::f64::consts::PI;
use std::io::Write;

/// `Q(ζ) = N(ζ | μ, diag(exp(ω)²))`, parameterized by the location `μ` and
/// the unconstrained log standard deviations `ω`.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanField {
    mu: Array1<f64>,
    omega: Array1<f64>,
}

impl MeanField {
    pub fn new(mu: Array1<f64>, omega: Array1<f64>) -> Self {
        assert_eq!(mu.len(), omega.len(), "mu and omega lengths differ");
        Self { mu, omega }
    }

    pub fn mu(&self) -> &Array1<f64> {
        &self.mu
    }

    pub fn omega(&self) -> &Array1<f64> {
        &self.omega
    }

    /// Standard deviations `σ = exp(ω)`.
    pub fn stddev(&self) -> Array1<f64> {
        self.omega.mapv(f64::exp)
    }
}

impl VariationalFamily for MeanField {
    fn from_initial(mu: &Array1<f64>) -> Self {
        Self {
            mu: mu.clone(),
            omega: Array1::zeros(mu.len()),
        }
    }

    fn zeros(dim: usize) -> Self {
        Self {
            mu: Array1::zeros(dim),
            omega: Array1::zeros(dim),
        }
    }

    fn dimension(&self) -> usize {
        self.mu.len()
    }

    fn mean(&self) -> Array1<f64> {
        self.mu.clone()
    }

    fn sample(&self, rng: &mut SmallRng, zeta: &mut Array1<f64>) {
        for i in 0..self.mu.len() {
            let eta: f64 = rng.sample(StandardNormal);
            zeta[i] = self.mu[i] + self.omega[i].exp() * eta;
        }
    }

    fn entropy(&self) -> f64 {
        0.5 * self.mu.len() as f64 * (1.0 + (2.0 * PI).ln()) + self.omega.sum()
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
        let mut grad_omega = Array1::<f64>::zeros(dim);
        let mut eta = Array1::<f64>::zeros(dim);
        let mut zeta = Array1::<f64>::zeros(dim);
        let mut grad_logp = Array1::<f64>::zeros(dim);

        let mut accepted = 0;
        let mut dropped = 0;
        while accepted < n_samples {
            for i in 0..dim {
                eta[i] = rng.sample(StandardNormal);
                zeta[i] = self.mu[i] + self.omega[i].exp() * eta[i];
            }
            match model.log_prob_grad(&zeta.view(), &mut grad_logp) {
                Ok(lp) if lp.is_finite() && grad_logp.iter().all(|g| g.is_finite()) => {
                    for i in 0..dim {
                        grad_mu[i] += grad_logp[i];
                        grad_omega[i] += grad_logp[i] * eta[i] * self.omega[i].exp();
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
        // Entropy contributes dH/dω = 1 per coordinate.
        grad_omega.mapv_inplace(|g| g / n + 1.0);

        Ok(Self {
            mu: grad_mu,
            omega: grad_omega,
        })
    }

    fn square(&self) -> Self {
        Self {
            mu: self.mu.mapv(|x| x * x),
            omega: self.omega.mapv(|x| x * x),
        }
    }

    fn sqrt(&self) -> Self {
        Self {
            mu: self.mu.mapv(f64::sqrt),
            omega: self.omega.mapv(f64::sqrt),
        }
    }

    fn scaled(&self, a: f64) -> Self {
        Self {
            mu: self.mu.mapv(|x| a * x),
            omega: self.omega.mapv(|x| a * x),
        }
    }

    fn add(&self, other: &Self) -> Self {
        Self {
            mu: &self.mu + &other.mu,
            omega: &self.omega + &other.omega,
        }
    }

    fn div(&self, other: &Self) -> Self {
        Self {
            mu: &self.mu / &other.mu,
            omega: &self.omega / &other.omega,
        }
    }

    fn add_scalar(&self, a: f64) -> Self {
        Self {
            mu: self.mu.mapv(|x| x + a),
            omega: self.omega.mapv(|x| x + a),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::DiagGaussian;
    use ndarray::arr1;
    use rand::SeedableRng;

    #[test]
    fn entropy_of_standard_family_matches_closed_form() {
        let q = MeanField::from_initial(&arr1(&[0.0, 0.0]));
        let expected = 0.5 * 2.0 * (1.0 + (2.0 * PI).ln());
        assert!((q.entropy() - expected).abs() < 1e-12);
    }

    #[test]
    fn sample_moments_track_mu_and_sigma() {
        let q = MeanField::new(arr1(&[2.0, -1.0]), arr1(&[0.0, 0.5_f64.ln()]));
        let mut rng = SmallRng::seed_from_u64(11);
        let mut zeta = Array1::zeros(2);
        let n = 100_000;
        let mut mean = arr1(&[0.0, 0.0]);
        let mut sq = arr1(&[0.0, 0.0]);
        for _ in 0..n {
            q.sample(&mut rng, &mut zeta);
            mean = mean + &zeta;
            sq = sq + zeta.mapv(|x| x * x);
        }
        mean.mapv_inplace(|x| x / n as f64);
        sq.mapv_inplace(|x| x / n as f64);
        assert!((mean[0] - 2.0).abs() < 0.02);
        assert!((mean[1] + 1.0).abs() < 0.02);
        let var1 = sq[1] - mean[1] * mean[1];
        assert!((var1 - 0.25).abs() < 0.01);
    }

    #[test]
    fn gradient_vanishes_at_the_optimum() {
        // For a diagonal Gaussian target the optimal mean-field family is the
        // target itself, where both gradient blocks are zero in expectation.
        let target = DiagGaussian::new(arr1(&[1.0, -2.0]), arr1(&[4.0, 0.25]));
        let q = MeanField::new(
            arr1(&[1.0, -2.0]),
            arr1(&[2.0_f64.ln(), 0.5_f64.ln()]),
        );
        let mut rng = SmallRng::seed_from_u64(5);
        let grad = q
            .calc_grad(&target, &arr1(&[0.0, 0.0]), 50_000, &mut rng, None::<&mut Vec<u8>>)
            .unwrap();
        for i in 0..2 {
            assert!(grad.mu()[i].abs() < 0.05, "mu grad {}", grad.mu()[i]);
            assert!(grad.omega()[i].abs() < 0.05, "omega grad {}", grad.omega()[i]);
        }
    }
}
