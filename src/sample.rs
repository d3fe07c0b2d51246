//! Samples and the sampler transition seam.

use ndarray::Array1;

/// A single draw: position, log density there, and the transition's
/// acceptance statistic. Immutable once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    q: Array1<f64>,
    log_prob: f64,
    accept_prob: f64,
}

impl Sample {
    /// # Panics
    /// Panics unless `accept_prob` lies in `[0, 1]`.
    pub fn new(q: Array1<f64>, log_prob: f64, accept_prob: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&accept_prob),
            "acceptance probability must lie in [0, 1], got {accept_prob}"
        );
        Self {
            q,
            log_prob,
            accept_prob,
        }
    }

    pub fn cont_params(&self) -> &Array1<f64> {
        &self.q
    }

    pub fn log_prob(&self) -> f64 {
        self.log_prob
    }

    pub fn accept_prob(&self) -> f64 {
        self.accept_prob
    }
}

/// A Markov transition kernel over continuous parameters.
///
/// Implementors produce a stream of draws through repeated
/// [`Sampler::transition`] calls and report their tuning quantities under
/// stable names, one value per name, in matching order.
pub trait Sampler {
    /// Advances the chain by one transition from `init`.
    fn transition(&mut self, init: &Sample) -> Sample;

    /// Names of the per-transition quantities this sampler reports.
    fn sampler_param_names(&self) -> Vec<String>;

    /// Values matching [`Sampler::sampler_param_names`], for the most recent
    /// transition.
    fn sampler_params(&self) -> Vec<f64>;
}
