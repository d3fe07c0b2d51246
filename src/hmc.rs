//! Hamiltonian Monte Carlo with a static integration time.
//!
//! [`HmcBase`] carries the state every Hamiltonian sampler shares: the
//! phase-space point, the Hamiltonian (and with it the mass-metric choice),
//! the integrator, the step-size controls, and the RNG. [`StaticHmc`] runs a
//! fixed integration time `T` and Metropolis-corrects the endpoint;
//! [`crate::nuts::Nuts`] builds its trajectories on the same base.

use crate::distributions::Model;
use crate::integrator::{ExplLeapfrog, Integrator};
use crate::metric::{Hamiltonian, Metric};
use crate::point::PhasePoint;
use crate::sample::{Sample, Sampler};
use ndarray::Array1;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::error::Error;

/// Shared state for Hamiltonian samplers.
pub struct HmcBase<'a, M: Model, I: Integrator<M>> {
    pub(crate) hamiltonian: Hamiltonian<'a, M>,
    pub(crate) integrator: I,
    pub(crate) z: PhasePoint,
    pub(crate) nom_epsilon: f64,
    pub(crate) epsilon: f64,
    pub(crate) epsilon_jitter: f64,
    pub(crate) rng: SmallRng,
}

impl<'a, M: Model, I: Integrator<M>> HmcBase<'a, M, I> {
    pub fn new(model: &'a M, metric: Metric, integrator: I) -> Self {
        let dim = model.num_params_r();
        let mut thread_rng = rand::rng();
        Self {
            hamiltonian: Hamiltonian::new(model, metric),
            integrator,
            z: PhasePoint::new(dim),
            nom_epsilon: 0.1,
            epsilon: 0.1,
            epsilon_jitter: 0.0,
            rng: SmallRng::from_rng(&mut thread_rng),
        }
    }

    pub fn hamiltonian(&self) -> &Hamiltonian<'a, M> {
        &self.hamiltonian
    }

    pub fn z(&self) -> &PhasePoint {
        &self.z
    }

    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Copies `q` into the owned point and refreshes the cached potential.
    pub(crate) fn seed(&mut self, q: &Array1<f64>) {
        self.z.q.assign(q);
        self.hamiltonian.init(&mut self.z);
    }

    /// Draws the step size for the next transition: the nominal step size,
    /// perturbed uniformly by up to `epsilon_jitter` of itself.
    pub(crate) fn sample_stepsize(&mut self) {
        self.epsilon = self.nom_epsilon;
        if self.epsilon_jitter > 0.0 {
            let u: f64 = self.rng.random();
            self.epsilon *= 1.0 + self.epsilon_jitter * (2.0 * u - 1.0);
        }
    }

    /// # Panics
    /// Panics unless `e > 0`.
    pub fn set_nominal_stepsize(&mut self, e: f64) {
        assert!(e > 0.0, "step size must be positive");
        self.nom_epsilon = e;
    }

    pub fn nominal_stepsize(&self) -> f64 {
        self.nom_epsilon
    }

    pub fn current_stepsize(&self) -> f64 {
        self.epsilon
    }

    /// # Panics
    /// Panics unless `j` lies in `[0, 1]`.
    pub fn set_stepsize_jitter(&mut self, j: f64) {
        assert!(
            (0.0..=1.0).contains(&j),
            "step-size jitter must lie in [0, 1]"
        );
        self.epsilon_jitter = j;
    }

    pub fn stepsize_jitter(&self) -> f64 {
        self.epsilon_jitter
    }

    /// Doubling/halving search for a nominal step size whose one-step
    /// acceptance probability brackets 0.8, started from the current point.
    ///
    /// Seed the point first (for instance by running one transition). Errors
    /// when the search runs away, which indicates an improper or
    /// discontinuous posterior rather than a configuration mistake.
    pub fn init_stepsize(&mut self) -> Result<(), Box<dyn Error>> {
        let z_init = self.z.clone();
        let target = 0.8_f64.ln();

        self.hamiltonian.sample_p(&mut self.z, &mut self.rng);
        self.hamiltonian.init(&mut self.z);
        let h0 = self.hamiltonian.h(&self.z);
        self.integrator
            .evolve(&mut self.z, &self.hamiltonian, self.epsilon);
        let mut h = self.hamiltonian.h(&self.z);
        if h.is_nan() {
            h = f64::INFINITY;
        }
        let direction = if h0 - h > target { 1 } else { -1 };

        loop {
            self.z.clone_from(&z_init);
            self.hamiltonian.sample_p(&mut self.z, &mut self.rng);
            self.hamiltonian.init(&mut self.z);
            let h0 = self.hamiltonian.h(&self.z);
            self.integrator
                .evolve(&mut self.z, &self.hamiltonian, self.epsilon);
            let mut h = self.hamiltonian.h(&self.z);
            if h.is_nan() {
                h = f64::INFINITY;
            }
            let delta_h = h0 - h;

            if direction == 1 && !(delta_h > target) {
                break;
            }
            if direction == -1 && !(delta_h < target) {
                break;
            }
            self.epsilon = if direction == 1 {
                2.0 * self.epsilon
            } else {
                0.5 * self.epsilon
            };

            if self.epsilon > 1e7 {
                return Err(
                    "step size search diverged above 1e7; the posterior may be improper".into(),
                );
            }
            if self.epsilon == 0.0 {
                return Err(
                    "step size search collapsed to zero; no acceptably small step size exists"
                        .into(),
                );
            }
        }

        self.nom_epsilon = self.epsilon;
        self.z.clone_from(&z_init);
        Ok(())
    }
}

/// Hamiltonian Monte Carlo with a fixed integration time `T` and derived
/// leapfrog step count `L = max(1, ⌊T/ε₀⌋)`.
pub struct StaticHmc<'a, M: Model, I: Integrator<M> = ExplLeapfrog> {
    base: HmcBase<'a, M, I>,
    t: f64,
    l: usize,
}

impl<'a, M: Model> StaticHmc<'a, M, ExplLeapfrog> {
    pub fn new(model: &'a M, metric: Metric) -> Self {
        Self::with_integrator(model, metric, ExplLeapfrog)
    }
}

impl<'a, M: Model, I: Integrator<M>> StaticHmc<'a, M, I> {
    pub fn with_integrator(model: &'a M, metric: Metric, integrator: I) -> Self {
        let base = HmcBase::new(model, metric, integrator);
        let mut sampler = Self { base, t: 1.0, l: 1 };
        sampler.update_l();
        sampler
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.base.seed_rng(seed);
        self
    }

    pub fn base(&self) -> &HmcBase<'a, M, I> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut HmcBase<'a, M, I> {
        &mut self.base
    }

    fn update_l(&mut self) {
        self.l = ((self.t / self.base.nom_epsilon) as usize).max(1);
    }

    /// # Panics
    /// Panics unless `e > 0` and `t > 0`.
    pub fn set_nominal_stepsize_and_t(&mut self, e: f64, t: f64) {
        assert!(e > 0.0, "step size must be positive");
        assert!(t > 0.0, "integration time must be positive");
        self.base.nom_epsilon = e;
        self.t = t;
        self.update_l();
    }

    /// Fixes the leapfrog count directly; the integration time becomes `e · l`.
    ///
    /// # Panics
    /// Panics unless `e > 0` and `l > 0`.
    pub fn set_nominal_stepsize_and_l(&mut self, e: f64, l: usize) {
        assert!(e > 0.0, "step size must be positive");
        assert!(l > 0, "leapfrog count must be positive");
        self.base.nom_epsilon = e;
        self.l = l;
        self.t = e * l as f64;
    }

    /// # Panics
    /// Panics unless `t > 0`.
    pub fn set_t(&mut self, t: f64) {
        assert!(t > 0.0, "integration time must be positive");
        self.t = t;
        self.update_l();
    }

    /// # Panics
    /// Panics unless `e > 0`.
    pub fn set_nominal_stepsize(&mut self, e: f64) {
        self.base.set_nominal_stepsize(e);
        self.update_l();
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn l(&self) -> usize {
        self.l
    }
}

impl<M: Model, I: Integrator<M>> Sampler for StaticHmc<'_, M, I> {
    fn transition(&mut self, init_sample: &Sample) -> Sample {
        self.base.sample_stepsize();
        self.base.seed(init_sample.cont_params());

        self.base
            .hamiltonian
            .sample_p(&mut self.base.z, &mut self.base.rng);

        let z_init = self.base.z.clone();
        let h0 = self.base.hamiltonian.h(&self.base.z);

        for _ in 0..self.l {
            self.base
                .integrator
                .evolve(&mut self.base.z, &self.base.hamiltonian, self.base.epsilon);
        }

        let mut h = self.base.hamiltonian.h(&self.base.z);
        if h.is_nan() {
            h = f64::INFINITY;
        }

        let accept_prob = (h0 - h).exp();
        if accept_prob < 1.0 && self.base.rng.random::<f64>() > accept_prob {
            self.base.z = z_init;
        }

        Sample::new(
            self.base.z.q.clone(),
            -self.base.z.v,
            accept_prob.min(1.0),
        )
    }

    fn sampler_param_names(&self) -> Vec<String> {
        vec!["stepsize__".to_string(), "int_time__".to_string()]
    }

    fn sampler_params(&self) -> Vec<f64> {
        vec![self.base.epsilon, self.t]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::StdNormal;

    #[test]
    fn update_l_floors_and_clamps() {
        let model = StdNormal::new(1);
        let mut sampler = StaticHmc::new(&model, Metric::unit(1));

        sampler.set_nominal_stepsize_and_t(0.3, 1.0);
        assert_eq!(sampler.l(), 3);

        sampler.set_nominal_stepsize_and_t(2.0, 1.0);
        assert_eq!(sampler.l(), 1);

        sampler.set_nominal_stepsize_and_t(0.25, 1.0);
        assert_eq!(sampler.l(), 4);
    }

    #[test]
    fn set_stepsize_and_l_derives_integration_time() {
        let model = StdNormal::new(1);
        let mut sampler = StaticHmc::new(&model, Metric::unit(1));
        sampler.set_nominal_stepsize_and_l(0.1, 7);
        assert_eq!(sampler.l(), 7);
        assert!((sampler.t() - 0.7).abs() < 1e-15);
    }

    #[test]
    #[should_panic(expected = "step size must be positive")]
    fn rejects_nonpositive_stepsize() {
        let model = StdNormal::new(1);
        let mut sampler = StaticHmc::new(&model, Metric::unit(1));
        sampler.set_nominal_stepsize(0.0);
    }

    #[test]
    fn init_stepsize_finds_a_usable_scale() {
        let model = StdNormal::new(5);
        let mut sampler = StaticHmc::new(&model, Metric::unit(5)).set_seed(3);
        let _ = sampler.transition(&Sample::new(Array1::zeros(5), 0.0, 1.0));
        sampler.base_mut().init_stepsize().unwrap();
        let eps = sampler.base().nominal_stepsize();
        assert!(eps > 0.01 && eps < 10.0, "eps = {eps}");
    }

    #[test]
    fn sampler_params_report_stepsize_and_time() {
        let model = StdNormal::new(1);
        let mut sampler = StaticHmc::new(&model, Metric::unit(1));
        sampler.set_nominal_stepsize_and_t(0.25, 1.0);
        assert_eq!(
            sampler.sampler_param_names(),
            vec!["stepsize__".to_string(), "int_time__".to_string()]
        );
        assert_eq!(sampler.sampler_params()[1], 1.0);
    }
}
