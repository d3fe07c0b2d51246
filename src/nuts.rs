//! The No-U-Turn Sampler.
//!
//! NUTS grows a leapfrog trajectory by repeated doubling, in a uniformly
//! random direction each time, until the trajectory starts to double back on
//! itself or a divergence ends the expansion. The candidate draw is selected
//! by biased progressive sampling over the slice-valid leaves, so longer
//! fresh subtrees are favored without breaking detailed balance.

use crate::distributions::Model;
use crate::hmc::HmcBase;
use crate::integrator::{ExplLeapfrog, Integrator};
use crate::metric::Metric;
use crate::point::PhasePoint;
use crate::sample::{Sample, Sampler};
use ndarray::Array1;
use rand::Rng;
use rand_distr::Exp1;

/// One balanced subtree of leapfrog-reachable states.
///
/// `z_beg` is the boundary state nearest the trajectory's starting point in
/// the direction the subtree was built; `z_end` is the furthest. `rho` sums
/// the momenta of every leaf.
struct NutsTree {
    z_beg: PhasePoint,
    z_end: PhasePoint,
    rho: Array1<f64>,
    z_propose: PhasePoint,
    /// Leaves inside the slice.
    n_valid: usize,
    /// Total leapfrog steps taken for this subtree.
    n_leaves: usize,
    /// Σ min(1, exp(H₀ − h)) over the leaves.
    sum_accept: f64,
    valid: bool,
}

/// The No-U-Turn sampler over any mass metric.
pub struct Nuts<'a, M: Model, I: Integrator<M> = ExplLeapfrog> {
    base: HmcBase<'a, M, I>,
    max_depth: usize,
    max_delta_h: f64,
    depth: usize,
    n_leapfrog: usize,
    divergent: bool,
    energy: f64,
}

impl<'a, M: Model> Nuts<'a, M, ExplLeapfrog> {
    pub fn new(model: &'a M, metric: Metric) -> Self {
        Self::with_integrator(model, metric, ExplLeapfrog)
    }
}

impl<'a, M: Model, I: Integrator<M>> Nuts<'a, M, I> {
    pub fn with_integrator(model: &'a M, metric: Metric, integrator: I) -> Self {
        Self {
            base: HmcBase::new(model, metric, integrator),
            max_depth: 10,
            max_delta_h: 1000.0,
            depth: 0,
            n_leapfrog: 0,
            divergent: false,
            energy: 0.0,
        }
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

    /// # Panics
    /// Panics unless `d > 0`.
    pub fn set_max_depth(&mut self, d: usize) {
        assert!(d > 0, "maximum tree depth must be positive");
        self.max_depth = d;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// # Panics
    /// Panics unless `delta > 0`.
    pub fn set_max_delta_h(&mut self, delta: f64) {
        assert!(delta > 0.0, "divergence threshold must be positive");
        self.max_delta_h = delta;
    }

    pub fn max_delta_h(&self) -> f64 {
        self.max_delta_h
    }

    /// Tree depth reached by the most recent transition.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Leapfrog steps taken by the most recent transition.
    pub fn n_leapfrog(&self) -> usize {
        self.n_leapfrog
    }

    /// Whether the most recent transition ended in a divergence.
    pub fn divergent(&self) -> bool {
        self.divergent
    }

    /// Hamiltonian at the most recent transition's selected draw.
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// U-turn check for the trajectory segment between `start` and `finish`
    /// whose momenta sum to `rho`: expansion continues only while both
    /// endpoint momenta keep a positive inner product with the remaining
    /// momentum sum, measured in the metric's dual.
    fn compute_criterion(
        &self,
        start: &PhasePoint,
        finish: &PhasePoint,
        rho: &Array1<f64>,
    ) -> bool {
        let metric = self.base.hamiltonian.metric();
        metric.dual_dot(&finish.p, &(rho - &finish.p)) > 0.0
            && metric.dual_dot(&start.p, &(rho - &start.p)) > 0.0
    }

    /// Builds a depth-`depth` subtree by advancing the owned point `2^depth`
    /// leapfrog steps of signed size `sign · ε` from its current state.
    ///
    /// `log_u` is the slice variable relative to `H₀`: a leaf with energy `h`
    /// is inside the slice when `log_u + (h − H₀) < 0`, and divergent when
    /// that quantity reaches `max_delta_h`.
    fn build_tree(&mut self, depth: usize, sign: f64, log_u: f64, h0: f64) -> NutsTree {
        if depth == 0 {
            self.base.integrator.evolve(
                &mut self.base.z,
                &self.base.hamiltonian,
                sign * self.base.epsilon,
            );
            let mut h = self.base.hamiltonian.h(&self.base.z);
            if h.is_nan() {
                h = f64::INFINITY;
            }

            let divergent = !(log_u + (h - h0) < self.max_delta_h);
            if divergent {
                self.divergent = true;
            }

            return NutsTree {
                z_beg: self.base.z.clone(),
                z_end: self.base.z.clone(),
                rho: self.base.z.p.clone(),
                z_propose: self.base.z.clone(),
                n_valid: (log_u + (h - h0) < 0.0) as usize,
                n_leaves: 1,
                sum_accept: (h0 - h).exp().min(1.0),
                valid: !divergent,
            };
        }

        let mut lhs = self.build_tree(depth - 1, sign, log_u, h0);
        if !lhs.valid {
            return lhs;
        }
        let rhs = self.build_tree(depth - 1, sign, log_u, h0);

        lhs.n_leaves += rhs.n_leaves;
        lhs.sum_accept += rhs.sum_accept;
        if !rhs.valid {
            lhs.valid = false;
            return lhs;
        }

        // Biased progressive sampling between the halves.
        let take_prob = rhs.n_valid as f64 / (lhs.n_valid + rhs.n_valid).max(1) as f64;
        if self.base.rng.random::<f64>() < take_prob {
            lhs.z_propose = rhs.z_propose;
        }

        let rho_subtree = &lhs.rho + &rhs.rho;
        let mut valid = self.compute_criterion(&lhs.z_beg, &rhs.z_end, &rho_subtree);
        // The merge boundary must not turn either: check each half extended
        // by the adjacent boundary momentum of the other.
        let rho_left = &lhs.rho + &rhs.z_beg.p;
        valid = valid && self.compute_criterion(&lhs.z_beg, &rhs.z_beg, &rho_left);
        let rho_right = &rhs.rho + &lhs.z_end.p;
        valid = valid && self.compute_criterion(&lhs.z_end, &rhs.z_end, &rho_right);

        NutsTree {
            z_beg: lhs.z_beg,
            z_end: rhs.z_end,
            rho: rho_subtree,
            z_propose: lhs.z_propose,
            n_valid: lhs.n_valid + rhs.n_valid,
            n_leaves: lhs.n_leaves,
            sum_accept: lhs.sum_accept,
            valid,
        }
    }
}

impl<M: Model, I: Integrator<M>> Sampler for Nuts<'_, M, I> {
    fn transition(&mut self, init_sample: &Sample) -> Sample {
        self.base.sample_stepsize();
        self.base.seed(init_sample.cont_params());
        self.base
            .hamiltonian
            .sample_p(&mut self.base.z, &mut self.base.rng);

        let h0 = self.base.hamiltonian.h(&self.base.z);
        let exp1: f64 = self.base.rng.sample(Exp1);
        let log_u = -exp1;

        let mut z_plus = self.base.z.clone();
        let mut z_minus = self.base.z.clone();
        let mut z_sample = self.base.z.clone();
        let rho_init = self.base.z.p.clone();
        let mut rho_plus = Array1::<f64>::zeros(self.base.z.dim());
        let mut rho_minus = Array1::<f64>::zeros(self.base.z.dim());

        self.depth = 0;
        self.divergent = false;
        let mut n_leapfrog = 0;
        let mut sum_accept = 0.0;
        let mut n_valid_total = 0usize;
        let mut criterion = true;

        while criterion && self.depth < self.max_depth {
            let forward = self.base.rng.random::<f64>() > 0.5;
            let sign = if forward { 1.0 } else { -1.0 };
            self.base
                .z
                .clone_from(if forward { &z_plus } else { &z_minus });

            let subtree = self.build_tree(self.depth, sign, log_u, h0);
            self.depth += 1;

            if forward {
                z_plus.clone_from(&self.base.z);
                rho_plus += &subtree.rho;
            } else {
                z_minus.clone_from(&self.base.z);
                rho_minus += &subtree.rho;
            }
            n_leapfrog += subtree.n_leaves;
            sum_accept += subtree.sum_accept;

            if !subtree.valid {
                break;
            }

            // Progressive sampling across the doubling.
            let subtree_prob = if n_valid_total > 0 {
                subtree.n_valid as f64 / n_valid_total as f64
            } else if subtree.n_valid > 0 {
                1.0
            } else {
                0.0
            };
            if self.base.rng.random::<f64>() < subtree_prob {
                z_sample.clone_from(&subtree.z_propose);
            }
            n_valid_total += subtree.n_valid;

            let rho_total = &rho_minus + &rho_init + &rho_plus;
            criterion = self.compute_criterion(&z_minus, &z_plus, &rho_total);
        }

        self.n_leapfrog = n_leapfrog;
        let accept_prob = if n_leapfrog > 0 {
            (sum_accept / n_leapfrog as f64).min(1.0)
        } else {
            0.0
        };

        self.base.z = z_sample;
        self.energy = self.base.hamiltonian.h(&self.base.z);

        Sample::new(self.base.z.q.clone(), -self.base.z.v, accept_prob)
    }

    fn sampler_param_names(&self) -> Vec<String> {
        vec![
            "stepsize__".to_string(),
            "treedepth__".to_string(),
            "n_leapfrog__".to_string(),
            "divergent__".to_string(),
            "energy__".to_string(),
        ]
    }

    fn sampler_params(&self) -> Vec<f64> {
        vec![
            self.base.epsilon,
            self.depth as f64,
            self.n_leapfrog as f64,
            self.divergent as u8 as f64,
            self.energy,
        ]
    }
}
