//! Automatic Differentiation Variational Inference.
//!
//! [`Advi`] maximizes the evidence lower bound
//! `ELBO(Q) = E_{ζ~Q}[log π(ζ)] + H(Q)` over a [`VariationalFamily`] by
//! adaptive stochastic gradient ascent: the expectation is estimated by Monte
//! Carlo, the gradient by the family's reparameterization, and the step size
//! is scaled per parameter by a running root-mean-square preconditioner.
//! Convergence is detected from a rolling window of relative ELBO changes.

use crate::distributions::Model;
use crate::io;
use crate::variational::{write_dropped_eval_msg, CircularBuffer, VariationalFamily};
use ndarray::Array1;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::error::Error;
use std::io::Write;
use std::marker::PhantomData;
use std::time::Instant;

const ETA_SEQUENCE: [f64; 5] = [1.0, 0.5, 0.1, 0.05, 0.01];
const TUNING_ITERATIONS: usize = 50;
/// Damping offset in the adaptive step denominator; keeps it away from zero.
const TAU: f64 = 1.0;
const PRE_FACTOR: f64 = 0.9;
const POST_FACTOR: f64 = 0.1;

/// ADVI engine over a model and a variational family.
pub struct Advi<'a, M: Model, Q: VariationalFamily> {
    model: &'a M,
    cont_params: Array1<f64>,
    rng: SmallRng,
    n_monte_carlo_grad: usize,
    n_monte_carlo_elbo: usize,
    eval_elbo: usize,
    n_posterior_samples: usize,
    print: Option<Box<dyn Write + 'a>>,
    output: Option<Box<dyn Write + 'a>>,
    diagnostic: Option<Box<dyn Write + 'a>>,
    _family: PhantomData<Q>,
}

impl<'a, M: Model, Q: VariationalFamily> Advi<'a, M, Q> {
    /// # Panics
    /// Panics unless every count is positive and `cont_params` matches the
    /// model dimension.
    pub fn new(
        model: &'a M,
        cont_params: Array1<f64>,
        n_monte_carlo_grad: usize,
        n_monte_carlo_elbo: usize,
        eval_elbo: usize,
        n_posterior_samples: usize,
    ) -> Self {
        assert_eq!(
            cont_params.len(),
            model.num_params_r(),
            "initial parameter vector must match the model dimension"
        );
        assert!(
            n_monte_carlo_grad > 0,
            "number of Monte Carlo samples for gradients must be positive"
        );
        assert!(
            n_monte_carlo_elbo > 0,
            "number of Monte Carlo samples for the ELBO must be positive"
        );
        assert!(eval_elbo > 0, "ELBO evaluation period must be positive");
        assert!(
            n_posterior_samples > 0,
            "number of posterior samples must be positive"
        );
        let mut thread_rng = rand::rng();
        Self {
            model,
            cont_params,
            rng: SmallRng::from_rng(&mut thread_rng),
            n_monte_carlo_grad,
            n_monte_carlo_elbo,
            eval_elbo,
            n_posterior_samples,
            print: None,
            output: None,
            diagnostic: None,
            _family: PhantomData,
        }
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Human-readable progress stream.
    pub fn with_print(mut self, out: Box<dyn Write + 'a>) -> Self {
        self.print = Some(out);
        self
    }

    /// Draw-record stream.
    pub fn with_output(mut self, out: Box<dyn Write + 'a>) -> Self {
        self.output = Some(out);
        self
    }

    /// ELBO diagnostic stream (CSV: `iter,time_in_seconds,ELBO`).
    pub fn with_diagnostic(mut self, out: Box<dyn Write + 'a>) -> Self {
        self.diagnostic = Some(out);
        self
    }

    fn print_line(&mut self, line: &str) {
        if let Some(out) = self.print.as_mut() {
            let _ = writeln!(out, "{line}");
        }
    }

    /// Monte Carlo estimate of the ELBO at `variational`.
    ///
    /// Accumulates `log π(ζ)` over `n_monte_carlo_elbo` valid draws; draws
    /// whose evaluation fails are dropped with a message, and
    /// `n_monte_carlo_elbo` drops within one estimate are a domain error
    /// naming that limit.
    pub fn calc_elbo(&mut self, variational: &Q) -> Result<f64, Box<dyn Error>> {
        let mut zeta = Array1::<f64>::zeros(variational.dimension());
        let mut elbo = 0.0;
        let mut accepted = 0;
        let mut dropped = 0;

        let mut msgs = self.print.as_mut();
        while accepted < self.n_monte_carlo_elbo {
            variational.sample(&mut self.rng, &mut zeta);
            match self.model.log_prob(&zeta.view()) {
                Ok(energy) if energy.is_finite() => {
                    elbo += energy;
                    accepted += 1;
                }
                res => {
                    let what = match res {
                        Err(e) => e.to_string(),
                        Ok(energy) => format!("non-finite log density ({energy})"),
                    };
                    write_dropped_eval_msg(&mut msgs, &what);
                    dropped += 1;
                    if dropped >= self.n_monte_carlo_elbo {
                        return Err(format!(
                            "the number of dropped evaluations has reached its maximum \
                             amount ({}); the model may be severely ill-conditioned or \
                             misspecified",
                            self.n_monte_carlo_elbo
                        )
                        .into());
                    }
                }
            }
        }

        elbo /= self.n_monte_carlo_elbo as f64;
        elbo += variational.entropy();
        Ok(elbo)
    }

    /// Monte Carlo estimate of the ELBO gradient at `variational`.
    pub fn calc_elbo_grad(&mut self, variational: &Q) -> Result<Q, Box<dyn Error>> {
        assert_eq!(
            variational.dimension(),
            self.cont_params.len(),
            "family dimension must match the initial parameter vector"
        );
        variational.calc_grad(
            self.model,
            &self.cont_params,
            self.n_monte_carlo_grad,
            &mut self.rng,
            self.print.as_mut(),
        )
    }

    /// One adaptive gradient step at iteration `t ≥ 1`: refresh the running
    /// preconditioner `s`, then move by `(η/√t) · g / (τ + √s)` elementwise.
    fn adaptive_step(variational: &mut Q, grad: &Q, s: &mut Q, t: usize, eta: f64) {
        if t == 1 {
            *s = grad.square();
        } else {
            *s = s.scaled(PRE_FACTOR).add(&grad.square().scaled(POST_FACTOR));
        }
        let eta_scaled = eta / (t as f64).sqrt();
        let update = grad.scaled(eta_scaled).div(&s.sqrt().add_scalar(TAU));
        *variational = variational.add(&update);
    }

    /// Coarse grid search for the step-size scale η.
    ///
    /// Tries each candidate for [`TUNING_ITERATIONS`] adaptive steps from a
    /// fresh family and keeps going until a candidate's ELBO regresses from
    /// the best seen (provided the best improved on the initial ELBO), then
    /// picks the previous candidate. Returns 0 when every candidate fails,
    /// leaving the family at the last attempted state.
    pub fn tune(&mut self, variational: &mut Q) -> Result<f64, Box<dyn Error>> {
        // TODO eta = 1.0 always fails in practice but is still tried first.
        let elbo_init = self.calc_elbo(variational)?;
        let mut elbo_best = f64::NEG_INFINITY;
        let mut eta_best = 0.0;

        let mut next = 1;
        let mut eta = ETA_SEQUENCE[0];
        loop {
            self.print_line(&format!(
                "ADVI TUNING: trying eta = {eta:>4.2} for {TUNING_ITERATIONS} iterations..."
            ));

            let mut s = Q::zeros(self.cont_params.len());
            for t in 1..=TUNING_ITERATIONS {
                let grad = self.calc_elbo_grad(variational)?;
                Self::adaptive_step(variational, &grad, &mut s, t, eta);
            }
            let elbo = self.calc_elbo(variational)?;

            if elbo < elbo_best && elbo_best > elbo_init {
                self.print_line("SUCCESS: using the previous eta");
                *variational = Q::from_initial(&self.cont_params);
                return Ok(eta_best);
            }

            if next < ETA_SEQUENCE.len() {
                self.print_line("FAILED");
                elbo_best = elbo;
                eta_best = eta;
                eta = ETA_SEQUENCE[next];
                next += 1;
            } else if elbo > elbo_init {
                self.print_line("SUCCESS: using the current eta");
                *variational = Q::from_initial(&self.cont_params);
                return Ok(eta);
            } else {
                self.print_line("FAILED");
                self.print_line("ALL STEP SIZES FAILED");
                // No reset here: the family keeps the last attempted state.
                return Ok(0.0);
            }

            *variational = Q::from_initial(&self.cont_params);
        }
    }

    /// Adaptive stochastic gradient ascent on the ELBO.
    ///
    /// Evaluates the ELBO every `eval_elbo` iterations and stops once the
    /// rolling mean or median of its relative changes drops below
    /// `tol_rel_obj`, or at `max_iterations`. Returns the number of
    /// iterations run.
    ///
    /// # Panics
    /// Panics unless `eta ≥ 0`, `tol_rel_obj > 0`, and `max_iterations > 0`.
    pub fn stochastic_gradient_ascent(
        &mut self,
        variational: &mut Q,
        eta: f64,
        tol_rel_obj: f64,
        max_iterations: usize,
    ) -> Result<usize, Box<dyn Error>> {
        assert!(eta >= 0.0, "eta step size must be nonnegative");
        assert!(tol_rel_obj > 0.0, "relative tolerance must be positive");
        assert!(max_iterations > 0, "maximum iterations must be positive");

        let mut s = Q::zeros(self.cont_params.len());

        let mut elbo = 0.0;
        let mut elbo_best = f64::NEG_INFINITY;

        let window = ((0.1 * max_iterations as f64 / self.eval_elbo as f64).ceil() as usize).max(2);
        let mut elbo_diff = CircularBuffer::<f64>::with_capacity(window);

        let start = Instant::now();
        self.print_line("  iter       ELBO   delta_ELBO_mean   delta_ELBO_med   notes ");

        let mut iter = 1;
        loop {
            let grad = self.calc_elbo_grad(variational)?;
            Self::adaptive_step(variational, &grad, &mut s, iter, eta);

            let mut converged = false;
            if iter % self.eval_elbo == 0 {
                let elbo_prev = elbo;
                elbo = self.calc_elbo(variational)?;
                if elbo > elbo_best {
                    elbo_best = elbo;
                }
                let delta_elbo = rel_difference(elbo, elbo_prev);
                elbo_diff.push(delta_elbo);
                let delta_ave = elbo_diff.mean();
                let delta_med = elbo_diff.median();

                let mut notes = String::new();
                if delta_ave < tol_rel_obj {
                    notes.push_str("   MEAN ELBO CONVERGED");
                    converged = true;
                }
                if delta_med < tol_rel_obj {
                    notes.push_str("   MEDIAN ELBO CONVERGED");
                    converged = true;
                }
                if delta_med > 0.5 || delta_ave > 0.5 {
                    notes.push_str("   MAY BE DIVERGING... INSPECT ELBO");
                }

                self.print_line(&format!(
                    "{iter:>6}  {elbo:>9.1}  {delta_ave:>16.3}  {delta_med:>15.3}{notes}"
                ));

                if let Some(diag) = self.diagnostic.as_mut() {
                    let delta_t = start.elapsed().as_secs_f64();
                    let _ = writeln!(diag, "{iter},{delta_t},{elbo}");
                }

                if converged && (elbo - elbo_best).abs() > 0.5 {
                    self.print_line(
                        "Informational Message: The ELBO at a previous iteration is larger \
                         than the ELBO upon convergence!",
                    );
                    self.print_line(
                        "This means that the variational approximation has not converged to \
                         the global optima.",
                    );
                }
            }

            if converged {
                return Ok(iter);
            }
            if iter == max_iterations {
                self.print_line(
                    "Informational Message: The maximum number of iterations is reached! \
                     The algorithm has not converged.",
                );
                self.print_line(
                    "Values from this variational approximation are not guaranteed to be \
                     meaningful.",
                );
                return Ok(iter);
            }
            iter += 1;
        }
    }

    /// Fits the family and writes the results.
    ///
    /// Initializes `Q` from the initial parameter vector, tunes η when it is
    /// given as 0, runs the ascent, then writes one record at the fitted
    /// mean followed by `n_posterior_samples` posterior draws. Returns the
    /// fitted family.
    pub fn run(
        &mut self,
        eta: f64,
        tol_rel_obj: f64,
        max_iterations: usize,
    ) -> Result<Q, Box<dyn Error>> {
        if let Some(diag) = self.diagnostic.as_mut() {
            writeln!(diag, "iter,time_in_seconds,ELBO")?;
        }

        let mut variational = Q::from_initial(&self.cont_params);

        let eta = if eta == 0.0 {
            self.tune(&mut variational)?
        } else {
            eta
        };

        // On a successful pick the tuner hands back a fresh family and the
        // ascent starts from the initial point. When every candidate failed
        // the tuned eta is 0 and the ascent runs without moving.
        self.stochastic_gradient_ascent(&mut variational, eta, tol_rel_obj, max_iterations)?;

        self.cont_params = variational.mean();
        let lp = self.model.log_prob(&self.cont_params.view())?;
        if let Some(out) = self.output.as_mut() {
            io::write_draw(out, lp, &self.cont_params.view())?;
        }

        if self.output.is_some() {
            self.print_line(&format!(
                "Drawing {} samples from the approximate posterior...",
                self.n_posterior_samples
            ));
            let mut zeta = Array1::<f64>::zeros(self.cont_params.len());
            for _ in 0..self.n_posterior_samples {
                variational.sample(&mut self.rng, &mut zeta);
                let lp = self.model.log_prob(&zeta.view()).unwrap_or(f64::NAN);
                if let Some(out) = self.output.as_mut() {
                    io::write_draw(out, lp, &zeta.view())?;
                }
            }
            self.print_line("DONE");
        }

        Ok(variational)
    }
}

/// Relative difference `|curr − prev| / |prev|`.
fn rel_difference(curr: f64, prev: f64) -> f64 {
    (curr - prev).abs() / prev.abs()
}
