/*!
# Variational Inference

A [`VariationalFamily`] is a parameterized approximating distribution with
just enough structure for stochastic gradient ascent on the ELBO: sampling,
entropy, a reparameterization gradient, and elementwise vector-space
operations over its own parameter shape. Two families are provided, the
independent-normal [`MeanField`] and the correlated [`FullRank`], and the
[`Advi`] engine drives either one.
*/

mod advi;
mod fullrank;
mod meanfield;

pub use advi::Advi;
pub use fullrank::FullRank;
pub use meanfield::MeanField;

use crate::distributions::Model;
use ndarray::Array1;
use num_traits::{Float, FromPrimitive};
use rand::rngs::SmallRng;
use std::error::Error;
use std::io::Write;

/// A variational approximating family.
///
/// The elementwise operations (`square`, `sqrt`, `scaled`, `add`, `div`,
/// `add_scalar`) act over the family's full parameter shape, location and
/// scale components independently, so the adaptive gradient step can treat
/// a family, its gradient, and its running preconditioner uniformly.
pub trait VariationalFamily: Clone {
    /// Family centered at `mu` with its scale parameters at their defaults.
    fn from_initial(mu: &Array1<f64>) -> Self;

    /// Zero-valued parameters of the family's shape.
    fn zeros(dim: usize) -> Self;

    /// Dimension of the underlying parameter space.
    fn dimension(&self) -> usize;

    /// Location μ, the family's point estimate of the posterior mean.
    fn mean(&self) -> Array1<f64>;

    /// Draws `ζ ~ Q` into `zeta`.
    fn sample(&self, rng: &mut SmallRng, zeta: &mut Array1<f64>);

    /// Differential entropy `H(Q)`.
    fn entropy(&self) -> f64;

    /// Monte Carlo estimate of the ELBO gradient with respect to the
    /// family's parameters, from `n_samples` reparameterized draws.
    ///
    /// `cont_params` is the model's continuous parameter vector; its length
    /// must match the family's dimension. Draws whose model evaluation fails
    /// are dropped with one message to `msgs` each; `n_samples` consecutive
    /// drops abort with a domain error naming the limit.
    fn calc_grad<M: Model, W: Write>(
        &self,
        model: &M,
        cont_params: &Array1<f64>,
        n_samples: usize,
        rng: &mut SmallRng,
        msgs: Option<&mut W>,
    ) -> Result<Self, Box<dyn Error>>;

    /// Elementwise square.
    fn square(&self) -> Self;

    /// Elementwise square root.
    fn sqrt(&self) -> Self;

    /// Scalar multiple `a · Q`.
    fn scaled(&self, a: f64) -> Self;

    /// Elementwise sum.
    fn add(&self, other: &Self) -> Self;

    /// Elementwise quotient.
    fn div(&self, other: &Self) -> Self;

    /// Adds `a` to every parameter.
    fn add_scalar(&self, a: f64) -> Self;
}

/// Message emitted when a reparameterized draw is dropped.
pub(crate) fn write_dropped_eval_msg<W: Write>(msgs: &mut Option<&mut W>, what: &str) {
    if let Some(out) = msgs.as_mut() {
        let _ = writeln!(
            out,
            "Informational Message: The current sample evaluation is ignored \
             because of the following issue: {what}"
        );
    }
}

/// Error raised when every draw of one Monte Carlo estimate was dropped.
pub(crate) fn dropped_eval_limit_err(limit: usize) -> Box<dyn Error> {
    format!(
        "the number of dropped evaluations has reached its maximum amount ({limit}); \
         the model may be severely ill-conditioned or misspecified"
    )
    .into()
}

/// Fixed-capacity ring buffer with order statistics over its window.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    buf: Vec<T>,
    cap: usize,
    head: usize,
}

impl<T: Float + FromPrimitive> CircularBuffer<T> {
    /// # Panics
    /// Panics unless `cap > 0`.
    pub fn with_capacity(cap: usize) -> Self {
        assert!(cap > 0, "capacity must be positive");
        Self {
            buf: Vec::with_capacity(cap),
            cap,
            head: 0,
        }
    }

    /// Appends `x`, overwriting the oldest entry once full.
    pub fn push(&mut self, x: T) {
        if self.buf.len() < self.cap {
            self.buf.push(x);
        } else {
            self.buf[self.head] = x;
            self.head = (self.head + 1) % self.cap;
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Arithmetic mean of the window.
    pub fn mean(&self) -> T {
        let mut sum = T::zero();
        for &x in &self.buf {
            sum = sum + x;
        }
        sum / T::from_usize(self.buf.len().max(1)).unwrap()
    }

    /// Median of the window, by partial selection on a copy.
    pub fn median(&self) -> T {
        let mut v = self.buf.clone();
        let n = v.len() / 2;
        v.select_nth_unstable_by(n, |a, b| {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        });
        v[n]
    }
}

#[cfg(test)]
mod tests {
    use super::CircularBuffer;

    #[test]
    fn mean_and_median_over_partial_window() {
        let mut cb = CircularBuffer::<f64>::with_capacity(5);
        cb.push(1.0);
        cb.push(3.0);
        cb.push(2.0);
        assert_eq!(cb.len(), 3);
        assert!((cb.mean() - 2.0).abs() < 1e-15);
        assert_eq!(cb.median(), 2.0);
    }

    #[test]
    fn overwrites_oldest_once_full() {
        let mut cb = CircularBuffer::<f64>::with_capacity(3);
        for x in [1.0, 2.0, 3.0, 10.0] {
            cb.push(x);
        }
        assert_eq!(cb.len(), 3);
        // Window is now {2, 3, 10}.
        assert!((cb.mean() - 5.0).abs() < 1e-15);
        assert_eq!(cb.median(), 3.0);
    }

    #[test]
    fn median_survives_an_infinite_entry() {
        let mut cb = CircularBuffer::<f64>::with_capacity(4);
        cb.push(f64::INFINITY);
        cb.push(0.01);
        cb.push(0.02);
        assert_eq!(cb.median(), 0.02);
        assert!(cb.mean().is_infinite());
    }
}
