//! Drives a sampler transition by transition and collects the draws.

use crate::sample::{Sample, Sampler};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;

/// Runs `sampler` for `n_collect + n_discard` transitions starting from
/// `init`, discarding the burn-in, and returns the kept positions as an
/// `[n_collect, dim]` array.
pub fn run<S: Sampler>(
    sampler: &mut S,
    init: Sample,
    n_collect: usize,
    n_discard: usize,
) -> Array2<f64> {
    let dim = init.cont_params().len();
    let mut out = Array2::<f64>::zeros((n_collect, dim));
    let mut current = init;
    let total = n_collect + n_discard;

    for i in 0..total {
        current = sampler.transition(&current);
        if i >= n_discard {
            out.row_mut(i - n_discard).assign(current.cont_params());
        }
    }

    out
}

/// Same as [`run`], with a progress bar showing a smoothed acceptance
/// probability.
pub fn run_progress<S: Sampler>(
    sampler: &mut S,
    init: Sample,
    n_collect: usize,
    n_discard: usize,
) -> Array2<f64> {
    let dim = init.cont_params().len();
    let mut out = Array2::<f64>::zeros((n_collect, dim));
    let mut current = init;
    let total = n_collect + n_discard;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:8} {bar:40.cyan/blue} {pos}/{len} ({eta}) | {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.set_prefix("Chain");

    let alpha = 0.01;
    let mut p_accept = -1.0;
    for i in 0..total {
        current = sampler.transition(&current);
        p_accept = if p_accept < 0.0 {
            current.accept_prob()
        } else {
            (1.0 - alpha) * p_accept + alpha * current.accept_prob()
        };
        pb.set_message(format!("p(accept)≈{:.2}", p_accept));
        pb.inc(1);

        if i >= n_discard {
            out.row_mut(i - n_discard).assign(current.cont_params());
        }
    }
    pb.finish_with_message("Done!");

    out
}
