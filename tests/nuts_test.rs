//! Behavioral checks on NUTS: U-turn termination depth, divergence behavior
//! across mass metrics on a badly scaled Gaussian, and recovery of the
//! moments of a standard normal target.

use gradient_inference::distributions::{DiagGaussian, StdNormal};
use gradient_inference::metric::Metric;
use gradient_inference::nuts::Nuts;
use gradient_inference::runner::run;
use gradient_inference::sample::{Sample, Sampler};
use ndarray::{arr1, Array1, Axis};

#[test]
fn u_turn_ends_trees_well_before_max_depth() {
    // On N(0, I) with ε = 0.1 the trajectory turns after roughly π/ε ≈ 31
    // steps, so trees should finish around depth 5.
    let target = StdNormal::new(2);
    let mut sampler = Nuts::new(&target, Metric::unit(2)).set_seed(42);
    sampler.base_mut().set_nominal_stepsize(0.1);

    let mut sample = Sample::new(Array1::zeros(2), 0.0, 1.0);
    let mut max_depth_seen = 0;
    for _ in 0..200 {
        sample = sampler.transition(&sample);
        assert!(sampler.depth() < sampler.max_depth());
        max_depth_seen = max_depth_seen.max(sampler.depth());
        assert!(!sampler.divergent());
        assert!((0.0..=1.0).contains(&sample.accept_prob()));
    }
    assert!(
        (3..=8).contains(&max_depth_seen),
        "deepest tree had depth {max_depth_seen}"
    );
}

#[test]
fn unit_metric_diverges_on_a_badly_scaled_gaussian() {
    // Scales (1, 10): a unit-metric step sized for the wide direction is
    // stable there but catastrophically unstable in the narrow one, so the
    // energy error blows past the threshold within the first leaves.
    let target = DiagGaussian::new(arr1(&[0.0, 0.0]), arr1(&[1.0, 100.0]));
    let mut sampler = Nuts::new(&target, Metric::unit(2)).set_seed(42);
    sampler.base_mut().set_nominal_stepsize(8.0);

    let mut sample = Sample::new(arr1(&[0.1, 1.0]), 0.0, 1.0);
    let n = 10_000;
    let mut divergent = 0;
    for _ in 0..n {
        sample = sampler.transition(&sample);
        if sampler.divergent() {
            divergent += 1;
        }
    }
    let fraction = divergent as f64 / n as f64;
    assert!(fraction > 0.05, "divergent fraction = {fraction}");
}

#[test]
fn matched_diag_metric_removes_the_divergences() {
    // The same target with its scales folded into the metric integrates
    // stably at a step size adapted to that geometry.
    let target = DiagGaussian::new(arr1(&[0.0, 0.0]), arr1(&[1.0, 100.0]));
    let mut sampler = Nuts::new(&target, Metric::diag(arr1(&[1.0, 100.0]))).set_seed(42);
    sampler.base_mut().set_nominal_stepsize(1.5);

    let mut sample = Sample::new(arr1(&[0.1, 1.0]), 0.0, 1.0);
    let n = 10_000;
    let mut divergent = 0;
    for _ in 0..n {
        sample = sampler.transition(&sample);
        if sampler.divergent() {
            divergent += 1;
        }
    }
    let fraction = divergent as f64 / n as f64;
    assert!(fraction < 0.01, "divergent fraction = {fraction}");
}

#[test]
fn standard_normal_moments_are_recovered() {
    let target = StdNormal::new(2);
    let mut sampler = Nuts::new(&target, Metric::unit(2)).set_seed(7);
    sampler.base_mut().set_nominal_stepsize(0.4);

    let init = Sample::new(Array1::zeros(2), 0.0, 1.0);
    let draws = run(&mut sampler, init, 20_000, 500);

    let mean = draws.mean_axis(Axis(0)).unwrap();
    for i in 0..2 {
        assert!(mean[i].abs() < 0.06, "mean[{i}] = {}", mean[i]);
    }
    for i in 0..2 {
        let col = draws.column(i);
        let m = col.mean().unwrap();
        let var = col.mapv(|x| (x - m) * (x - m)).mean().unwrap();
        assert!((0.9..=1.1).contains(&var), "var[{i}] = {var}");
    }
}

#[test]
fn reports_the_published_parameter_names() {
    let target = StdNormal::new(1);
    let mut sampler = Nuts::new(&target, Metric::unit(1)).set_seed(1);
    sampler.base_mut().set_nominal_stepsize(0.5);
    let _ = sampler.transition(&Sample::new(Array1::zeros(1), 0.0, 1.0));

    assert_eq!(
        sampler.sampler_param_names(),
        vec![
            "stepsize__".to_string(),
            "treedepth__".to_string(),
            "n_leapfrog__".to_string(),
            "divergent__".to_string(),
            "energy__".to_string(),
        ]
    );
    let params = sampler.sampler_params();
    assert_eq!(params.len(), 5);
    assert_eq!(params[0], 0.5);
    assert_eq!(params[1], sampler.depth() as f64);
    assert_eq!(params[2], sampler.n_leapfrog() as f64);
    assert!(params[3] == 0.0 || params[3] == 1.0);
    assert!(params[4].is_finite());
}
