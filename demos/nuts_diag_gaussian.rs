use gradient_inference::distributions::DiagGaussian;
use gradient_inference::io::StreamMetricWriter;
use gradient_inference::metric::Metric;
use gradient_inference::nuts::Nuts;
use gradient_inference::runner::run_progress;
use gradient_inference::sample::Sample;
use ndarray::{arr1, Axis};

/// Samples a badly scaled 2D Gaussian with NUTS under a matched diagonal
/// metric and prints the empirical moments.
fn main() {
    let target = DiagGaussian::new(arr1(&[0.0, 0.0]), arr1(&[1.0, 100.0]));
    let metric = Metric::diag(arr1(&[1.0, 100.0]));

    let mut writer = StreamMetricWriter::new(std::io::stdout());
    metric.write_metric(&mut writer);

    let mut sampler = Nuts::new(&target, metric).set_seed(42);
    sampler.base_mut().set_nominal_stepsize(1.2);

    let init = Sample::new(arr1(&[0.1, 1.0]), 0.0, 1.0);
    let draws = run_progress(&mut sampler, init, 5_000, 500);

    let mean = draws.mean_axis(Axis(0)).unwrap();
    println!("Collected {} draws", draws.nrows());
    println!("Empirical mean: {:.3} {:.3}", mean[0], mean[1]);
    for i in 0..2 {
        let col = draws.column(i);
        let m = col.mean().unwrap();
        let var = col.mapv(|x| (x - m) * (x - m)).mean().unwrap();
        println!("Empirical var[{i}]: {var:.3}");
    }
}
