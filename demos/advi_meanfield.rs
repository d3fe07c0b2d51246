use gradient_inference::distributions::DiagGaussian;
use gradient_inference::variational::{Advi, MeanField, VariationalFamily};
use ndarray::{arr1, Array1};

/// Fits a mean-field family to a diagonal Gaussian with tuned step size and
/// prints the fitted location and scales.
fn main() {
    let target = DiagGaussian::new(arr1(&[1.0, -1.0, 0.5]), arr1(&[1.0, 4.0, 0.25]));

    let mut advi: Advi<_, MeanField> =
        Advi::new(&target, Array1::zeros(3), 10, 100, 100, 20)
            .set_seed(42)
            .with_print(Box::new(std::io::stdout()));

    let fitted = advi.run(0.0, 0.01, 10_000).expect("ADVI run failed");

    let mu = fitted.mean();
    let sd = fitted.stddev();
    println!("fitted mu: {:.3} {:.3} {:.3}", mu[0], mu[1], mu[2]);
    println!("fitted sd: {:.3} {:.3} {:.3}", sd[0], sd[1], sd[2]);
}

#[cfg(test)]
mod tests {
    use super::main;

    #[test]
    fn test_main() {
        main();
    }
}
