//! Symplectic integrators for the Hamiltonian samplers.

use crate::distributions::Model;
use crate::metric::Hamiltonian;
use crate::point::PhasePoint;

/// One integration step of size `epsilon` through the Hamiltonian flow.
pub trait Integrator<M: Model> {
    fn evolve(&self, z: &mut PhasePoint, hamiltonian: &Hamiltonian<'_, M>, epsilon: f64);
}

/// Explicit leapfrog for separable Hamiltonians: half momentum kick, full
/// position drift, potential refresh, half momentum kick. Reversible and
/// symplectic.
///
/// A failed or non-finite potential refresh leaves the point with
/// `V = +∞`, so the enclosing transition sees a non-finite `H` and rejects.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExplLeapfrog;

impl<M: Model> Integrator<M> for ExplLeapfrog {
    fn evolve(&self, z: &mut PhasePoint, hamiltonian: &Hamiltonian<'_, M>, epsilon: f64) {
        let half = 0.5 * epsilon;
        z.p.zip_mut_with(&z.g, |p, &g| *p -= half * g);
        hamiltonian.drift(z, epsilon);
        hamiltonian.init(z);
        z.p.zip_mut_with(&z.g, |p, &g| *p -= half * g);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::StdNormal;
    use crate::metric::Metric;
    use ndarray::arr1;

    #[test]
    fn step_forward_then_backward_returns_to_start() {
        let model = StdNormal::new(3);
        let hamiltonian = Hamiltonian::new(&model, Metric::unit(3));
        let integrator = ExplLeapfrog;

        let mut z = PhasePoint::new(3);
        z.q.assign(&arr1(&[0.3, -1.1, 2.0]));
        z.p.assign(&arr1(&[1.0, 0.5, -0.25]));
        hamiltonian.init(&mut z);
        let z0 = z.clone();

        integrator.evolve(&mut z, &hamiltonian, 0.1);
        integrator.evolve(&mut z, &hamiltonian, -0.1);

        for i in 0..3 {
            assert!((z.q[i] - z0.q[i]).abs() < 1e-12);
            assert!((z.p[i] - z0.p[i]).abs() < 1e-12);
        }
    }
}
