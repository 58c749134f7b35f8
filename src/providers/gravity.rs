use super::GravityInput;
use super::GravitySolver;
use crate::prelude::MVec;

/// Softened direct summation over all periodic nearest images. The
/// production tree/mesh solvers plug in through the same trait; this
/// one exists to drive the integrator in tests and small problems.
pub struct DirectGravity;

impl GravitySolver for DirectGravity {
    fn short_range(&self, input: &GravityInput, targets: &[usize]) -> Vec<MVec> {
        targets
            .iter()
            .map(|&i| {
                let mut accel = MVec::ZERO;
                let pos_i = input.positions[i];
                for (j, pos_j) in input.positions.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let dist = input.box_.periodic_distance_vec(*pos_j, pos_i);
                    let softening = input.softenings[i].max(input.softenings[j]);
                    let r2 = dist.length_squared() + softening * softening;
                    accel += input.g * input.masses[j] * dist / r2.powf(1.5);
                }
                accel
            })
            .collect()
    }

    fn long_range(&self, input: &GravityInput) -> Vec<MVec> {
        // the whole force is short-range here
        vec![MVec::ZERO; input.positions.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Float;
    use crate::simulation_box::SimulationBox;

    #[test]
    fn two_body_force_is_newtonian_and_antisymmetric() {
        let box_ = SimulationBox::new(100.0);
        let positions = vec![MVec::new(50.0, 50.0, 50.0), MVec::new(51.0, 50.0, 50.0)];
        let masses = vec![2.0, 3.0];
        let softenings = vec![0.0, 0.0];
        let input = GravityInput {
            box_: &box_,
            g: 1.0,
            positions: &positions,
            masses: &masses,
            softenings: &softenings,
        };
        let accel = DirectGravity.short_range(&input, &[0, 1]);
        assert!((accel[0].x - 3.0).abs() < 1e-12);
        assert!((accel[1].x + 2.0).abs() < 1e-12);
        let momentum_rate: Float = 2.0 * accel[0].x + 3.0 * accel[1].x;
        assert!(momentum_rate.abs() < 1e-12);
    }

    #[test]
    fn force_goes_through_the_periodic_boundary() {
        let box_ = SimulationBox::new(10.0);
        let positions = vec![MVec::new(0.5, 5.0, 5.0), MVec::new(9.5, 5.0, 5.0)];
        let masses = vec![1.0, 1.0];
        let softenings = vec![0.0, 0.0];
        let input = GravityInput {
            box_: &box_,
            g: 1.0,
            positions: &positions,
            masses: &masses,
            softenings: &softenings,
        };
        let accel = DirectGravity.short_range(&input, &[0]);
        // the nearest image of particle 1 is at x = -0.5
        assert!(accel[0].x < 0.0);
        assert!((accel[0].x + 1.0).abs() < 1e-12);
    }
}
