use log::warn;

use super::kernel::kernel;
use super::kernel::kernel_derivative;
use super::kernel::kernel_dh;
use super::tree::NeighbourTree;
use super::DensityEstimator;
use super::DensityResult;
use super::SphInput;
use crate::prelude::Float;

const MAX_HSML_ITERATIONS: usize = 100;

/// Cubic-spline density estimation over a periodic k-d tree, with
/// the smoothing length of each target iterated until the weighted
/// neighbour number hits the configured window.
pub struct SplineDensity;

struct TargetSums {
    density: Float,
    egy_wt_density: Float,
    weighted_ngb: Float,
    drho_dh: Float,
    div_vel: Float,
    curl_vel: [Float; 3],
    grad_rho: [Float; 3],
}

fn evaluate_target(
    input: &SphInput,
    tree: &NeighbourTree,
    target: usize,
    hsml: Float,
) -> TargetSums {
    let pos = input.positions[target];
    let ent_var = input.ent_var_pred[target];
    let mut sums = TargetSums {
        density: 0.0,
        egy_wt_density: 0.0,
        weighted_ngb: 0.0,
        drho_dh: 0.0,
        div_vel: 0.0,
        curl_vel: [0.0; 3],
        grad_rho: [0.0; 3],
    };
    for j in tree.within(pos, hsml) {
        let dist = input.box_.periodic_distance_vec(pos, input.positions[j]);
        let r = dist.length();
        let mass = input.masses[j];
        let wk = kernel(r, hsml);
        sums.density += mass * wk;
        sums.drho_dh += mass * kernel_dh(r, hsml);
        if ent_var > 0.0 && input.ent_var_pred[j] > 0.0 {
            sums.egy_wt_density += mass * input.ent_var_pred[j] * wk;
        }
        if r > 0.0 {
            let dwk = kernel_derivative(r, hsml);
            let dvel = input.velocities[target] - input.velocities[j];
            // dW/dr along the separation vector
            let fac = mass * dwk / r;
            sums.div_vel -= fac * dvel.dot(dist);
            let cross = dvel.cross(dist);
            sums.curl_vel[0] += fac * cross.x;
            sums.curl_vel[1] += fac * cross.y;
            sums.curl_vel[2] += fac * cross.z;
            sums.grad_rho[0] += fac * dist.x;
            sums.grad_rho[1] += fac * dist.y;
            sums.grad_rho[2] += fac * dist.z;
        }
    }
    sums
}

impl DensityEstimator for SplineDensity {
    fn density(&self, input: &SphInput, targets: &[usize], hsml: &[Float]) -> Vec<DensityResult> {
        let tree = NeighbourTree::build(input.box_, input.positions);
        let des_ngb = input.params.des_num_ngb;
        let deviation = input.params.max_num_ngb_deviation;
        targets
            .iter()
            .zip(hsml.iter())
            .map(|(&target, &hsml_start)| {
                let mut h = hsml_start;
                let mut left = 0.0;
                let mut right: Float = -1.0;
                let mut sums = evaluate_target(input, &tree, target, h);
                for iteration in 0.. {
                    let weighted =
                        4.0 * std::f64::consts::PI / 3.0 * h.powi(3) * sums.density
                            / input.masses[target].max(Float::MIN_POSITIVE);
                    sums.weighted_ngb = weighted;
                    if (weighted - des_ngb).abs() < deviation {
                        break;
                    }
                    if iteration >= MAX_HSML_ITERATIONS {
                        warn!(
                            "Smoothing length iteration for particle {} did not converge (ngb = {})",
                            target, weighted
                        );
                        break;
                    }
                    if weighted < des_ngb {
                        left = h;
                    } else {
                        right = h;
                    }
                    if right >= 0.0 {
                        if right - left < 1e-6 * right {
                            break;
                        }
                        h = 0.5 * (left + right);
                    } else {
                        h *= 1.26;
                    }
                    sums = evaluate_target(input, &tree, target, h);
                }
                finish_target(input, target, h, sums)
            })
            .collect()
    }
}

fn finish_target(
    input: &SphInput,
    target: usize,
    hsml: Float,
    sums: TargetSums,
) -> DensityResult {
    let density = sums.density;
    let ent_var = input.ent_var_pred[target];
    let egy_wt_density = if ent_var > 0.0 && sums.egy_wt_density > 0.0 {
        sums.egy_wt_density / ent_var
    } else {
        density
    };
    // the grad-h correction factor of the equation of motion
    let dhsml = if density > 0.0 {
        let omega = 1.0 + hsml / (3.0 * density) * sums.drho_dh;
        if omega.abs() > 1e-3 {
            1.0 / omega
        } else {
            1.0
        }
    } else {
        1.0
    };
    let (div_vel, curl_vel, grad_rho) = if density > 0.0 {
        let curl = (sums.curl_vel[0] * sums.curl_vel[0]
            + sums.curl_vel[1] * sums.curl_vel[1]
            + sums.curl_vel[2] * sums.curl_vel[2])
            .sqrt();
        (
            sums.div_vel / density,
            curl / density,
            crate::prelude::MVec::new(sums.grad_rho[0], sums.grad_rho[1], sums.grad_rho[2]),
        )
    } else {
        (0.0, 0.0, crate::prelude::MVec::ZERO)
    };
    DensityResult {
        density,
        egy_wt_density,
        dhsml_egy_density_factor: dhsml,
        hsml,
        num_ngb: sums.weighted_ngb,
        div_vel,
        curl_vel,
        grad_rho,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::MVec;
    use crate::providers::SphParameters;
    use crate::simulation_box::SimulationBox;

    fn uniform_lattice(n: usize, box_: &SimulationBox) -> Vec<MVec> {
        let mut positions = vec![];
        let spacing = box_.side_length / n as Float;
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    positions.push(MVec::new(
                        (i as Float + 0.5) * spacing,
                        (j as Float + 0.5) * spacing,
                        (k as Float + 0.5) * spacing,
                    ));
                }
            }
        }
        positions
    }

    #[test]
    fn uniform_lattice_recovers_mean_density() {
        let box_ = SimulationBox::new(1.0);
        let n = 6;
        let positions = uniform_lattice(n, &box_);
        let num = positions.len();
        let mass = 1.0 / num as Float;
        let masses = vec![mass; num];
        let velocities = vec![MVec::ZERO; num];
        let ent_var = vec![1.0; num];
        let params = SphParameters::default();
        let input = SphInput {
            box_: &box_,
            params: &params,
            positions: &positions,
            masses: &masses,
            velocities: &velocities,
            ent_var_pred: &ent_var,
        };
        let targets: Vec<_> = (0..num).collect();
        let hsml = vec![2.0 / n as Float; num];
        let results = SplineDensity.density(&input, &targets, &hsml);
        for result in results {
            // mean density of the box is 1
            assert!(
                (result.density - 1.0).abs() < 0.05,
                "density {}",
                result.density
            );
            assert!(
                (result.num_ngb - params.des_num_ngb).abs() <= params.max_num_ngb_deviation,
                "ngb {}",
                result.num_ngb
            );
            // uniform entropy variable: energy weighting is a no-op
            assert!((result.egy_wt_density - result.density).abs() < 1e-10);
            assert!(result.div_vel.abs() < 1e-10);
        }
    }
}
