//! Kinetic wind feedback. The subgrid variant kicks the star forming
//! particle itself; the fixed-efficiency and halo-velocity variants
//! walk the gas neighbourhood of newly born stars.

use bevy_ecs::prelude::Entity;
use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::With;
use bevy_ecs::prelude::Without;
use log::debug;

use super::parameters::WindParameters;
use crate::components::DelayTime;
use crate::components::GravityAccel;
use crate::components::Mass;
use crate::components::Position;
use crate::components::PredictedVelocity;
use crate::components::SmoothingLength;
use crate::components::StellarAge;
use crate::components::Velocity;
use crate::cosmology::CurrentTime;
use crate::particle::GasParticle;
use crate::particle::StarParticle;
use crate::prelude::*;
use crate::providers::tree::NeighbourTree;
use crate::rand::get_random_number;

const WIND_DM_NGB_TARGET: i64 = 40;

/// Puts a gas particle into the wind: kicks it with speed `v` along
/// the drawn direction and starts its free travel timer. `v` and
/// `vmean` are in internal units (comoving velocity), not physical.
#[allow(clippy::too_many_arguments)]
pub fn make_particle_wind(
    ct: &CurrentTime,
    wind: &WindParameters,
    id: u64,
    vel: &mut MVec,
    vel_pred: &mut MVec,
    delay_time: &mut Float,
    grav_accel: MVec,
    v: Float,
    vmean: MVec,
) {
    let mut dir;
    if wind.model.isotropic {
        let theta = (2.0 * get_random_number(id + 3) - 1.0).acos();
        let phi = 2.0 * std::f64::consts::PI * get_random_number(id + 4);
        dir = MVec::new(
            theta.sin() * phi.cos(),
            theta.sin() * phi.sin(),
            theta.cos(),
        );
    } else {
        let rel_vel = *vel - vmean;
        dir = grav_accel.cross(rel_vel);
    }

    let mut norm = dir.length();
    if get_random_number(id + 5) < 0.5 {
        norm = -norm;
    }
    if norm != 0.0 {
        dir /= norm;
        *vel += v * dir;
        *vel_pred += v * dir;
        *delay_time = wind.free_travel_length / (v / ct.a);
    }
}

type NewbornStars = (
    Entity,
    &'static ParticleId,
    &'static Position,
    &'static Mass,
    &'static SmoothingLength,
    &'static StellarAge,
);

type WindGas = (
    Entity,
    &'static ParticleId,
    &'static Position,
    &'static Mass,
    &'static mut Velocity,
    &'static mut PredictedVelocity,
    &'static mut DelayTime,
    &'static GravityAccel,
);

/// Wind launching for the star-driven variants: every star born in
/// this step sums the weight of its surrounding gas (and, for the
/// halo variant, measures the local dark matter velocity dispersion),
/// then kicks each neighbour probabilistically.
pub(super) fn wind_launch_system(
    ct: Res<CurrentTime>,
    wind: Res<WindParameters>,
    state: Res<super::model::SfrState>,
    box_: Res<SimulationBox>,
    stars: Particles<NewbornStars, (With<StarParticle>, Without<GasParticle>)>,
    mut gas: Particles<WindGas, With<GasParticle>>,
    dark_matter: Particles<
        (&Position, &Velocity, &ParticleType),
        (Without<GasParticle>, Without<StarParticle>),
    >,
) {
    if wind.model.is_none() || wind.model.subgrid {
        return;
    }
    let newborn: Vec<_> = stars
        .iter()
        .filter(|(_, _, _, _, _, age)| ct.a > 0.0 && age.0 == ct.a)
        .collect();
    if newborn.is_empty() {
        return;
    }

    let mut gas_entities = vec![];
    let mut gas_positions = vec![];
    for (entity, _, pos, ..) in gas.iter() {
        gas_entities.push(entity);
        gas_positions.push(pos.0);
    }
    let gas_tree = NeighbourTree::build(&box_, &gas_positions);

    let mut dm_positions = vec![];
    let mut dm_velocities = vec![];
    for (pos, vel, ptype) in dark_matter.iter() {
        if matches!(ptype, ParticleType::Halo) {
            dm_positions.push(pos.0);
            dm_velocities.push(vel.0);
        }
    }
    let dm_tree = NeighbourTree::build(&box_, &dm_positions);

    for (_, star_id, star_pos, star_mass, star_hsml, _) in newborn {
        // first pass: total weight of the surrounding gas
        let mut total_weight = 0.0;
        for j in gas_tree.within(star_pos.0, star_hsml.0) {
            let (_, _, _, mass, _, _, delay, _) = gas.get(gas_entities[j]).unwrap();
            // ignore wind particles
            if delay.0 > 0.0 {
                continue;
            }
            let wk = 1.0;
            total_weight += wk * mass.0;
        }

        // the halo variant measures the local dark matter velocity
        // dispersion inside a radius iterated to ~40 neighbours
        let (vdisp, vmean) = if wind.model.use_halo {
            measure_dm_kinematics(
                &ct,
                &box_,
                &dm_tree,
                &dm_positions,
                &dm_velocities,
                star_pos.0,
                2.0 * star_hsml.0,
            )
        } else {
            (0.0, MVec::ZERO)
        };

        if total_weight <= 0.0 {
            continue;
        }

        // second pass: launch
        for j in gas_tree.within(star_pos.0, star_hsml.0) {
            let (_, gas_id, _, _, _, _, delay, _) = gas.get(gas_entities[j]).unwrap();
            if delay.0 > 0.0 {
                continue;
            }
            let gas_id = gas_id.0;
            let (windeff, v) = if wind.model.use_halo {
                let mut windeff = 1.0 / (vdisp / ct.a / wind.sigma0);
                windeff *= windeff;
                (windeff, wind.speed_factor * vdisp)
            } else {
                (wind.efficiency, state.wind_speed * ct.a)
            };
            let wk = 1.0;
            let p = windeff * wk * star_mass.0 / total_weight;
            let random = get_random_number(star_id.0 + gas_id);
            if random < p {
                let (_, _, _, _, mut vel, mut vel_pred, mut delay, grav) =
                    gas.get_mut(gas_entities[j]).unwrap();
                make_particle_wind(
                    &ct,
                    &wind,
                    gas_id,
                    &mut vel.0,
                    &mut vel_pred.0,
                    &mut delay.0,
                    grav.0,
                    v,
                    vmean,
                );
            }
        }
    }
}

/// Bracketing bisection on the dark matter search radius: grow while
/// too few neighbours, shrink while too many, stop when the
/// neighbour count is in the window or the bracket collapses.
fn measure_dm_kinematics(
    ct: &CurrentTime,
    box_: &SimulationBox,
    dm_tree: &NeighbourTree,
    dm_positions: &[MVec],
    dm_velocities: &[MVec],
    center: MVec,
    start_radius: Float,
) -> (Float, MVec) {
    let mut radius = start_radius;
    let mut left = 0.0;
    let mut right: Float = -1.0;
    let mut neighbours = vec![];
    for iteration in 0..100 {
        neighbours = dm_tree.within(center, radius);
        let diff = neighbours.len() as i64 - WIND_DM_NGB_TARGET;
        if diff < -2 {
            // too few
            left = radius;
        } else if diff > 2 {
            // too many
            right = radius;
        } else {
            break;
        }
        if right >= 0.0 {
            if right - left < 1.0e-2 {
                break;
            }
            radius = 0.5 * (left + right);
        } else {
            radius *= 1.3;
        }
        debug!(
            "DM radius iteration {}: r = {:e}, ngb = {}",
            iteration,
            radius,
            neighbours.len()
        );
    }
    let count = neighbours.len().max(1) as Float;
    let mut v1sum = MVec::ZERO;
    let mut v2sum = 0.0;
    for &j in neighbours.iter() {
        let d = box_.periodic_distance_vec(center, dm_positions[j]);
        // include the hubble flow across the separation
        let vel = dm_velocities[j] + ct.hubble * ct.a * ct.a * d;
        v1sum += vel;
        v2sum += vel.length_squared();
    }
    let vmean = v1sum / count;
    let vdisp = (v2sum / count - vmean.length_squared()).max(0.0);
    ((vdisp / 3.0).sqrt(), vmean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmology::set_global_time;
    use crate::cosmology::Cosmology;
    use crate::sfr::parameters::WindModel;
    use crate::units::UnitSystem;

    fn context() -> (CurrentTime, WindParameters) {
        let ct = set_global_time(&Cosmology::NonCosmological, &UnitSystem::default(), 1.0);
        let wind = WindParameters {
            model: WindModel {
                subgrid: true,
                isotropic: true,
                ..Default::default()
            },
            free_travel_length: 20.0,
            ..Default::default()
        };
        (ct, wind)
    }

    #[test]
    fn wind_kick_sets_delay_to_travel_time() {
        let (ct, wind) = context();
        let mut vel = MVec::ZERO;
        let mut vel_pred = MVec::ZERO;
        let mut delay = 0.0;
        let v = 500.0;
        make_particle_wind(
            &ct,
            &wind,
            42,
            &mut vel,
            &mut vel_pred,
            &mut delay,
            MVec::ZERO,
            v,
            MVec::ZERO,
        );
        assert!((vel.length() - v).abs() < 1e-9);
        assert_eq!(vel, vel_pred);
        assert!((delay - wind.free_travel_length / (v / ct.a)).abs() < 1e-12);
    }

    #[test]
    fn wind_kick_is_reproducible() {
        let (ct, wind) = context();
        let mut kick = || {
            let mut vel = MVec::ZERO;
            let mut vel_pred = MVec::ZERO;
            let mut delay = 0.0;
            make_particle_wind(
                &ct,
                &wind,
                7,
                &mut vel,
                &mut vel_pred,
                &mut delay,
                MVec::ZERO,
                100.0,
                MVec::ZERO,
            );
            vel
        };
        assert_eq!(kick(), kick());
    }

    #[test]
    fn bipolar_direction_follows_accel_cross_velocity() {
        let (ct, mut wind) = context();
        wind.model.isotropic = false;
        let mut vel = MVec::new(1.0, 0.0, 0.0);
        let mut vel_pred = vel;
        let mut delay = 0.0;
        let grav = MVec::new(0.0, 1.0, 0.0);
        make_particle_wind(
            &ct,
            &wind,
            3,
            &mut vel,
            &mut vel_pred,
            &mut delay,
            grav,
            10.0,
            MVec::ZERO,
        );
        let kick = vel - MVec::new(1.0, 0.0, 0.0);
        // along +-z = (0,1,0) x (1,0,0)
        assert!(kick.x.abs() < 1e-12 && kick.y.abs() < 1e-12);
        assert!((kick.z.abs() - 10.0).abs() < 1e-9);
    }
}
