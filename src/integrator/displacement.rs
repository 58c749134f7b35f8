//! The global displacement constraint: over a long-range step, the
//! rms displacement of each particle type must stay below a fraction
//! of the mean interparticle spacing.

use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::ResMut;
use bevy_ecs::prelude::Resource;
use log::debug;
use log::info;

use super::parameters::TimestepParameters;
use super::PmState;
use crate::communication::CollectiveCommunicator;
use crate::communication::Communicator;
use crate::communication::Operation;
use crate::components::Mass;
use crate::components::Velocity;
use crate::cosmology::Cosmology;
use crate::cosmology::CurrentTime;
use crate::prelude::Float;
use crate::prelude::ParticleType;
use crate::prelude::Particles;
use crate::timeline::IntegerTime;
use crate::timeline::Timeline;
use crate::timeline::TIMEBASE;
use crate::units::UnitSystem;

const NUM_TYPES: usize = ParticleType::NUM_TYPES;

/// The global cap on particle timesteps, in ticks. Recomputed once
/// per long-range step.
#[derive(Resource, Default, Clone, Copy)]
pub struct DisplacementConstraint {
    pub dti_max: IntegerTime,
}

struct TypeStats {
    v2: [Float; NUM_TYPES],
    count: [Float; NUM_TYPES],
    min_mass: [Float; NUM_TYPES],
}

fn gather_stats(particles: impl Iterator<Item = (ParticleType, Float, Float)>) -> TypeStats {
    let mut stats = TypeStats {
        v2: [0.0; NUM_TYPES],
        count: [0.0; NUM_TYPES],
        min_mass: [1.0e30; NUM_TYPES],
    };
    for (ptype, v2, mass) in particles {
        let class = ptype.softening_class();
        stats.v2[class] += v2;
        stats.count[class] += 1.0;
        if mass > 0.0 && stats.min_mass[class] > mass {
            stats.min_mass[class] = mass;
        }
    }
    stats
}

fn reduce_stats(stats: TypeStats) -> TypeStats {
    let mut comm = Communicator::<Float>::new();
    TypeStats {
        v2: comm
            .all_reduce_vec(&stats.v2, Operation::Sum)
            .try_into()
            .unwrap(),
        count: comm
            .all_reduce_vec(&stats.count, Operation::Sum)
            .try_into()
            .unwrap(),
        min_mass: comm
            .all_reduce_vec(&stats.min_mass, Operation::Min)
            .try_into()
            .unwrap(),
    }
}

fn constraint_ticks(
    mut stats: TypeStats,
    ct: &CurrentTime,
    cosmology: &Cosmology,
    units: &UnitSystem,
    params: &TimestepParameters,
    timeline: &Timeline,
    pm: &PmState,
) -> IntegerTime {
    let mut dt_disp = params.max_size_timestep;

    if cosmology.is_comoving() {
        // gas, stars and black holes are merged into the gas bucket:
        // they share the original gas particle spacing
        for merged in [4, 5] {
            stats.v2[0] += stats.v2[merged];
            stats.count[0] += stats.count[merged];
            stats.v2[merged] = stats.v2[0];
            stats.count[merged] = stats.count[0];
        }
        stats.min_mass[5] = stats.min_mass[0];

        let hubble = units.hubble();
        let g = units.g();
        for class in 0..NUM_TYPES {
            if stats.count[class] <= 0.0 {
                continue;
            }
            let omega = if class == 0 || class == 4 || class == 5 {
                cosmology.omega_baryon()
            } else {
                cosmology.omega_cdm()
            };
            if omega <= 0.0 {
                continue;
            }
            // "avg. radius" of the smallest particle:
            // (min_mass / mean matter density)^(1/3)
            let rho_mean = omega * 3.0 * hubble * hubble / (8.0 * std::f64::consts::PI * g);
            let dmean = (stats.min_mass[class] / rho_mean).powf(1.0 / 3.0);
            let scale = match params.mesh_smoothing_scale {
                Some(asmth) => asmth.min(dmean),
                None => dmean,
            };
            let vrms = (stats.v2[class] / stats.count[class]).sqrt();
            if vrms == 0.0 {
                continue;
            }
            let dt = params.max_rms_displacement_fac * ct.hubble * ct.a * ct.a * scale / vrms;
            debug!(
                "type={} dmean={:e} minmass={:e} a={:e} sqrt(<p^2>)={:e} dlogmax={:e}",
                class, dmean, stats.min_mass[class], ct.a, vrms, dt
            );
            if Some(class) != params.fast_particle_type && dt < dt_disp {
                dt_disp = dt;
            }
        }
    }

    let dloga_per_tick = timeline.dloga_interval(timeline.ti_current());
    if dloga_per_tick == 0.0 {
        return 0;
    }
    let mut ti_step = ((dt_disp / dloga_per_tick) as IntegerTime).min(TIMEBASE - 1);
    // Make sure that we finish the long-range step before the next
    // output. This is important for best restart accuracy: it ensures
    // that when the mesh and tree accelerations are reset, their
    // effect has already been included.
    if let Some(next_output) = timeline.find_next_sync_point(timeline.ti_current()) {
        if next_output.ti > pm.ti_endstep
            && (1.1 * ti_step as Float) as IntegerTime + pm.ti_endstep > next_output.ti
        {
            ti_step = next_output.ti - pm.ti_endstep;
        }
    }
    info!(
        "Maximal long-range timestep: {:e} ({:e})",
        ti_step as Float * dloga_per_tick,
        params.max_size_timestep
    );
    ti_step
}

pub(super) fn update_displacement_constraint(
    particles: impl Iterator<Item = (ParticleType, Float, Float)>,
    constraint: &mut DisplacementConstraint,
    ct: &CurrentTime,
    cosmology: &Cosmology,
    units: &UnitSystem,
    params: &TimestepParameters,
    timeline: &Timeline,
    pm: &PmState,
) {
    let stats = reduce_stats(gather_stats(particles));
    constraint.dti_max = constraint_ticks(stats, ct, cosmology, units, params, timeline, pm);
}

/// The startup computation of the constraint; afterwards it is
/// refreshed by the long-range kick.
pub(super) fn initial_displacement_constraint_system(
    particles: Particles<(&ParticleType, &Velocity, &Mass)>,
    mut constraint: ResMut<DisplacementConstraint>,
    ct: Res<CurrentTime>,
    cosmology: Res<Cosmology>,
    units: Res<UnitSystem>,
    params: Res<TimestepParameters>,
    timeline: Res<Timeline>,
    pm: Res<PmState>,
) {
    update_displacement_constraint(
        particles
            .iter()
            .map(|(ptype, vel, mass)| (*ptype, vel.length_squared(), mass.0)),
        &mut constraint,
        &ct,
        &cosmology,
        &units,
        &params,
        &timeline,
        &pm,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::SyncPointSpec;

    #[test]
    fn merged_buckets_and_minimum_over_types() {
        let cosmology = Cosmology::Cosmological {
            omega0: 0.3,
            omega_baryon: 0.04,
            omega_lambda: 0.7,
            hubble_param: 0.7,
        };
        let units = UnitSystem::default();
        let timeline = Timeline::setup(SyncPointSpec {
            time_ic: 0.1,
            time_max: 1.0,
            output_times: vec![],
            no_snapshot_until: None,
            snapshots_with_fof: false,
            uvbg_times: vec![],
        });
        let ct = crate::cosmology::set_global_time(&cosmology, &units, 0.1);
        let params = TimestepParameters::default();
        let pm = PmState::default();
        // slow dark matter, fast gas: the gas bucket should dominate
        let particles = vec![
            (ParticleType::Halo, 1.0, 1.0),
            (ParticleType::Gas, 1.0e6, 0.1),
            (ParticleType::Star, 1.0e6, 0.1),
        ];
        let mut constraint = DisplacementConstraint::default();
        update_displacement_constraint(
            particles.clone().into_iter(),
            &mut constraint,
            &ct,
            &cosmology,
            &units,
            &params,
            &timeline,
            &pm,
        );
        let with_gas = constraint.dti_max;
        let only_dm = vec![(ParticleType::Halo, 1.0, 1.0)];
        update_displacement_constraint(
            only_dm.into_iter(),
            &mut constraint,
            &ct,
            &cosmology,
            &units,
            &params,
            &timeline,
            &pm,
        );
        assert!(with_gas < constraint.dti_max);
    }

    #[test]
    fn fast_type_is_excluded() {
        let cosmology = Cosmology::Cosmological {
            omega0: 0.3,
            omega_baryon: 0.04,
            omega_lambda: 0.7,
            hubble_param: 0.7,
        };
        let units = UnitSystem::default();
        let timeline = Timeline::setup(SyncPointSpec {
            time_ic: 0.1,
            time_max: 1.0,
            output_times: vec![],
            no_snapshot_until: None,
            snapshots_with_fof: false,
            uvbg_times: vec![],
        });
        let ct = crate::cosmology::set_global_time(&cosmology, &units, 0.1);
        let mut params = TimestepParameters::default();
        let pm = PmState::default();
        let particles = vec![(ParticleType::Halo, 1.0e8, 1.0)];
        let mut constraint = DisplacementConstraint::default();
        update_displacement_constraint(
            particles.clone().into_iter(),
            &mut constraint,
            &ct,
            &cosmology,
            &units,
            &params,
            &timeline,
            &pm,
        );
        let constrained = constraint.dti_max;
        params.fast_particle_type = Some(1);
        update_displacement_constraint(
            particles.into_iter(),
            &mut constraint,
            &ct,
            &cosmology,
            &units,
            &params,
            &timeline,
            &pm,
        );
        assert!(constraint.dti_max > constrained);
    }
}
