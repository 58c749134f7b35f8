//! Cooling and star formation for the effective multi-phase model,
//! with probabilistic star spawning and kinetic winds.

pub mod eos;
pub mod model;
pub mod parameters;
pub mod winds;

use bevy_ecs::prelude::Commands;
use bevy_ecs::prelude::Component;
use bevy_ecs::prelude::Entity;
use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::ResMut;
use bevy_ecs::prelude::With;
use derive_more::Deref;
use derive_more::DerefMut;
use derive_more::From;
use log::info;

use self::model::cooling_direct;
use self::model::cooling_relaxed;
use self::model::get_starformation_rate_full;
use self::model::sfr_condition;
use self::model::GasState;
use self::model::SfrContext;
use self::model::SfrState;
use self::model::METAL_YIELD;
use self::parameters::StarFormationParameters;
use self::parameters::WindParameters;
use self::winds::make_particle_wind;
use crate::communication::CollectiveCommunicator;
use crate::communication::Communicator;
use crate::communication::Operation;
use crate::components::CurlVel;
use crate::components::DelayTime;
use crate::components::Density;
use crate::components::DhsmlEgyDensityFactor;
use crate::components::DivVel;
use crate::components::DtEntropy;
use crate::components::EgyWtDensity;
use crate::components::ElectronAbundance;
use crate::components::EntVarPred;
use crate::components::Entropy;
use crate::components::GradRho;
use crate::components::HydroAccel;
use crate::components::MaxSignalVel;
use crate::components::NumNeighbours;
use crate::components::GravityAccel;
use crate::components::GravityPmAccel;
use crate::components::Mass;
use crate::components::Metallicity;
use crate::components::Position;
use crate::components::PredictedVelocity;
use crate::components::Sfr;
use crate::components::SmoothingLength;
use crate::components::StellarAge;
use crate::components::TiBegStep;
use crate::components::TimeBin;
use crate::components::Velocity;
use crate::cosmology::Cosmology;
use crate::cosmology::CurrentTime;
use crate::integrator::parameters::TimestepParameters;
use crate::integrator::LastStepTicks;
use crate::named::Named;
use crate::particle::GasParticle;
use crate::particle::StarParticle;
use crate::prelude::*;
use crate::providers::eom_density;
use crate::providers::Providers;
use crate::providers::SphParameters;
use crate::rand::get_random_number;
use crate::timebin::TimeBins;
use crate::timeline::Timeline;
use crate::units::UnitSystem;
use crate::units::SEC_PER_YEAR;
use crate::units::SOLAR_MASS;

/// Number of stars this gas particle has spawned so far; used to
/// derive the IDs of its descendants.
#[derive(Component, Debug, Clone, Copy, Default, Deref, DerefMut, From, Named)]
#[name = "stars_spawned"]
#[repr(transparent)]
pub struct StarsSpawned(pub u64);

#[derive(Named)]
pub struct SfrPlugin;

impl SubkickPlugin for SfrPlugin {
    fn build_everywhere(&self, sim: &mut Simulation) {
        sim.add_parameter_type::<StarFormationParameters>()
            .add_parameter_type::<WindParameters>()
            .add_startup_system_to_stage(
                StartupStages::DerivedParameters,
                derived_sfr_parameters_system,
            )
            .add_system_to_stage(Stages::SourceTerms, cooling_and_starformation_system)
            .add_system_to_stage(Stages::Winds, winds::wind_launch_system);
    }
}

/// Derives thresholds, two-phase energies, the wind speed and the
/// star particle mass; runs the equation of state pre-solve when the
/// density threshold is left open.
fn derived_sfr_parameters_system(
    mut commands: Commands,
    params: Res<StarFormationParameters>,
    wind: Res<WindParameters>,
    units: Res<UnitSystem>,
    cosmology: Res<Cosmology>,
    providers: Res<Providers>,
    gas: Particles<&Mass, With<GasParticle>>,
) {
    let mut state = eos::set_units_sfr(&params, &wind, &units, &cosmology);
    if params.star_formation_on {
        eos::init_clouds(&mut state, &params, &units, providers.cooling.as_ref());
    }
    let local: [Float; 2] = [
        gas.iter().map(|mass| mass.0).sum(),
        gas.iter().count() as Float,
    ];
    let mut comm = Communicator::<Float>::new();
    let global = comm.all_reduce_vec(&local, Operation::Sum);
    if global[1] > 0.0 {
        state.mass_of_star = global[0] / global[1] / params.generations as Float;
    }
    commands.insert_resource(state);
}

type SfrQueryA = (
    Entity,
    &'static ParticleId,
    &'static mut ParticleType,
    &'static mut Mass,
    &'static TimeBin,
    &'static TiBegStep,
    &'static Position,
    &'static mut Velocity,
);

type SfrQueryB = (
    &'static mut PredictedVelocity,
    &'static GravityAccel,
    &'static mut Entropy,
    &'static mut DtEntropy,
    &'static mut ElectronAbundance,
    &'static Density,
    &'static EgyWtDensity,
    &'static mut Sfr,
);

type SfrQueryC = (
    &'static mut Metallicity,
    &'static mut DelayTime,
    &'static DivVel,
    &'static CurlVel,
    &'static GradRho,
    &'static SmoothingLength,
    &'static mut StarsSpawned,
);

/// Cooling and star formation for the effective multi-phase model.
#[allow(clippy::too_many_arguments)]
fn cooling_and_starformation_system(
    mut commands: Commands,
    timeline: Res<Timeline>,
    ct: Res<CurrentTime>,
    units: Res<UnitSystem>,
    cosmology: Res<Cosmology>,
    params: Res<StarFormationParameters>,
    wind: Res<WindParameters>,
    timestep_params: Res<TimestepParameters>,
    sph_params: Res<SphParameters>,
    state: Res<SfrState>,
    last_step: Res<LastStepTicks>,
    world_rank: Res<WorldRank>,
    providers: Res<Providers>,
    mut timebins: ResMut<TimeBins>,
    mut gas: Particles<(SfrQueryA, SfrQueryB, SfrQueryC), With<GasParticle>>,
) {
    let uvbg = providers.cooling.global_uvbg(false);
    let ctx = SfrContext {
        params: &params,
        state: &state,
        ct: &ct,
        units: &units,
        cosmology: &cosmology,
        cooling: providers.cooling.as_ref(),
        uvbg,
        min_egy_spec: timestep_params.min_egy_spec,
    };
    let dloga_per_tick = timeline.dloga_interval(timeline.ti_current());

    let mut stars_spawned: i64 = 0;
    let mut stars_converted: i64 = 0;
    let mut sum_sm = 0.0;
    let mut sum_mass_stars = 0.0;

    let active: Vec<Entity> = timebins.active_particles().to_vec();
    for entity in active {
        let (a, b, c) = match gas.get_mut(entity) {
            Ok(item) => item,
            Err(_) => continue,
        };
        let (_, id, mut ptype, mut mass, bin, beg_step, position, mut velocity) = a;
        let (mut vel_pred, grav_accel, mut entropy, mut dt_entropy, mut ne, density, egy, mut sfr) =
            b;
        let (
            mut metallicity,
            mut delay_time,
            div_vel,
            curl_vel,
            grad_rho,
            hsml,
            mut stars_spawned_count,
        ) = c;

        let dt = if bin.0 > 0 {
            (1u64 << bin.0) as Float * dloga_per_tick
        } else {
            0.0
        };
        let dtime = dt / ct.hubble;

        // wind particles count down their free travel time and
        // recouple early once they reach low density
        if delay_time.0 > 0.0 {
            delay_time.0 -= dtime;
        }
        if delay_time.0 > 0.0 {
            if density.0 * ct.a3inv < wind.free_travel_dens_fac * state.phys_dens_thresh {
                delay_time.0 = 0.0;
            }
        } else {
            delay_time.0 = 0.0;
        }

        let eom = eom_density(&sph_params, density.0, egy.0);
        let gas_state = GasState {
            density: density.0,
            eom_density: eom,
            mass: mass.0,
            entropy: entropy.0,
            dt_entropy: dt_entropy.0,
            ne: ne.0,
            metallicity: metallicity.0,
            delay_time: delay_time.0,
            div_vel: div_vel.0,
            curl_vel: curl_vel.0,
            grad_rho: grad_rho.0,
            hsml: hsml.0,
        };
        let forming = sfr_condition(&ctx, &gas_state, dt);

        // normal implicit isochoric cooling
        if !forming || params.quick_lyman_alpha_probability > 0.0 {
            sfr.0 = 0.0;
            let (_, new_dt_entropy, new_ne) = cooling_direct(&ctx, &gas_state, dt, dtime, bin.0);
            dt_entropy.0 = new_dt_entropy;
            ne.0 = new_ne;
        }

        if !forming {
            continue;
        }

        // active star formation
        let rate = get_starformation_rate_full(&ctx, &gas_state, dtime, true);
        ne.0 = rate.ne;

        let sm = rate.rate * dtime;
        let p = sm / mass.0;
        sum_sm += mass.0 * (1.0 - (-p).exp());

        // in solar masses per year
        sfr.0 = rate.rate * (units.mass_in_g / SOLAR_MASS) / (units.time_in_s() / SEC_PER_YEAR);

        let w = get_random_number(id.0);
        metallicity.0 += w * METAL_YIELD * (1.0 - (-p).exp());

        if dt > 0.0 && bin.0 > 0 {
            // upon start-up we need to protect against dt == 0
            cooling_relaxed(
                &ctx,
                &mut entropy.0,
                &mut dt_entropy.0,
                eom,
                rate.egyeff,
                dtime,
                rate.trelax,
            );
        }

        let mut prob = if state.mass_of_star > 0.0 {
            mass.0 / state.mass_of_star * (1.0 - (-p).exp())
        } else {
            0.0
        };
        if params.quick_lyman_alpha_probability > 0.0 {
            prob = params.quick_lyman_alpha_probability;
        }

        let mut converted = false;
        if get_random_number(id.0 + 1) < prob {
            // here we make a star
            if mass.0 < 1.1 * state.mass_of_star || params.quick_lyman_alpha_probability > 0.0 {
                // turn the gas particle itself into a star
                stars_converted += 1;
                sum_mass_stars += mass.0;
                *ptype = ParticleType::Star;
                timebins.convert_sph(bin.0);
                // strip the SPH payload; the star keeps position,
                // momentum, metallicity and its smoothing length for
                // the wind walk
                commands
                    .entity(entity)
                    .remove::<GasParticle>()
                    .remove::<(
                        PredictedVelocity,
                        HydroAccel,
                        Entropy,
                        DtEntropy,
                        EntVarPred,
                        Density,
                        EgyWtDensity,
                        DhsmlEgyDensityFactor,
                        NumNeighbours,
                        DivVel,
                        CurlVel,
                        GradRho,
                        MaxSignalVel,
                    )>()
                    .remove::<(ElectronAbundance, Sfr, DelayTime, StarsSpawned)>()
                    .insert((StarParticle, StellarAge(ct.a)));
                converted = true;
            } else {
                stars_spawned_count.0 += 1;
                let child_id = id.0 + (stars_spawned_count.0 << 48);
                let child_mass = state.mass_of_star;
                mass.0 -= child_mass;
                sum_mass_stars += child_mass;
                stars_spawned += 1;
                commands.spawn((
                    LocalParticle,
                    StarParticle,
                    ParticleType::Star,
                    ParticleId(child_id),
                    Position(position.0),
                    Velocity(velocity.0),
                    Mass(child_mass),
                    TimeBin(bin.0),
                    TiBegStep(beg_step.0),
                    GravityAccel::default(),
                    GravityPmAccel::default(),
                    SmoothingLength(hsml.0),
                    StellarAge(ct.a),
                ));
            }
        }

        if !converted {
            // to protect using a particle that has been turned into
            // a star
            metallicity.0 += (1.0 - w) * METAL_YIELD * (1.0 - (-p).exp());
            if wind.model.subgrid {
                // the Springel & Hernquist subgrid wind
                let pw = wind.efficiency * sm / mass.0;
                let prob = 1.0 - (-pw).exp();
                if get_random_number(id.0 + 2) < prob {
                    make_particle_wind(
                        &ct,
                        &wind,
                        id.0,
                        &mut velocity.0,
                        &mut vel_pred.0,
                        &mut delay_time.0,
                        grav_accel.0,
                        state.wind_speed * ct.a,
                        MVec::ZERO,
                    );
                }
            }
        }
    }

    let mut comm = Communicator::<i64>::new();
    let tot_spawned = comm.all_reduce(&stars_spawned, Operation::Sum);
    let tot_converted = comm.all_reduce(&stars_converted, Operation::Sum);
    if (tot_spawned > 0 || tot_converted > 0) && world_rank.is_main() {
        info!(
            "SFR: spawned {} stars, converted {} gas particles into stars",
            tot_spawned, tot_converted
        );
    }

    let local_sfr: Float = gas.iter().map(|((..), (_, _, _, _, _, _, _, sfr), _)| sfr.0).sum();
    let mut fcomm = Communicator::<Float>::new();
    let reduced = fcomm.all_reduce_vec(&[local_sfr, sum_sm, sum_mass_stars], Operation::Sum);
    if world_rank.is_main() {
        let (total_sfr, total_sm, total_mass_stars) = (reduced[0], reduced[1], reduced[2]);
        let dloga_step = last_step.0 as Float * dloga_per_tick;
        let rate = if dloga_step > 0.0 {
            total_sm / (dloga_step / ct.hubble)
        } else {
            0.0
        };
        let rate_in_msunperyear =
            rate * (units.mass_in_g / SOLAR_MASS) / (units.time_in_s() / SEC_PER_YEAR);
        info!(
            "SFR: a={:.6e} total_sm={:.6e} totsfrrate={:.6e} rate={:.6e} Msun/yr mass_stars={:.6e}",
            ct.a, total_sm, total_sfr, rate_in_msunperyear, total_mass_stars
        );
    }
}
