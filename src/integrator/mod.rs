//! The kick/drift integrator: hierarchical timestep assignment,
//! leapfrog kicks at bin boundaries, the long-range kick and the
//! position drift between kick times.

pub mod criteria;
pub mod displacement;
pub mod kick;
pub mod parameters;
pub mod softening;

use bevy_ecs::prelude::Entity;
use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::ResMut;
use bevy_ecs::prelude::Resource;
use bevy_ecs::prelude::With;
use bevy_ecs::schedule::IntoSystemDescriptor;
use log::info;

use self::criteria::get_timestep;
use self::criteria::get_timestep_bin;
use self::criteria::GasTimestepData;
use self::criteria::TimestepData;
use self::displacement::DisplacementConstraint;
use self::kick::do_the_kick;
use self::kick::GasKick;
use self::kick::KickContext;
use self::parameters::SofteningParameters;
use self::parameters::TimestepParameters;
use self::softening::SofteningTable;
use crate::communication::CollectiveCommunicator;
use crate::communication::Communicator;
use crate::communication::Operation;
use crate::components::BlackHole;
use crate::components::CurlVel;
use crate::components::Density;
use crate::components::DhsmlEgyDensityFactor;
use crate::components::DivVel;
use crate::components::DtEntropy;
use crate::components::EgyWtDensity;
use crate::components::EntVarPred;
use crate::components::Entropy;
use crate::components::GradRho;
use crate::components::GravityAccel;
use crate::components::GravityPmAccel;
use crate::components::HydroAccel;
use crate::components::Mass;
use crate::components::MaxSignalVel;
use crate::components::NumNeighbours;
use crate::components::Position;
use crate::components::PredictedVelocity;
use crate::components::Sfr;
use crate::components::SmoothingLength;
use crate::components::TiBegStep;
use crate::components::TimeBin;
use crate::components::Velocity;
use crate::cosmology::get_drift_factor;
use crate::cosmology::get_gravkick_factor;
use crate::cosmology::set_global_time;
use crate::cosmology::Cosmology;
use crate::cosmology::CurrentTime;
use crate::endrun;
use crate::hash_map::HashMap;
use crate::hash_map::HashSet;
use crate::named::Named;
use crate::particle::GasParticle;
use crate::prelude::*;
use crate::providers::eom_density;
use crate::providers::GravityInput;
use crate::providers::HydroInput;
use crate::providers::Providers;
use crate::providers::SphInput;
use crate::providers::SphParameters;
use crate::simulation_plugin::SimulationParameters;
use crate::timebin::TimeBins;
use crate::timeline::round_down_power_of_two;
use crate::timeline::IntegerTime;
use crate::timeline::Timeline;
use crate::units::UnitSystem;
use crate::units::GAMMA;

/// The clock of the long-range (particle-mesh) kick.
#[derive(Resource, Default, Clone, Copy)]
pub struct PmState {
    pub ti_begstep: IntegerTime,
    pub ti_endstep: IntegerTime,
}

/// The kick time the current step is heading towards; set at the
/// beginning of every step.
#[derive(Resource, Default, Clone, Copy)]
pub struct NextKickTime(pub IntegerTime);

/// The number of ticks the clock advanced in the current step.
#[derive(Resource, Default, Clone, Copy)]
pub struct LastStepTicks(pub IntegerTime);

#[derive(Named)]
pub struct IntegratorPlugin;

impl SubkickPlugin for IntegratorPlugin {
    fn build_everywhere(&self, sim: &mut Simulation) {
        let cosmology = *sim.add_parameter_type_and_get_result::<Cosmology>();
        let units = *sim.add_parameter_type_and_get_result::<UnitSystem>();
        let sim_params = sim
            .add_parameter_type_and_get_result::<SimulationParameters>()
            .clone();
        let softening_params = *sim.add_parameter_type_and_get_result::<SofteningParameters>();
        sim.add_parameter_type::<TimestepParameters>()
            .add_parameter_type::<SphParameters>();
        let ct = set_global_time(&cosmology, &units, sim_params.time_begin);
        sim.insert_resource(ct)
            .insert_resource(SofteningTable::new(&softening_params, ct.a))
            .insert_resource(PmState::default())
            .insert_resource(NextKickTime::default())
            .insert_resource(LastStepTicks::default())
            .insert_resource(DisplacementConstraint::default())
            .add_startup_system_to_stage(
                StartupStages::Final,
                displacement::initial_displacement_constraint_system,
            )
            .add_system_to_stage(Stages::Drift, drift_system)
            .add_system_to_stage(Stages::ForceCalculation, gravity_forces_system)
            .add_system_to_stage(
                Stages::ForceCalculation,
                density_system.after(gravity_forces_system),
            )
            .add_system_to_stage(Stages::ForceCalculation, hydro_system.after(density_system))
            .add_system_to_stage(Stages::Integration, advance_and_find_timesteps_system)
            .add_system_to_stage(
                Stages::Integration,
                kick::long_range_kick_system.after(advance_and_find_timesteps_system),
            );
    }
}

/// Moves positions forward to the next kick time, advances the
/// integer clock and refreshes the time-dependent global factors and
/// the predicted entropy variables.
fn drift_system(
    mut timeline: ResMut<Timeline>,
    next_kick: Res<NextKickTime>,
    cosmology: Res<Cosmology>,
    units: Res<UnitSystem>,
    mut ct: ResMut<CurrentTime>,
    mut softening: ResMut<SofteningTable>,
    softening_params: Res<SofteningParameters>,
    box_: Res<SimulationBox>,
    mut last_step: ResMut<LastStepTicks>,
    mut particles: Particles<(
        &mut Position,
        &Velocity,
        Option<(&mut EntVarPred, &Entropy, &DtEntropy, &TiBegStep)>,
    )>,
) {
    let ti0 = timeline.ti_current();
    let ti1 = next_kick.0;
    last_step.0 = ti1.saturating_sub(ti0);
    if ti1 > ti0 {
        let drift = get_drift_factor(&cosmology, &units, &timeline, ti0, ti1);
        for (mut pos, vel, _) in particles.iter_mut() {
            **pos += vel.0 * drift;
            **pos = box_.periodic_wrap(pos.0);
        }
        timeline.advance(ti1);
        *ct = set_global_time(&cosmology, &units, timeline.a_from_ti(ti1));
        softening.update(&softening_params, ct.a);
    }
    let dloga_per_tick = timeline.dloga_interval(ti1);
    for (_, _, gas) in particles.iter_mut() {
        if let Some((mut ent_var_pred, entropy, dt_entropy, beg_step)) = gas {
            let dloga = dloga_per_tick * ti1.saturating_sub(beg_step.0) as Float;
            let predicted = (entropy.0 + dt_entropy.0 * dloga).max(0.5 * entropy.0);
            ent_var_pred.0 = predicted.max(Float::MIN_POSITIVE).powf(1.0 / GAMMA);
        }
    }
}

/// Runs the short-range gravity provider on the active set and, at
/// long-range step boundaries, the mesh provider on all particles.
fn gravity_forces_system(
    timebins: Res<TimeBins>,
    providers: Res<Providers>,
    box_: Res<SimulationBox>,
    units: Res<UnitSystem>,
    softening: Res<SofteningTable>,
    timeline: Res<Timeline>,
    pm: Res<PmState>,
    mut particles: Particles<(
        Entity,
        &Position,
        &Mass,
        &ParticleType,
        &mut GravityAccel,
        &mut GravityPmAccel,
    )>,
) {
    let mut entities = vec![];
    let mut positions = vec![];
    let mut masses = vec![];
    let mut softenings = vec![];
    let mut index_of = HashMap::default();
    for (entity, pos, mass, ptype, _, _) in particles.iter() {
        index_of.insert(entity, entities.len());
        entities.push(entity);
        positions.push(pos.0);
        masses.push(mass.0);
        softenings.push(softening.plummer(ptype.softening_class()));
    }
    let input = GravityInput {
        box_: &box_,
        g: units.g(),
        positions: &positions,
        masses: &masses,
        softenings: &softenings,
    };
    let targets: Vec<usize> = timebins
        .active_particles()
        .iter()
        .filter_map(|entity| index_of.get(entity).copied())
        .collect();
    let accels = providers.gravity.short_range(&input, &targets);
    for (&index, accel) in targets.iter().zip(accels.into_iter()) {
        if let Ok((_, _, _, _, mut grav, _)) = particles.get_mut(entities[index]) {
            grav.0 = accel;
        }
    }
    if pm.ti_endstep == timeline.ti_current() {
        let accels = providers.gravity.long_range(&input);
        for (index, accel) in accels.into_iter().enumerate() {
            if let Ok((_, _, _, _, _, mut grav_pm)) = particles.get_mut(entities[index]) {
                grav_pm.0 = accel;
            }
        }
    }
}

/// Runs the density estimator on the active gas.
fn density_system(
    timebins: Res<TimeBins>,
    providers: Res<Providers>,
    box_: Res<SimulationBox>,
    sph_params: Res<SphParameters>,
    softening: Res<SofteningTable>,
    mut gas: Particles<
        (
            Entity,
            &Position,
            &Mass,
            &PredictedVelocity,
            &EntVarPred,
            &mut SmoothingLength,
            &mut Density,
            &mut EgyWtDensity,
            &mut DhsmlEgyDensityFactor,
            &mut NumNeighbours,
            &mut DivVel,
            &mut CurlVel,
            &mut GradRho,
        ),
        With<GasParticle>,
    >,
) {
    let mut entities = vec![];
    let mut positions = vec![];
    let mut masses = vec![];
    let mut velocities = vec![];
    let mut ent_var = vec![];
    let mut hsml = vec![];
    let mut index_of = HashMap::default();
    for (entity, pos, mass, vel, ent, h, ..) in gas.iter() {
        index_of.insert(entity, entities.len());
        entities.push(entity);
        positions.push(pos.0);
        masses.push(mass.0);
        velocities.push(vel.0);
        ent_var.push(ent.0);
        hsml.push(h.0);
    }
    let active: HashSet<Entity> = timebins.active_particles().iter().copied().collect();
    let targets: Vec<usize> = entities
        .iter()
        .enumerate()
        .filter(|(_, entity)| active.contains(entity))
        .map(|(index, _)| index)
        .collect();
    if targets.is_empty() {
        return;
    }
    let input = SphInput {
        box_: &box_,
        params: &sph_params,
        positions: &positions,
        masses: &masses,
        velocities: &velocities,
        ent_var_pred: &ent_var,
    };
    let start_hsml: Vec<Float> = targets.iter().map(|&index| hsml[index]).collect();
    let results = providers.density.density(&input, &targets, &start_hsml);
    for (&index, result) in targets.iter().zip(results.into_iter()) {
        if let Ok((_, _, _, _, _, mut h, mut density, mut egy, mut dhsml, mut ngb, mut div, mut curl, mut grad)) =
            gas.get_mut(entities[index])
        {
            h.0 = result.hsml.max(softening.min_gas_hsml());
            density.0 = result.density;
            egy.0 = result.egy_wt_density;
            dhsml.0 = result.dhsml_egy_density_factor;
            ngb.0 = result.num_ngb;
            div.0 = result.div_vel;
            curl.0 = result.curl_vel;
            grad.0 = result.grad_rho;
        }
    }
}

/// Runs the hydrodynamic force provider on the active gas.
fn hydro_system(
    timebins: Res<TimeBins>,
    providers: Res<Providers>,
    mut gas: Particles<
        (
            Entity,
            &Density,
            &Entropy,
            &mut HydroAccel,
            &mut MaxSignalVel,
            &mut DtEntropy,
        ),
        With<GasParticle>,
    >,
) {
    let active: HashSet<Entity> = timebins.active_particles().iter().copied().collect();
    let mut entities = vec![];
    let mut densities = vec![];
    let mut entropies = vec![];
    let mut entropy_rates = vec![];
    for (entity, density, entropy, _, _, dt_entropy) in gas.iter() {
        if active.contains(&entity) {
            entities.push(entity);
            densities.push(density.0);
            entropies.push(entropy.0);
            entropy_rates.push(dt_entropy.0);
        }
    }
    if entities.is_empty() {
        return;
    }
    let results = providers.hydro.evaluate(&HydroInput {
        density: &densities,
        entropy: &entropies,
        dt_entropy: &entropy_rates,
    });
    for (entity, result) in entities.into_iter().zip(results.into_iter()) {
        if let Ok((_, _, _, mut accel, mut signal, mut dt_entropy)) = gas.get_mut(entity) {
            accel.0 = result.accel;
            signal.0 = result.max_signal_vel;
            dt_entropy.0 = result.dt_entropy;
        }
    }
}

type AdvanceQuery = (
    Entity,
    &'static ParticleId,
    &'static ParticleType,
    &'static mut TimeBin,
    &'static mut TiBegStep,
    &'static mut Velocity,
    &'static GravityAccel,
    &'static GravityPmAccel,
    &'static Position,
    Option<(
        &'static mut PredictedVelocity,
        &'static mut Entropy,
        &'static mut DtEntropy,
        &'static HydroAccel,
        &'static MaxSignalVel,
        &'static SmoothingLength,
        &'static Density,
        &'static EgyWtDensity,
        &'static Sfr,
    )>,
    Option<&'static BlackHole>,
);

struct AdvanceRow {
    entity: Entity,
    id: u64,
    ptype: ParticleType,
    bin_old: usize,
    position: MVec,
    grav_accel: MVec,
    grav_pm: MVec,
    gas: Option<GasTimestepData>,
    eom_density: Float,
    bh: Option<BlackHole>,
}

impl AdvanceRow {
    fn timestep_data(&self) -> TimestepData {
        TimestepData {
            id: self.id,
            ptype: self.ptype,
            position: self.position,
            grav_accel: self.grav_accel,
            grav_pm: self.grav_pm,
            gas: self.gas.as_ref().map(|gas| GasTimestepData {
                hydro_accel: gas.hydro_accel,
                hsml: gas.hsml,
                max_signal_vel: gas.max_signal_vel,
                density: gas.density,
                sfr: gas.sfr,
            }),
            bh: self.bh.as_ref(),
        }
    }
}

/// This function advances the system in momentum space, i.e. it does
/// apply the 'kick' operation after the forces have been computed.
/// Additionally, it assigns new timesteps to particles. At start-up,
/// a half-timestep is carried out, as well as at the end of the
/// simulation. In between, the half-step kick that ends the previous
/// timestep and the half-step kick for the new timestep are combined
/// into one operation.
///
/// Two-phase: timesteps are derived from a read-only snapshot of the
/// active set, then bins and momenta are updated. This keeps the
/// assignment pass trivially parallel and serializes the list
/// surgery.
#[allow(clippy::too_many_arguments)]
fn advance_and_find_timesteps_system(
    timeline: Res<Timeline>,
    mut timebins: ResMut<TimeBins>,
    ct: Res<CurrentTime>,
    cosmology: Res<Cosmology>,
    units: Res<UnitSystem>,
    params: Res<TimestepParameters>,
    sph_params: Res<SphParameters>,
    softening: Res<SofteningTable>,
    constraint: Res<DisplacementConstraint>,
    pm: Res<PmState>,
    providers: Res<Providers>,
    mut particles: Particles<AdvanceQuery>,
) {
    let ti_current = timeline.ti_current();
    let pm_half = (pm.ti_begstep + pm.ti_endstep) / 2;
    let dt_gravkick_pm =
        get_gravkick_factor(&cosmology, &units, &timeline, pm.ti_begstep, ti_current)
            - get_gravkick_factor(&cosmology, &units, &timeline, pm.ti_begstep, pm_half);

    // phase one: snapshot the active particles
    let rows: Vec<AdvanceRow> = timebins
        .active_particles()
        .iter()
        .filter_map(|&entity| {
            let (_, id, ptype, bin, _, _, grav, grav_pm, pos, gas, bh) =
                particles.get(entity).ok()?;
            Some(AdvanceRow {
                entity,
                id: id.0,
                ptype: *ptype,
                bin_old: bin.0,
                position: pos.0,
                grav_accel: grav.0,
                grav_pm: grav_pm.0,
                gas: gas.as_ref().map(|(_, _, _, hydro, signal, hsml, density, _, sfr)| {
                    GasTimestepData {
                        hydro_accel: hydro.0,
                        hsml: hsml.0,
                        max_signal_vel: signal.0,
                        density: density.0,
                        sfr: sfr.0,
                    }
                }),
                eom_density: gas
                    .as_ref()
                    .map(|(_, _, _, _, _, _, density, egy, _)| {
                        eom_density(&sph_params, density.0, egy.0)
                    })
                    .unwrap_or(0.0),
                bh: bh.cloned(),
            })
        })
        .collect();

    // with globally equal timesteps, find the smallest requested
    // step across all ranks first
    let forced_step = if params.force_equal_timesteps {
        let mut ti_min = constraint.dti_max.max(1);
        for row in rows.iter() {
            let ti_step = get_timestep(
                &row.timestep_data(),
                &ct,
                &params,
                &softening,
                &timeline,
                constraint.dti_max,
            )
            .unwrap_or(1);
            ti_min = ti_min.min(ti_step);
        }
        let mut comm = Communicator::<IntegerTime>::new();
        Some(comm.all_reduce(&ti_min, Operation::Min))
    } else {
        None
    };

    let kick_ctx = KickContext {
        timeline: &timeline,
        cosmology: &cosmology,
        units: &units,
        ct: &ct,
        params: &params,
    };

    let run_complete = timeline.find_next_sync_point(ti_current).is_none();
    let mut bad_step_count: i64 = 0;

    // phase two: assign bins, update counts, kick
    for row in rows.iter() {
        let requested = match forced_step {
            Some(step) => Ok(step),
            None => get_timestep(
                &row.timestep_data(),
                &ct,
                &params,
                &softening,
                &timeline,
                constraint.dti_max,
            ),
        };
        let requested = match requested {
            Ok(requested) => requested,
            Err(bad) => {
                log::warn!("{}", bad.message);
                bad_step_count += 1;
                continue;
            }
        };
        // make it a power of two subdivision
        let mut ti_step = round_down_power_of_two(requested);

        let mut bin = match get_timestep_bin(ti_step) {
            Some(bin) => bin,
            None => {
                log::warn!(
                    "Time-step of integer size {} not allowed, id = {}",
                    ti_step,
                    row.id
                );
                bad_step_count += 1;
                continue;
            }
        };
        let binold = row.bin_old;

        if bin > binold {
            // timestep wants to increase: make sure the new step is
            // currently active, so that particles do not miss a kick
            // boundary
            while !timebins.is_bin_active(bin) && bin > binold {
                bin -= 1;
            }
            ti_step = if bin > 0 { 1 << bin } else { 0 };
        }

        if run_complete {
            // we here finish the last timestep
            ti_step = 0;
            bin = 0;
        }

        if let Some(next_sync) = timeline.find_next_sync_point(ti_current) {
            if next_sync.ti - ti_current < ti_step {
                endrun!(
                    888,
                    "Integer timeline ran past the next sync point: {} - {} < {}",
                    next_sync.ti,
                    ti_current,
                    ti_step
                );
            }
        }

        // this moves particles between time bins: active particles
        // always remain active until the lists are rebuilt
        if bin != binold {
            timebins.apply_bin_change(binold, bin, row.ptype.is_gas());
        }

        let ti_step_old = if binold > 0 { 1 << binold } else { 0 };

        let (_, _, _, mut bin_comp, mut beg_step, mut vel, _, _, _, gas, _) =
            match particles.get_mut(row.entity) {
                Ok(item) => item,
                Err(_) => continue,
            };
        bin_comp.0 = bin;
        let tstart = beg_step.0 + ti_step_old / 2; // midpoint of old step
        let tend = beg_step.0 + ti_step_old + ti_step / 2; // midpoint of new step
        beg_step.0 += ti_step_old;
        let tcurrent = beg_step.0;

        let gas_kick = gas.map(|(vel_pred, entropy, dt_entropy, hydro, _, _, _, _, _)| GasKick {
            vel_pred: &mut vel_pred.into_inner().0,
            entropy: &mut entropy.into_inner().0,
            dt_entropy: &mut dt_entropy.into_inner().0,
            hydro_accel: hydro.0,
            grav_pm: row.grav_pm,
            eom_density: row.eom_density,
            time_bin: bin,
        });
        do_the_kick(
            &kick_ctx,
            tstart,
            tend,
            tcurrent,
            dt_gravkick_pm,
            &mut vel.0,
            row.grav_accel,
            gas_kick,
        );
    }

    // check whether any particles had a bad timestep
    let mut comm = Communicator::<i64>::new();
    let bad_step_global = comm.all_reduce(&bad_step_count, Operation::Sum);
    if bad_step_global > 0 {
        info!("bad timestep spotted: terminating and saving snapshot.");
        providers.snapshots.write_snapshot(999999, ti_current);
        endrun!(2, "Ending due to bad timestep");
    }
}
