//! The step driver: sync point table construction, per-step active
//! set determination, output handling and the stop condition.

mod parameters;

use bevy_ecs::event::EventReader;
use bevy_ecs::event::EventWriter;
use bevy_ecs::prelude::Commands;
use bevy_ecs::prelude::Entity;
use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::ResMut;
use bevy_ecs::prelude::Resource;
use bevy_ecs::schedule::IntoSystemDescriptor;
use log::debug;
use log::info;

pub use self::parameters::OutputParameters;
pub use self::parameters::SimulationParameters;
use crate::command_line_options::RestartOptions;
use crate::communication::CollectiveCommunicator;
use crate::communication::Communicator;
use crate::components::TimeBin;
use crate::cosmology::Cosmology;
use crate::integrator::IntegratorPlugin;
use crate::integrator::NextKickTime;
use crate::named::Named;
use crate::prelude::*;
use crate::providers::Providers;
use crate::simulation::ShouldExit;
use crate::timebin::TimeBins;
use crate::timeline::IntegerTime;
use crate::timeline::SyncPointSpec;
use crate::timeline::Timeline;
use crate::units::UnitSystem;

pub struct StopSimulationEvent;

/// Running number of the next snapshot to be written.
#[derive(Resource, Default)]
struct SnapshotCounter(i64);

/// Guards against writing the same sync point twice when the clock
/// does not advance.
#[derive(Resource, Default)]
struct LastOutputTi(Option<IntegerTime>);

#[derive(Named)]
pub struct SimulationPlugin;

impl SubkickPlugin for SimulationPlugin {
    fn build_everywhere(&self, sim: &mut Simulation) {
        sim.add_parameter_type::<SimulationParameters>()
            .add_parameter_type::<OutputParameters>();
        if !sim.contains_resource::<Providers>() {
            let units = *sim.add_parameter_type_and_get_result::<UnitSystem>();
            sim.insert_resource(Providers::reference(&units));
        }
        let snapshot_counter = sim
            .get_resource::<RestartOptions>()
            .and_then(|options| options.snapshot)
            .map(|num| num + 1)
            .unwrap_or(0);
        sim.add_plugin(IntegratorPlugin)
            .insert_resource(TimeBins::new())
            .insert_resource(SnapshotCounter(snapshot_counter))
            .insert_resource(LastOutputTi::default())
            .add_event::<StopSimulationEvent>()
            .add_startup_system_to_stage(StartupStages::InitTimeline, setup_timeline_system)
            .add_system_to_stage(Stages::BeginStep, begin_step_system)
            .add_system_to_stage(Stages::Output, output_system)
            .add_system_to_stage(Stages::Final, stop_simulation_system)
            .add_system_to_stage(Stages::Final, handle_exit_system.after(stop_simulation_system));
    }
}

fn setup_timeline_system(
    mut commands: Commands,
    sim_params: Res<SimulationParameters>,
    output: Res<OutputParameters>,
    cosmology: Res<Cosmology>,
    units: Res<UnitSystem>,
) {
    let uvbg_times = match output.uvbg_interval_myr {
        Some(interval) => cosmology.uvbg_event_times(
            &units,
            sim_params.time_max,
            output.uvbg_start_redshift,
            interval,
        ),
        None => vec![],
    };
    let mut timeline = Timeline::setup(SyncPointSpec {
        time_ic: sim_params.time_ic(),
        time_max: sim_params.time_max,
        output_times: output.output_times.clone(),
        no_snapshot_until: output.no_snapshot_until,
        snapshots_with_fof: output.snapshots_with_fof,
        uvbg_times,
    });
    if sim_params.time_begin > sim_params.time_ic() {
        // resuming: position the clock at the snapshot stamp
        let ti = timeline.ti_from_loga(sim_params.time_begin.ln());
        timeline.advance(ti);
    }
    info!(
        "Timeline spans [{:e}, {:e}] with {} sync points",
        sim_params.time_ic(),
        sim_params.time_max,
        timeline.sync_points().len()
    );
    commands.insert_resource(timeline);
}

/// Determines the next kick time, marks the active bins and rebuilds
/// the bin membership and the dense active set.
fn begin_step_system(
    timeline: Res<Timeline>,
    mut timebins: ResMut<TimeBins>,
    mut next_kick: ResMut<NextKickTime>,
    particles: Particles<(Entity, &TimeBin, &ParticleType)>,
) {
    let rows: Vec<(Entity, usize, bool)> = particles
        .iter()
        .map(|(entity, bin, ptype)| (entity, bin.0, ptype.is_gas()))
        .collect();
    // counts first, so the next kick time sees fresh bin occupation
    timebins.reconstruct(rows.iter().copied());
    let ti_current = timeline.ti_current();
    let next = timebins
        .find_next_kick(ti_current)
        .unwrap_or(ti_current);
    let num_force_update = timebins.mark_active(next);
    timebins.reconstruct(rows.iter().copied());
    next_kick.0 = next;
    debug!(
        "Step towards ti = {}: {} active particles",
        next, num_force_update
    );
}

/// Handles the actions of the sync point the clock sits on, if any.
fn output_system(
    timeline: Res<Timeline>,
    providers: Res<Providers>,
    world_rank: Res<WorldRank>,
    mut counter: ResMut<SnapshotCounter>,
    mut last_output: ResMut<LastOutputTi>,
) {
    let ti = timeline.ti_current();
    if last_output.0 == Some(ti) {
        return;
    }
    if let Some(sync) = timeline.find_current_sync_point(ti) {
        last_output.0 = Some(ti);
        if sync.calc_uvbg && world_rank.is_main() {
            info!("Sync point at a = {:e} requests a UV background update", sync.a);
        }
        if sync.write_snapshot {
            providers.snapshots.write_snapshot(counter.0, ti);
            if sync.write_fof {
                providers.snapshots.write_fof(counter.0, ti);
            }
            counter.0 += 1;
        }
    }
}

pub fn stop_simulation_system(
    timeline: Res<Timeline>,
    mut stop_sim: EventWriter<StopSimulationEvent>,
) {
    if timeline
        .find_next_sync_point(timeline.ti_current())
        .is_none()
    {
        stop_sim.send(StopSimulationEvent);
    }
}

fn handle_exit_system(
    mut event_reader: EventReader<StopSimulationEvent>,
    mut should_exit: ResMut<ShouldExit>,
) {
    let local: i64 = if event_reader.iter().count() > 0 { 1 } else { 0 };
    let mut comm = Communicator::<i64>::new();
    let total = comm.all_reduce_sum(&local);
    if total > 0 {
        should_exit.0 = true;
    }
}
