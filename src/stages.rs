use bevy_app::App;
use bevy_app::CoreStage;
use bevy_app::StartupStage;
use bevy_ecs::schedule::StageLabel;
use bevy_ecs::schedule::SystemStage;

/// The stages of a single integration step. These run every time
/// `App::update` is called, in the order listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StageLabel)]
pub enum Stages {
    /// Determine the next kick time and the set of active time bins.
    BeginStep,
    /// Move particles (and the integer clock) forward to the kick time.
    Drift,
    /// External force providers run on the active set.
    ForceCalculation,
    /// Timestep assignment and kicks, including the long-range kick.
    Integration,
    /// Cooling and star formation.
    SourceTerms,
    /// Wind launching from newly born stars.
    Winds,
    /// Sync point handling: snapshots, FOF requests, statistics.
    Output,
    /// Stop detection and bookkeeping.
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StageLabel)]
pub enum StartupStages {
    /// Initial conditions ingest: particles are spawned here.
    InsertComponents,
    /// Derived per-particle state that ingest does not provide.
    InsertDerivedComponents,
    /// Parameters derived from other parameters (thresholds, wind speed).
    DerivedParameters,
    /// Global sanity checks on the particle content.
    CheckParticles,
    /// Time bin and clock initialization.
    InitTimeline,
    /// Initial smoothing length guess and the first density pass.
    SmoothingLengths,
    /// Energy to entropy conversion for clean initial conditions.
    EntropyConversion,
    Final,
}

pub(crate) fn add_simulation_stages(app: &mut App) {
    let step_stages = [
        Stages::BeginStep,
        Stages::Drift,
        Stages::ForceCalculation,
        Stages::Integration,
        Stages::SourceTerms,
        Stages::Winds,
        Stages::Output,
        Stages::Final,
    ];
    app.add_stage_after(
        CoreStage::Update,
        Stages::BeginStep,
        SystemStage::single_threaded(),
    );
    for window in step_stages.windows(2) {
        app.add_stage_after(window[0], window[1], SystemStage::single_threaded());
    }
    let startup_stages = [
        StartupStages::InsertComponents,
        StartupStages::InsertDerivedComponents,
        StartupStages::DerivedParameters,
        StartupStages::CheckParticles,
        StartupStages::InitTimeline,
        StartupStages::SmoothingLengths,
        StartupStages::EntropyConversion,
        StartupStages::Final,
    ];
    app.add_startup_stage_after(
        StartupStage::PostStartup,
        StartupStages::InsertComponents,
        SystemStage::single_threaded(),
    );
    for window in startup_stages.windows(2) {
        app.add_startup_stage_after(window[0], window[1], SystemStage::single_threaded());
    }
}
