use bevy_ecs::prelude::World;
use bevy_ecs::schedule::IntoSystemDescriptor;
use bevy_ecs::schedule::Stage;
use bevy_ecs::schedule::SystemStage;

use crate::prelude::Float;
use crate::prelude::Simulation;

// Currently only used by a few tests but will very likely be used
// more, so prevent the dead code warning
#[allow(dead_code)]
pub fn run_system_on_sim<P>(sim: &mut Simulation, system: impl IntoSystemDescriptor<P>) {
    run_system_on_world(sim.world(), system);
}

pub fn run_system_on_world<P>(world: &mut World, system: impl IntoSystemDescriptor<P>) {
    let mut stage = SystemStage::single_threaded().with_system(system);
    stage.run(world);
}

pub fn assert_close_rel(x: Float, y: Float, tolerance: Float) {
    assert!(
        (x - y).abs() <= tolerance * x.abs().max(y.abs()),
        "{} vs {}",
        x,
        y
    );
}
