use subkick::bootstrap::BootstrapPlugin;
use subkick::ics::InitialConditionsPlugin;
use subkick::prelude::*;
use subkick::sfr::SfrPlugin;
use subkick::simulation_plugin::SimulationPlugin;

fn main() {
    let mut builder = SimulationBuilder::new();
    builder
        .require_parameter_file(true)
        .update_from_command_line_options()
        .build()
        .add_plugin(InitialConditionsPlugin)
        .add_plugin(SimulationPlugin)
        .add_plugin(BootstrapPlugin)
        .add_plugin(SfrPlugin)
        .run();
}
