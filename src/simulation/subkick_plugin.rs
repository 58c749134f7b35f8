use super::Simulation;
use crate::named::Named;

/// A plugin of the simulation. The build hooks distinguish between
/// the main rank and the others and between the first and repeated
/// additions of the same plugin type.
pub trait SubkickPlugin: Named {
    /// Whether the plugin should be built at all. Note that
    /// build_always_once runs before this and happens regardless of
    /// the outcome.
    fn should_build(&self, _sim: &Simulation) -> bool {
        true
    }

    /// Whether adding this plugin twice is an error. Generic plugins
    /// share a name and may legitimately be added multiple times.
    fn allow_adding_twice(&self) -> bool {
        false
    }

    /// Called once per plugin type, regardless of the value of
    /// allow_adding_twice; a place to set up anything the
    /// should_build condition needs.
    fn build_always_once(&self, _sim: &mut Simulation) {}

    /// Called on every rank on every initialization of the plugin.
    fn build_everywhere(&self, _sim: &mut Simulation) {}

    /// Called on the main rank on every initialization of the plugin.
    fn build_on_main_rank(&self, _sim: &mut Simulation) {}

    /// Called on all ranks except the main rank on every initialization of the plugin.
    fn build_on_other_ranks(&self, _sim: &mut Simulation) {}

    /// Called on every rank once per plugin type.
    fn build_once_everywhere(&self, _sim: &mut Simulation) {}

    /// Called on the main rank once per plugin type.
    fn build_once_on_main_rank(&self, _sim: &mut Simulation) {}

    /// Called on all ranks except the main rank once per plugin type.
    fn build_once_on_other_ranks(&self, _sim: &mut Simulation) {}
}
