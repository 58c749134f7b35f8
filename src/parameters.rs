//! Contains all the parameter types of the simulation.

pub use crate::cosmology::Cosmology;
pub use crate::ics::InitialConditionsParameters;
pub use crate::integrator::parameters::SofteningPair;
pub use crate::integrator::parameters::SofteningParameters;
pub use crate::integrator::parameters::TimestepParameters;
pub use crate::providers::SphParameters;
pub use crate::sfr::parameters::StarFormationCriterion;
pub use crate::sfr::parameters::StarFormationParameters;
pub use crate::sfr::parameters::WindModel;
pub use crate::sfr::parameters::WindParameters;
pub use crate::simulation_box::SimulationBox;
pub use crate::simulation_plugin::OutputParameters;
pub use crate::simulation_plugin::SimulationParameters;
pub use crate::units::UnitSystem;
