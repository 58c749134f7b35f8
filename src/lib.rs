// Some of our '*_system' functions have a large number of arguments.
// That is not necessarily a bad thing, as they are auto-provided by bevy.
#![allow(clippy::too_many_arguments)]
// Some of the Query<…> types appear rather complex to clippy, but are actually
// perfectly readable.
#![allow(clippy::type_complexity)]

//! # Subkick
//! Subkick is the integration core of a cosmological N-body / SPH
//! simulation code: the hierarchical power-of-two timestep scheme
//! with its kick/drift operator splitting, the integer timeline and
//! its sync points, the per-particle time bins, the effective
//! multi-phase star formation and wind module, and the simulation
//! bootstrap.
//!
//! The force solvers, the density estimator, the cooling tables and
//! the snapshot layer are external collaborators behind the traits
//! in [`providers`]; reference implementations good enough to drive
//! the core end-to-end ship with the crate.
//!
//! ## A basic example
//! ```no_run
//! use subkick::prelude::*;
//! use subkick::bootstrap::BootstrapPlugin;
//! use subkick::ics::InitialConditionsPlugin;
//! use subkick::sfr::SfrPlugin;
//! use subkick::simulation_plugin::SimulationPlugin;
//!
//! fn main() {
//!     let mut builder = SimulationBuilder::new();
//!     builder
//!         .require_parameter_file(true)
//!         .update_from_command_line_options()
//!         .build()
//!         .add_plugin(InitialConditionsPlugin)
//!         .add_plugin(SimulationPlugin)
//!         .add_plugin(BootstrapPlugin)
//!         .add_plugin(SfrPlugin)
//!         .run();
//! }
//! ```

pub mod bootstrap;
pub(crate) mod command_line_options;
pub mod communication;
pub mod components;
pub mod cosmology;
pub(crate) mod hash_map;
pub mod ics;
pub mod integrator;
pub(crate) mod named;
pub(crate) mod parameter_plugin;
pub mod particle;
pub mod providers;
pub(crate) mod rand;
pub mod sfr;
pub mod simulation;
pub(crate) mod simulation_box;
pub(crate) mod simulation_builder;
pub mod simulation_plugin;
pub(crate) mod stages;
pub mod timebin;
pub mod timeline;
pub mod units;

/// Contains all the parameter types of the simulation.
pub mod parameters;
/// `use subkick::prelude::*` to import the commonly used plugins and
/// components when building a simulation.
pub mod prelude;

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
mod test_scenarios;
