pub use crate::communication::WorldRank;
pub use crate::communication::WorldSize;
pub use crate::named::Named;
pub use crate::particle::LocalParticle;
pub use crate::particle::ParticleId;
pub use crate::particle::ParticleType;
pub use crate::particle::Particles;
pub use crate::simulation::Simulation;
pub use crate::simulation::SubkickPlugin;
pub use crate::simulation_box::SimulationBox;
pub use crate::simulation_builder::SimulationBuilder;
pub use crate::stages::Stages;
pub use crate::stages::StartupStages;

pub type Float = f64;
pub type MVec = glam::DVec3;
