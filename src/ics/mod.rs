//! Built-in lattice initial conditions. The production IC files come
//! in through the external I/O layer; this generator provides the
//! parameter-driven setups used by the binary's demo mode and the
//! tests.

use bevy_ecs::prelude::Commands;
use bevy_ecs::prelude::Res;
use derive_custom::subkick_parameters;
use log::info;

use crate::bootstrap::InternalEnergy;
use crate::components::Mass;
use crate::components::Position;
use crate::components::Velocity;
use crate::cosmology::Cosmology;
use crate::named::Named;
use crate::particle::GasParticle;
use crate::prelude::*;
use crate::units::UnitSystem;

#[subkick_parameters("initial_conditions")]
#[derive(Debug, Default)]
pub struct InitialConditionsParameters {
    #[serde(default)]
    pub num_gas_per_dim: usize,
    #[serde(default)]
    pub num_dm_per_dim: usize,
    /// Specific internal energy of the gas; converted to entropy by
    /// the bootstrap.
    #[serde(default)]
    pub internal_energy: Float,
    /// Explicit particle masses; when absent the masses follow from
    /// the cosmology and the box volume.
    #[serde(default)]
    pub gas_particle_mass: Option<Float>,
    #[serde(default)]
    pub dm_particle_mass: Option<Float>,
}

#[derive(Named)]
pub struct InitialConditionsPlugin;

impl SubkickPlugin for InitialConditionsPlugin {
    fn build_everywhere(&self, sim: &mut Simulation) {
        sim.add_parameter_type::<InitialConditionsParameters>()
            .add_startup_system_to_stage(StartupStages::InsertComponents, spawn_lattice_system);
    }
}

fn lattice_positions(n: usize, box_: &SimulationBox, offset: Float) -> Vec<MVec> {
    let spacing = box_.side_length / n as Float;
    let mut positions = vec![];
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                positions.push(MVec::new(
                    (i as Float + offset) * spacing,
                    (j as Float + offset) * spacing,
                    (k as Float + offset) * spacing,
                ));
            }
        }
    }
    positions
}

fn spawn_lattice_system(
    mut commands: Commands,
    params: Res<InitialConditionsParameters>,
    box_: Res<SimulationBox>,
    cosmology: Res<Cosmology>,
    units: Res<UnitSystem>,
    world_rank: Res<WorldRank>,
) {
    // the generator is serial; ranks other than the main one receive
    // their share from the domain decomposition
    if !world_rank.is_main() {
        return;
    }
    if params.num_gas_per_dim == 0 && params.num_dm_per_dim == 0 {
        return;
    }
    let hubble = units.hubble();
    let rho_crit = 3.0 * hubble * hubble / (8.0 * std::f64::consts::PI * units.g());
    let mut next_id = 1u64;

    if params.num_gas_per_dim > 0 {
        let num = params.num_gas_per_dim.pow(3);
        let mass = params.gas_particle_mass.unwrap_or_else(|| {
            cosmology.omega_baryon() * rho_crit * box_.volume() / num as Float
        });
        for pos in lattice_positions(params.num_gas_per_dim, &box_, 0.25) {
            commands.spawn((
                LocalParticle,
                GasParticle,
                ParticleType::Gas,
                ParticleId(next_id),
                Position(pos),
                Velocity(MVec::ZERO),
                Mass(mass),
                InternalEnergy(params.internal_energy),
            ));
            next_id += 1;
        }
        info!("Spawned {} gas particles of mass {:e}", num, mass);
    }

    if params.num_dm_per_dim > 0 {
        let num = params.num_dm_per_dim.pow(3);
        let mass = params.dm_particle_mass.unwrap_or_else(|| {
            cosmology.omega_cdm() * rho_crit * box_.volume() / num as Float
        });
        for pos in lattice_positions(params.num_dm_per_dim, &box_, 0.75) {
            commands.spawn((
                LocalParticle,
                ParticleType::Halo,
                ParticleId(next_id),
                Position(pos),
                Velocity(MVec::ZERO),
                Mass(mass),
            ));
            next_id += 1;
        }
        info!("Spawned {} dark matter particles of mass {:e}", num, mass);
    }
}
