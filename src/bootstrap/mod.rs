//! Simulation bootstrap: restart validation, derived per-particle
//! state, global sanity checks, the initial smoothing length guess
//! and the entropy pre-solve for clean initial conditions.

use bevy_ecs::prelude::Commands;
use bevy_ecs::prelude::Component;
use bevy_ecs::prelude::Entity;
use bevy_ecs::schedule::IntoSystemDescriptor;
use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::Resource;
use bevy_ecs::prelude::With;
use bevy_ecs::prelude::Without;
use derive_more::Deref;
use derive_more::DerefMut;
use derive_more::From;
use log::info;
use log::warn;

use crate::command_line_options::RestartFlag;
use crate::command_line_options::RestartOptions;
use crate::communication::CollectiveCommunicator;
use crate::communication::Communicator;
use crate::communication::Operation;
use crate::components::BlackHole;
use crate::components::CurlVel;
use crate::components::Density;
use crate::components::DhsmlEgyDensityFactor;
use crate::components::DelayTime;
use crate::components::DivVel;
use crate::components::DtEntropy;
use crate::components::EgyWtDensity;
use crate::components::ElectronAbundance;
use crate::components::EntVarPred;
use crate::components::Entropy;
use crate::components::GradRho;
use crate::components::GravityAccel;
use crate::components::GravityPmAccel;
use crate::components::HydroAccel;
use crate::components::Mass;
use crate::components::MaxSignalVel;
use crate::components::Metallicity;
use crate::components::NumNeighbours;
use crate::components::Position;
use crate::components::PredictedVelocity;
use crate::components::Sfr;
use crate::components::SmoothingLength;
use crate::components::TiBegStep;
use crate::components::TimeBin;
use crate::components::Velocity;
use crate::cosmology::Cosmology;
use crate::cosmology::CurrentTime;
use crate::endrun;
use crate::integrator::softening::SofteningTable;
use crate::named::Named;
use crate::particle::GasParticle;
use crate::prelude::*;
use crate::providers::tree::NeighbourTree;
use crate::providers::Providers;
use crate::providers::SphInput;
use crate::providers::SphParameters;
use crate::sfr::model::ent_var_from_entropy;
use crate::sfr::model::entropy_from_energy;
use crate::sfr::StarsSpawned;
use crate::units::UnitSystem;

const ENTROPY_ITERATION_TOLERANCE: Float = 1.0e-3;
const MAX_ENTROPY_ITERATIONS: usize = 100;

/// How the entropy pre-solve went; recorded for diagnostics.
#[derive(Resource, Default, Clone, Copy, Debug)]
pub struct EntropyConvergence {
    pub iterations: usize,
    pub residual: Float,
}

/// Specific internal energy as read from clean initial conditions.
/// Converted to entropy by the pre-solve and removed afterwards.
#[derive(Component, Debug, Clone, Deref, DerefMut, From, Named)]
#[name = "internal_energy"]
#[repr(transparent)]
pub struct InternalEnergy(pub Float);

#[derive(Named)]
pub struct BootstrapPlugin;

impl SubkickPlugin for BootstrapPlugin {
    fn build_everywhere(&self, sim: &mut Simulation) {
        sim.add_startup_system_to_stage(
            StartupStages::InsertDerivedComponents,
            validate_restart_system,
        )
        .add_startup_system_to_stage(
            StartupStages::InsertDerivedComponents,
            init_derived_components_system.after(validate_restart_system),
        )
        .add_startup_system_to_stage(StartupStages::CheckParticles, check_id_uniqueness_system)
        .add_startup_system_to_stage(StartupStages::CheckParticles, check_omega_system)
        .add_startup_system_to_stage(
            StartupStages::SmoothingLengths,
            setup_smoothing_lengths_system,
        )
        .add_startup_system_to_stage(
            StartupStages::EntropyConversion,
            entropy_conversion_system,
        );
    }
}

fn validate_restart_system(options: Res<RestartOptions>) {
    match options.flag {
        RestartFlag::FofOnly | RestartFlag::ConvertSnapshot => {
            if options.snapshot.is_none() {
                endrun!(
                    0,
                    "Need to give the snapshot number if FOF or conversion is selected"
                );
            }
        }
        RestartFlag::SnapshotResumeAt => {
            if options.snapshot.is_none() {
                endrun!(0, "RestartFlag and SnapNum combination is unknown");
            }
        }
        RestartFlag::FreshIc | RestartFlag::SnapshotResume => {}
    }
}

/// Start-up initialization of everything the initial conditions do
/// not provide.
#[allow(clippy::type_complexity)]
fn init_derived_components_system(
    mut commands: Commands,
    new_particles: Particles<Entity, Without<TimeBin>>,
    new_gas: Particles<(Entity, &Velocity), (With<GasParticle>, Without<PredictedVelocity>)>,
    untagged_gas: Particles<Entity, (With<GasParticle>, Without<Metallicity>)>,
    unsized_gas: Particles<Entity, (With<GasParticle>, Without<SmoothingLength>)>,
    bare_black_holes: Particles<(Entity, &ParticleType, &Mass), Without<BlackHole>>,
) {
    for entity in new_particles.iter() {
        commands.entity(entity).insert((
            TimeBin(0),
            TiBegStep(0),
            GravityAccel::default(),
            GravityPmAccel::default(),
        ));
    }
    for (entity, vel) in new_gas.iter() {
        commands.entity(entity).insert((
            PredictedVelocity(vel.0),
            HydroAccel::default(),
            DtEntropy::default(),
            Density::default(),
            EgyWtDensity::default(),
            EntVarPred::default(),
            DhsmlEgyDensityFactor(1.0),
            NumNeighbours::default(),
            DivVel::default(),
            CurlVel::default(),
            GradRho::default(),
            MaxSignalVel::default(),
            ElectronAbundance(1.0),
            Sfr::default(),
        ));
        commands.entity(entity).insert(DelayTime::default());
    }
    for entity in untagged_gas.iter() {
        commands
            .entity(entity)
            .insert((Metallicity::default(), StarsSpawned::default()));
    }
    for entity in unsized_gas.iter() {
        commands.entity(entity).insert(SmoothingLength(0.0));
    }
    for (entity, ptype, mass) in bare_black_holes.iter() {
        if matches!(ptype, ParticleType::BlackHole) {
            commands.entity(entity).insert((
                BlackHole {
                    mass: mass.0,
                    mdot: 0.0,
                    time_bin_limit: None,
                },
                SmoothingLength(0.0),
            ));
        }
    }
}

/// Particle IDs must be unique: star spawning and all reproducible
/// random draws key off them. Uniqueness across ranks is the
/// responsibility of the IC layer; each rank checks its own set.
fn check_id_uniqueness_system(particles: Particles<&ParticleId>) {
    let mut ids: Vec<u64> = particles.iter().map(|id| id.0).collect();
    ids.sort_unstable();
    for window in ids.windows(2) {
        if window[0] == window[1] {
            endrun!(12, "Duplicate particle ID: {}", window[0]);
        }
    }
}

/// Computes the mass content of the box and compares it to the
/// specified value of Omega-matter. If discrepant, the run is
/// terminated.
fn check_omega_system(
    cosmology: Res<Cosmology>,
    units: Res<UnitSystem>,
    box_: Res<SimulationBox>,
    particles: Particles<&Mass>,
) {
    if !cosmology.is_comoving() {
        return;
    }
    let mass: Float = particles.iter().map(|mass| mass.0).sum();
    let mut comm = Communicator::<Float>::new();
    let masstot = comm.all_reduce(&mass, Operation::Sum);
    let hubble = units.hubble();
    let rho_crit = 3.0 * hubble * hubble / (8.0 * std::f64::consts::PI * units.g());
    let omega = masstot / box_.volume() / rho_crit;
    if (omega - cosmology.omega0()).abs() > 1.0e-3 {
        endrun!(
            1,
            "The mass content accounts only for Omega={}, but you specified Omega={} in the parameterfile. I better stop.",
            omega,
            cosmology.omega0()
        );
    }
}

/// Finds an initial smoothing length for each SPH particle from the
/// radius that encloses the desired number of neighbour masses,
/// corrected for the baryon fraction. The density iteration refines
/// it afterwards.
fn setup_smoothing_lengths_system(
    box_: Res<SimulationBox>,
    sph_params: Res<SphParameters>,
    softening: Res<SofteningTable>,
    cosmology: Res<Cosmology>,
    all_particles: Particles<(&Position, &Mass, &ParticleType), Without<GasParticle>>,
    mut gas: Particles<(&Position, &Mass, &mut SmoothingLength), With<GasParticle>>,
    mut black_holes: Particles<(&ParticleType, &mut SmoothingLength), Without<GasParticle>>,
) {
    let mut positions = vec![];
    let mut masses = vec![];
    for (pos, mass, _) in all_particles.iter() {
        positions.push(pos.0);
        masses.push(mass.0);
    }
    for (pos, mass, _) in gas.iter() {
        positions.push(pos.0);
        masses.push(mass.0);
    }
    let total_mass: Float = masses.iter().sum();
    let tree = NeighbourTree::build(&box_, &positions);

    // only this fraction of the mass around a particle is of its own
    // kind; eventually the density iteration will fix the guess
    let baryon_fraction = if cosmology.is_comoving() && cosmology.omega0() > 0.0 {
        cosmology.omega_baryon() / cosmology.omega0()
    } else {
        1.0
    };

    let mean_spacing = box_.side_length / (positions.len().max(1) as Float).powf(1.0 / 3.0);
    for (pos, mass, mut hsml) in gas.iter_mut() {
        if hsml.0 != 0.0 {
            continue;
        }
        let target_mass = 10.0 * sph_params.des_num_ngb * mass.0 / baryon_fraction;
        let mut radius = mean_spacing;
        let mut enclosed = 0.0;
        for _ in 0..64 {
            enclosed = tree
                .within(pos.0, radius)
                .into_iter()
                .map(|j| masses[j])
                .sum();
            if enclosed >= target_mass.min(total_mass) {
                break;
            }
            radius *= 2.0;
        }
        if enclosed <= 0.0 {
            hsml.0 = mean_spacing;
            continue;
        }
        hsml.0 = radius
            * (sph_params.des_num_ngb * mass.0 / (baryon_fraction * enclosed)).powf(1.0 / 3.0);
        let cap = 500.0 * softening.plummer(0);
        if softening.plummer(0) != 0.0 && hsml.0 > cap {
            hsml.0 = cap;
        }
    }

    for (ptype, mut hsml) in black_holes.iter_mut() {
        if matches!(ptype, ParticleType::BlackHole) {
            hsml.0 = softening.plummer(5);
        }
    }
}

type EntropyConversionQuery = (
    Entity,
    &'static Position,
    &'static Mass,
    &'static PredictedVelocity,
    &'static mut SmoothingLength,
    &'static mut Density,
    &'static mut EgyWtDensity,
    &'static mut DhsmlEgyDensityFactor,
    &'static mut NumNeighbours,
    &'static mut DivVel,
    &'static mut CurlVel,
    &'static mut GradRho,
    &'static mut EntVarPred,
    Option<&'static InternalEnergy>,
    Option<&'static mut Entropy>,
);

/// Runs the first density estimate and, for clean initial conditions
/// carrying only specific energies, the fixed-point iteration that
/// initializes the entropy consistently with the energy-weighted
/// density.
fn entropy_conversion_system(
    mut commands: Commands,
    box_: Res<SimulationBox>,
    sph_params: Res<SphParameters>,
    ct: Res<CurrentTime>,
    providers: Res<Providers>,
    mut gas: Particles<EntropyConversionQuery, With<GasParticle>>,
) {
    struct Row {
        entity: Entity,
        position: MVec,
        mass: Float,
        velocity: MVec,
        hsml: Float,
        ent_var: Float,
        internal_energy: Option<Float>,
        result: crate::providers::DensityResult,
    }
    let mut rows: Vec<Row> = gas
        .iter()
        .map(
            |(entity, pos, mass, vel, hsml, _, _, _, _, _, _, _, ent_var, u, entropy)| Row {
                entity,
                position: pos.0,
                mass: mass.0,
                velocity: vel.0,
                hsml: hsml.0,
                ent_var: match entropy {
                    Some(entropy) => ent_var_from_entropy(entropy.0),
                    None => ent_var.0,
                },
                internal_energy: u.map(|u| u.0),
                result: Default::default(),
            },
        )
        .collect();
    if rows.is_empty() {
        return;
    }

    let run_density = |rows: &mut Vec<Row>, providers: &Providers| {
        let positions: Vec<_> = rows.iter().map(|row| row.position).collect();
        let masses: Vec<_> = rows.iter().map(|row| row.mass).collect();
        let velocities: Vec<_> = rows.iter().map(|row| row.velocity).collect();
        let ent_var: Vec<_> = rows.iter().map(|row| row.ent_var).collect();
        let hsml: Vec<_> = rows.iter().map(|row| row.hsml).collect();
        let input = SphInput {
            box_: &box_,
            params: &sph_params,
            positions: &positions,
            masses: &masses,
            velocities: &velocities,
            ent_var_pred: &ent_var,
        };
        let targets: Vec<usize> = (0..rows.len()).collect();
        let results = providers.density.density(&input, &targets, &hsml);
        for (row, result) in rows.iter_mut().zip(results.into_iter()) {
            row.hsml = result.hsml;
            row.result = result;
        }
    };

    run_density(&mut rows, &providers);

    let mut convergence = EntropyConvergence::default();
    let fresh_energy_input = rows.iter().any(|row| row.internal_energy.is_some());
    if fresh_energy_input {
        if sph_params.density_independent_sph {
            // start the iteration from the mass density. The
            // initialization of the entropy variable is trickier in
            // this formulation, since it needs to 'talk to' the
            // density appropriately.
            info!("Converting u -> entropy, with density split sph");
            for row in rows.iter_mut() {
                row.result.egy_wt_density = row.result.density;
            }
            let mut comm = Communicator::<Float>::new();
            for iteration in 0..MAX_ENTROPY_ITERATIONS {
                let old_density: Vec<Float> =
                    rows.iter().map(|row| row.result.egy_wt_density).collect();
                for row in rows.iter_mut() {
                    if let Some(u) = row.internal_energy {
                        let entropy =
                            entropy_from_energy(u, row.result.egy_wt_density * ct.a3inv);
                        row.ent_var = ent_var_from_entropy(entropy);
                    }
                }
                run_density(&mut rows, &providers);
                let mut badness: Float = 0.0;
                for (row, old) in rows.iter().zip(old_density.iter()) {
                    if row.result.egy_wt_density > 0.0 {
                        badness = badness
                            .max((row.result.egy_wt_density - old).abs() / row.result.egy_wt_density);
                    }
                }
                let badness = comm.all_reduce(&badness, Operation::Max);
                info!(
                    "iteration {:03}, max relative difference = {:e}",
                    iteration, badness
                );
                convergence.iterations = iteration + 1;
                convergence.residual = badness;
                if badness < ENTROPY_ITERATION_TOLERANCE {
                    break;
                }
                if iteration == MAX_ENTROPY_ITERATIONS - 1 {
                    warn!(
                        "Entropy initialization did not converge below {:e}; continuing anyway",
                        ENTROPY_ITERATION_TOLERANCE
                    );
                }
            }
        }
        // the energy-weighted density has stabilized; convert from
        // energy to entropy
        for row in rows.iter_mut() {
            if let Some(u) = row.internal_energy {
                let eom = crate::providers::eom_density(
                    &sph_params,
                    row.result.density,
                    row.result.egy_wt_density,
                );
                let entropy = entropy_from_energy(u, eom * ct.a3inv);
                row.ent_var = ent_var_from_entropy(entropy);
                commands.entity(row.entity).insert(Entropy(entropy));
                commands.entity(row.entity).remove::<InternalEnergy>();
            }
        }
        if sph_params.density_independent_sph {
            run_density(&mut rows, &providers);
        }
    }
    commands.insert_resource(convergence);

    // scatter the final state back to the components
    for row in rows.iter() {
        if let Ok((
            _,
            _,
            _,
            _,
            mut hsml,
            mut density,
            mut egy,
            mut dhsml,
            mut ngb,
            mut div,
            mut curl,
            mut grad,
            mut ent_var,
            _,
            entropy,
        )) = gas.get_mut(row.entity)
        {
            hsml.0 = row.hsml;
            density.0 = row.result.density;
            egy.0 = row.result.egy_wt_density;
            dhsml.0 = row.result.dhsml_egy_density_factor;
            ngb.0 = row.result.num_ngb;
            div.0 = row.result.div_vel;
            curl.0 = row.result.curl_vel;
            grad.0 = row.result.grad_rho;
            ent_var.0 = match entropy {
                Some(entropy) => ent_var_from_entropy(entropy.0),
                None => row.ent_var,
            };
        }
    }
}
