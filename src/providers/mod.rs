//! The interfaces of the external collaborators of the integrator:
//! gravity and hydro force evaluation, the SPH density estimator,
//! cooling rates and snapshot output. The integrator only ever talks
//! to these traits; the implementations in this module are reference
//! collaborators good enough to drive the core end-to-end (direct
//! summation gravity, a k-d-tree spline density estimate, free-free
//! cooling, logging output).

pub mod kernel;
pub mod tree;

mod cooling;
mod gravity;
mod snapshot;
mod sph;

use bevy_ecs::prelude::Resource;
use derive_custom::subkick_parameters;

pub use self::cooling::SimpleCooling;
pub use self::cooling::Uvbg;
pub use self::gravity::DirectGravity;
pub use self::snapshot::LogSnapshotWriter;
pub use self::sph::SplineDensity;

use crate::prelude::Float;
use crate::prelude::MVec;
use crate::simulation_box::SimulationBox;
use crate::timeline::IntegerTime;
use crate::units::UnitSystem;
use crate::units::GAMMA;
use crate::units::GAMMA_MINUS1;

#[subkick_parameters("sph")]
#[derive(Copy, Debug)]
pub struct SphParameters {
    #[serde(default = "default_des_num_ngb")]
    pub des_num_ngb: Float,
    #[serde(default = "default_max_ngb_deviation")]
    pub max_num_ngb_deviation: Float,
    /// Use the pressure-entropy (energy-weighted density)
    /// formulation in the equation of motion.
    #[serde(default = "default_true")]
    pub density_independent_sph: bool,
}

fn default_des_num_ngb() -> Float {
    33.0
}

fn default_max_ngb_deviation() -> Float {
    2.0
}

fn default_true() -> bool {
    true
}

impl Default for SphParameters {
    fn default() -> Self {
        Self {
            des_num_ngb: default_des_num_ngb(),
            max_num_ngb_deviation: default_max_ngb_deviation(),
            density_independent_sph: true,
        }
    }
}

pub struct GravityInput<'a> {
    pub box_: &'a SimulationBox,
    pub g: Float,
    pub positions: &'a [MVec],
    pub masses: &'a [Float],
    pub softenings: &'a [Float],
}

pub trait GravitySolver: Send + Sync {
    /// Comoving short-range accelerations of the target particles.
    fn short_range(&self, input: &GravityInput, targets: &[usize]) -> Vec<MVec>;

    /// Comoving long-range (mesh) accelerations of all particles.
    fn long_range(&self, input: &GravityInput) -> Vec<MVec>;
}

pub struct SphInput<'a> {
    pub box_: &'a SimulationBox,
    pub params: &'a SphParameters,
    pub positions: &'a [MVec],
    pub masses: &'a [Float],
    pub velocities: &'a [MVec],
    /// The predicted entropy variable A^{1/gamma}; non-positive
    /// entries disable the energy weighting for that particle.
    pub ent_var_pred: &'a [Float],
}

#[derive(Clone, Debug, Default)]
pub struct DensityResult {
    pub density: Float,
    pub egy_wt_density: Float,
    pub dhsml_egy_density_factor: Float,
    pub hsml: Float,
    pub num_ngb: Float,
    pub div_vel: Float,
    pub curl_vel: Float,
    pub grad_rho: MVec,
}

pub trait DensityEstimator: Send + Sync {
    /// Estimates densities for the target subset, iterating each
    /// smoothing length to the desired neighbour number. `hsml`
    /// contains the starting guesses of the targets.
    fn density(&self, input: &SphInput, targets: &[usize], hsml: &[Float]) -> Vec<DensityResult>;
}

pub struct HydroInput<'a> {
    pub density: &'a [Float],
    pub entropy: &'a [Float],
    /// The current entropy rates; a provider that computes no
    /// viscosity or shocks passes them through unchanged.
    pub dt_entropy: &'a [Float],
}

#[derive(Clone, Debug, Default)]
pub struct HydroResult {
    pub accel: MVec,
    pub max_signal_vel: Float,
    pub dt_entropy: Float,
}

pub trait HydroSolver: Send + Sync {
    fn evaluate(&self, input: &HydroInput) -> Vec<HydroResult>;
}

/// The built-in hydro stand-in: no pressure forces, but a physically
/// reasonable signal velocity so that the Courant criterion works.
pub struct NoHydroForces;

impl HydroSolver for NoHydroForces {
    fn evaluate(&self, input: &HydroInput) -> Vec<HydroResult> {
        input
            .density
            .iter()
            .zip(input.entropy.iter())
            .zip(input.dt_entropy.iter())
            .map(|((rho, entropy), dt_entropy)| {
                let csnd = sound_speed(*entropy, *rho);
                HydroResult {
                    accel: MVec::ZERO,
                    max_signal_vel: 2.0 * csnd,
                    dt_entropy: *dt_entropy,
                }
            })
            .collect()
    }
}

/// The density entering the equation of motion: the energy-weighted
/// one in the pressure-entropy formulation, the mass density
/// otherwise.
pub fn eom_density(params: &SphParameters, density: Float, egy_wt_density: Float) -> Float {
    if params.density_independent_sph {
        egy_wt_density
    } else {
        density
    }
}

pub fn sound_speed(entropy: Float, density: Float) -> Float {
    if density <= 0.0 {
        return 0.0;
    }
    (GAMMA * entropy * density.powf(GAMMA_MINUS1)).sqrt()
}

pub trait CoolingModel: Send + Sync {
    /// The UV background seen by the gas; `zero_ionization` is used
    /// by the equation of state pre-solve.
    fn global_uvbg(&self, zero_ionization: bool) -> Uvbg;

    /// Integrates the specific energy over a physical time interval,
    /// updating the electron abundance. Returns the new specific
    /// energy, all in internal units.
    fn do_cooling(
        &self,
        u: Float,
        rho_phys: Float,
        dt_phys: Float,
        uvbg: &Uvbg,
        ne: &mut Float,
        metallicity: Float,
    ) -> Float;

    /// The cooling time u / (du/dt) in internal units, or zero if
    /// the gas is net heating.
    fn cooling_time(
        &self,
        u: Float,
        rho_phys: Float,
        uvbg: &Uvbg,
        ne: &mut Float,
        metallicity: Float,
    ) -> Float;
}

pub trait SnapshotWriter: Send + Sync {
    fn write_snapshot(&self, num: i64, ti: IntegerTime);
    fn write_fof(&self, num: i64, ti: IntegerTime);
}

/// The external collaborators of the run, replaceable individually
/// (tests swap in counting or failing variants).
#[derive(Resource)]
pub struct Providers {
    pub gravity: Box<dyn GravitySolver>,
    pub hydro: Box<dyn HydroSolver>,
    pub density: Box<dyn DensityEstimator>,
    pub cooling: Box<dyn CoolingModel>,
    pub snapshots: Box<dyn SnapshotWriter>,
}

impl Providers {
    pub fn reference(units: &UnitSystem) -> Self {
        Self {
            gravity: Box::new(DirectGravity),
            hydro: Box::new(NoHydroForces),
            density: Box::new(SplineDensity),
            cooling: Box::new(SimpleCooling::new(units)),
            snapshots: Box::new(LogSnapshotWriter),
        }
    }
}
