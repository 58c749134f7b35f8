use bevy_ecs::prelude::Component;
use derive_more::Deref;
use derive_more::DerefMut;
use derive_more::From;

use crate::named::Named;
use crate::prelude::Float;
use crate::prelude::MVec;
use crate::timeline::IntegerTime;

#[derive(Component, Debug, Clone, Deref, DerefMut, From, Named)]
#[name = "position"]
#[repr(transparent)]
pub struct Position(pub MVec);

/// The canonical velocity variable of the integrator. Kicked at bin
/// boundaries only.
#[derive(Component, Debug, Clone, Deref, DerefMut, From, Named)]
#[name = "velocity"]
#[repr(transparent)]
pub struct Velocity(pub MVec);

/// Gas velocity extrapolated to the current tick, for subsystems
/// that need an instantaneous value between kicks.
#[derive(Component, Debug, Clone, Deref, DerefMut, From, Named)]
#[name = "predicted_velocity"]
#[repr(transparent)]
pub struct PredictedVelocity(pub MVec);

#[derive(Component, Debug, Clone, Deref, DerefMut, From, Named)]
#[name = "mass"]
#[repr(transparent)]
pub struct Mass(pub Float);

/// Short-range (tree) gravitational acceleration, comoving.
#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "gravity_accel"]
#[repr(transparent)]
pub struct GravityAccel(pub MVec);

/// Long-range (particle-mesh) gravitational acceleration, comoving.
#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "gravity_pm_accel"]
#[repr(transparent)]
pub struct GravityPmAccel(pub MVec);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "hydro_accel"]
#[repr(transparent)]
pub struct HydroAccel(pub MVec);

/// Entropy per unit mass A = P / rho^gamma.
#[derive(Component, Debug, Clone, Deref, DerefMut, From, Named)]
#[name = "entropy"]
#[repr(transparent)]
pub struct Entropy(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "dt_entropy"]
#[repr(transparent)]
pub struct DtEntropy(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "density"]
#[repr(transparent)]
pub struct Density(pub Float);

/// The energy-weighted (pressure-entropy) density.
#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "egy_wt_density"]
#[repr(transparent)]
pub struct EgyWtDensity(pub Float);

/// Predicted entropy variable A^{1/gamma}, consumed by the
/// energy-weighted density estimate.
#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "ent_var_pred"]
#[repr(transparent)]
pub struct EntVarPred(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "dhsml_egy_density_factor"]
#[repr(transparent)]
pub struct DhsmlEgyDensityFactor(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "electron_abundance"]
#[repr(transparent)]
pub struct ElectronAbundance(pub Float);

#[derive(Component, Debug, Clone, Deref, DerefMut, From, Named)]
#[name = "smoothing_length"]
#[repr(transparent)]
pub struct SmoothingLength(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "num_neighbours"]
#[repr(transparent)]
pub struct NumNeighbours(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "div_vel"]
#[repr(transparent)]
pub struct DivVel(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "curl_vel"]
#[repr(transparent)]
pub struct CurlVel(pub Float);

/// Density gradient, used by the molecular hydrogen column estimate.
#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "grad_rho"]
#[repr(transparent)]
pub struct GradRho(pub MVec);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "max_signal_vel"]
#[repr(transparent)]
pub struct MaxSignalVel(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "sfr"]
#[repr(transparent)]
pub struct Sfr(pub Float);

#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "metallicity"]
#[repr(transparent)]
pub struct Metallicity(pub Float);

/// While positive, the particle is in the wind phase and excluded
/// from cooling, star formation and further wind kicks. Counts down
/// in physical time.
#[derive(Component, Debug, Clone, Default, Deref, DerefMut, From, Named)]
#[name = "delay_time"]
#[repr(transparent)]
pub struct DelayTime(pub Float);

/// Scale factor at which the star was born.
#[derive(Component, Debug, Clone, Deref, DerefMut, From, Named)]
#[name = "stellar_age"]
#[repr(transparent)]
pub struct StellarAge(pub Float);

/// The power-of-two timestep class of the particle. Bin 0 means
/// inactive / undefined step.
#[derive(Component, Debug, Clone, Copy, Default, Deref, DerefMut, From, Named)]
#[name = "time_bin"]
#[repr(transparent)]
pub struct TimeBin(pub usize);

/// The integer time at which the current bin step started.
#[derive(Component, Debug, Clone, Copy, Default, Deref, DerefMut, From, Named)]
#[name = "ti_beg_step"]
#[repr(transparent)]
pub struct TiBegStep(pub IntegerTime);

/// The auxiliary record of black hole particles.
#[derive(Component, Debug, Clone, Named)]
#[name = "black_hole"]
pub struct BlackHole {
    pub mass: Float,
    pub mdot: Float,
    pub time_bin_limit: Option<usize>,
}
