use derive_custom::subkick_parameters;

use crate::prelude::Float;

#[subkick_parameters("timestep")]
#[derive(Debug)]
pub struct TimestepParameters {
    /// Maximum allowed step in dloga.
    #[serde(default = "default_max_size_timestep")]
    pub max_size_timestep: Float,
    /// Minimum allowed step in dloga.
    #[serde(default)]
    pub min_size_timestep: Float,
    /// The eta of the acceleration criterion.
    #[serde(default = "default_err_tol_int_accuracy")]
    pub err_tol_int_accuracy: Float,
    #[serde(default = "default_courant_fac")]
    pub courant_fac: Float,
    /// Fraction of the mean interparticle spacing the rms
    /// displacement may reach per long-range step.
    #[serde(default = "default_max_rms_displacement_fac")]
    pub max_rms_displacement_fac: Float,
    /// Hard limit on the physical gas velocity, in internal velocity
    /// units. Defaults to the speed of light.
    #[serde(default = "default_max_gas_vel")]
    pub max_gas_vel: Float,
    /// The entropy floor, expressed as a minimal specific energy.
    /// Zero disables the floor.
    #[serde(default)]
    pub min_egy_spec: Float,
    /// Particle type excluded from the displacement constraint
    /// (neutrinos).
    #[serde(default)]
    pub fast_particle_type: Option<usize>,
    /// Reduce every particle to the globally smallest step.
    #[serde(default)]
    pub force_equal_timesteps: bool,
    /// The mesh smoothing scale of the long-range solver, in
    /// internal length units. Caps the displacement criterion.
    #[serde(default)]
    pub mesh_smoothing_scale: Option<Float>,
    /// With tree gravity off every particle gets the maximum step.
    #[serde(default = "default_true")]
    pub tree_gravity: bool,
}

fn default_max_size_timestep() -> Float {
    0.1
}

fn default_err_tol_int_accuracy() -> Float {
    0.02
}

fn default_courant_fac() -> Float {
    0.15
}

fn default_max_rms_displacement_fac() -> Float {
    0.2
}

fn default_max_gas_vel() -> Float {
    2.9979e5
}

fn default_true() -> bool {
    true
}

impl Default for TimestepParameters {
    fn default() -> Self {
        Self {
            max_size_timestep: default_max_size_timestep(),
            min_size_timestep: 0.0,
            err_tol_int_accuracy: default_err_tol_int_accuracy(),
            courant_fac: default_courant_fac(),
            max_rms_displacement_fac: default_max_rms_displacement_fac(),
            max_gas_vel: default_max_gas_vel(),
            min_egy_spec: 0.0,
            fast_particle_type: None,
            force_equal_timesteps: false,
            mesh_smoothing_scale: None,
            tree_gravity: true,
        }
    }
}

#[subkick_parameters]
#[derive(Copy, Debug, Default)]
pub struct SofteningPair {
    /// Comoving Plummer-equivalent softening.
    #[serde(default)]
    pub comoving: Float,
    /// Upper bound on the physical softening; caps the comoving
    /// value at low redshift.
    #[serde(default)]
    pub max_phys: Float,
}

#[subkick_parameters("softening")]
#[derive(Copy, Debug, Default)]
pub struct SofteningParameters {
    #[serde(default)]
    pub gas: SofteningPair,
    #[serde(default)]
    pub halo: SofteningPair,
    #[serde(default)]
    pub disk: SofteningPair,
    #[serde(default)]
    pub bulge: SofteningPair,
    #[serde(default)]
    pub stars: SofteningPair,
    #[serde(default)]
    pub bndry: SofteningPair,
    /// Minimal gas smoothing length in units of the gas force
    /// softening.
    #[serde(default)]
    pub min_gas_hsml_fractional: Float,
}

impl SofteningParameters {
    pub fn pair(&self, class: usize) -> SofteningPair {
        match class {
            0 => self.gas,
            1 => self.halo,
            2 => self.disk,
            3 => self.bulge,
            4 => self.stars,
            5 => self.bndry,
            _ => panic!("Invalid softening class: {}", class),
        }
    }
}
