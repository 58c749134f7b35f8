use derive_custom::subkick_parameters;

use crate::prelude::Float;

/// The flag set selecting additional star formation criteria on top
/// of the density threshold. All combinations are meaningful.
#[subkick_parameters]
#[derive(Copy, Debug, Default)]
pub struct StarFormationCriterion {
    #[serde(default)]
    pub molecular_h2: bool,
    #[serde(default)]
    pub self_gravity: bool,
    #[serde(default)]
    pub convergent_flow: bool,
    #[serde(default)]
    pub continuous_cutoff: bool,
}

#[subkick_parameters("star_formation")]
#[derive(Debug)]
pub struct StarFormationParameters {
    #[serde(default)]
    pub star_formation_on: bool,
    /// Overdensity threshold in units of the mean baryon density.
    #[serde(default = "default_crit_over_density")]
    pub crit_over_density: Float,
    /// Physical density threshold in hydrogen atoms per cm^3; zero
    /// means "derive from the equation of state".
    #[serde(default)]
    pub crit_phys_density: Float,
    /// The mass fraction of stars ending in supernovae (beta).
    #[serde(default = "default_factor_sn")]
    pub factor_sn: Float,
    /// Cold cloud evaporation parameter A_0.
    #[serde(default = "default_factor_evp")]
    pub factor_evp: Float,
    #[serde(default = "default_temp_supernova")]
    pub temp_supernova: Float,
    #[serde(default = "default_temp_clouds")]
    pub temp_clouds: Float,
    /// The star formation timescale at the threshold, in internal
    /// time units.
    #[serde(default = "default_max_sfr_timescale")]
    pub max_sfr_timescale: Float,
    /// Number of star particles each gas particle may spawn.
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default)]
    pub quick_lyman_alpha_probability: Float,
    #[serde(default)]
    pub criterion: StarFormationCriterion,
}

fn default_crit_over_density() -> Float {
    57.7
}

fn default_factor_sn() -> Float {
    0.1
}

fn default_factor_evp() -> Float {
    1000.0
}

fn default_temp_supernova() -> Float {
    1.0e8
}

fn default_temp_clouds() -> Float {
    1000.0
}

fn default_max_sfr_timescale() -> Float {
    1.5
}

fn default_generations() -> usize {
    4
}

impl Default for StarFormationParameters {
    fn default() -> Self {
        Self {
            star_formation_on: false,
            crit_over_density: default_crit_over_density(),
            crit_phys_density: 0.0,
            factor_sn: default_factor_sn(),
            factor_evp: default_factor_evp(),
            temp_supernova: default_temp_supernova(),
            temp_clouds: default_temp_clouds(),
            max_sfr_timescale: default_max_sfr_timescale(),
            generations: default_generations(),
            quick_lyman_alpha_probability: 0.0,
            criterion: StarFormationCriterion::default(),
        }
    }
}

/// The wind launching variants. Subgrid kicks the star forming
/// particle itself; the other two walk the neighbours of newly-born
/// stars. All combinations of variant and direction are meaningful.
#[subkick_parameters]
#[derive(Copy, Debug, Default)]
pub struct WindModel {
    #[serde(default)]
    pub subgrid: bool,
    #[serde(default)]
    pub fixed_efficiency: bool,
    #[serde(default)]
    pub use_halo: bool,
    /// Draw the launch direction from the unit sphere instead of the
    /// local bipolar axis.
    #[serde(default)]
    pub isotropic: bool,
}

impl WindModel {
    pub fn is_none(&self) -> bool {
        !(self.subgrid || self.fixed_efficiency || self.use_halo)
    }
}

#[subkick_parameters("winds")]
#[derive(Debug)]
pub struct WindParameters {
    #[serde(default)]
    pub model: WindModel,
    /// Wind mass loading eta.
    #[serde(default = "default_efficiency")]
    pub efficiency: Float,
    #[serde(default = "default_energy_fraction")]
    pub energy_fraction: Float,
    /// Normalization of the halo velocity dispersion scaling, in
    /// internal velocity units.
    #[serde(default = "default_sigma0")]
    pub sigma0: Float,
    #[serde(default = "default_speed_factor")]
    pub speed_factor: Float,
    /// Comoving distance a wind particle travels decoupled.
    #[serde(default = "default_free_travel_length")]
    pub free_travel_length: Float,
    /// Fraction of the physical density threshold below which the
    /// wind delay clears early.
    #[serde(default = "default_free_travel_dens_fac")]
    pub free_travel_dens_fac: Float,
}

fn default_efficiency() -> Float {
    2.0
}

fn default_energy_fraction() -> Float {
    1.0
}

fn default_sigma0() -> Float {
    353.0
}

fn default_speed_factor() -> Float {
    3.7
}

fn default_free_travel_length() -> Float {
    20.0
}

fn default_free_travel_dens_fac() -> Float {
    0.1
}

impl Default for WindParameters {
    fn default() -> Self {
        Self {
            model: WindModel::default(),
            efficiency: default_efficiency(),
            energy_fraction: default_energy_fraction(),
            sigma0: default_sigma0(),
            speed_factor: default_speed_factor(),
            free_travel_length: default_free_travel_length(),
            free_travel_dens_fac: default_free_travel_dens_fac(),
        }
    }
}
