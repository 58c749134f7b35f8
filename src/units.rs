//! Internal code units and physical constants. All per-particle
//! arithmetic happens in internal units; this module holds the
//! conversion factors to and from cgs.

use derive_custom::subkick_parameters;

use crate::prelude::Float;

pub const GAMMA: Float = 5.0 / 3.0;
pub const GAMMA_MINUS1: Float = GAMMA - 1.0;

/// Gravitational constant in cgs.
pub const GRAVITY: Float = 6.672e-8;
pub const BOLTZMANN: Float = 1.38066e-16;
pub const PROTONMASS: Float = 1.6726e-24;
pub const HYDROGEN_MASSFRAC: Float = 0.76;
pub const SOLAR_MASS: Float = 1.989e33;
pub const SEC_PER_YEAR: Float = 3.155e7;
pub const SEC_PER_MEGAYEAR: Float = 3.155e13;
/// 100 km/s/Mpc in 1/s; the Hubble constant is `hubble_param` times this.
pub const HUBBLE: Float = 3.2407789e-18;

/// The unit system of the run, defaulting to the conventional
/// kpc / 1e10 M_sun / km/s choice of cosmological codes.
#[subkick_parameters("units")]
#[derive(Copy, Debug)]
pub struct UnitSystem {
    #[serde(default = "default_unit_length")]
    pub length_in_cm: Float,
    #[serde(default = "default_unit_mass")]
    pub mass_in_g: Float,
    #[serde(default = "default_unit_velocity")]
    pub velocity_in_cm_per_s: Float,
}

fn default_unit_length() -> Float {
    3.085678e21
}

fn default_unit_mass() -> Float {
    1.989e43
}

fn default_unit_velocity() -> Float {
    1.0e5
}

impl Default for UnitSystem {
    fn default() -> Self {
        Self {
            length_in_cm: default_unit_length(),
            mass_in_g: default_unit_mass(),
            velocity_in_cm_per_s: default_unit_velocity(),
        }
    }
}

impl UnitSystem {
    pub fn time_in_s(&self) -> Float {
        self.length_in_cm / self.velocity_in_cm_per_s
    }

    pub fn density_in_cgs(&self) -> Float {
        self.mass_in_g / self.length_in_cm.powi(3)
    }

    pub fn energy_in_cgs(&self) -> Float {
        self.mass_in_g * self.velocity_in_cm_per_s.powi(2)
    }

    /// The gravitational constant in internal units.
    pub fn g(&self) -> Float {
        GRAVITY / self.length_in_cm.powi(3) * self.mass_in_g * self.time_in_s().powi(2)
    }

    /// 100 km/s/Mpc in internal units.
    pub fn hubble(&self) -> Float {
        HUBBLE * self.time_in_s()
    }

    /// Conversion factor from specific internal energy to temperature,
    /// assuming full ionization.
    pub fn u_to_temp_full_ionization(&self) -> Float {
        let meanweight = 4.0 / (8.0 - 5.0 * (1.0 - HYDROGEN_MASSFRAC));
        meanweight * PROTONMASS / BOLTZMANN * GAMMA_MINUS1 * self.energy_in_cgs() / self.mass_in_g
    }

    /// Specific thermal energy (internal units) of neutral gas at the
    /// given temperature.
    pub fn egy_spec_neutral(&self, temperature: Float) -> Float {
        let meanweight = 4.0 / (1.0 + 3.0 * HYDROGEN_MASSFRAC);
        1.0 / meanweight * (1.0 / GAMMA_MINUS1) * (BOLTZMANN / PROTONMASS) * temperature
            * self.mass_in_g
            / self.energy_in_cgs()
    }

    /// Specific thermal energy (internal units) of fully ionized gas
    /// at the given temperature.
    pub fn egy_spec_ionized(&self, temperature: Float) -> Float {
        let meanweight = 4.0 / (8.0 - 5.0 * (1.0 - HYDROGEN_MASSFRAC));
        1.0 / meanweight * (1.0 / GAMMA_MINUS1) * (BOLTZMANN / PROTONMASS) * temperature
            * self.mass_in_g
            / self.energy_in_cgs()
    }
}

#[cfg(test)]
mod tests {
    use super::UnitSystem;
    use crate::test_utils::assert_close_rel;

    #[test]
    fn derived_units() {
        let units = UnitSystem::default();
        // kpc / (km/s) is roughly a gigayear
        assert_close_rel(units.time_in_s(), 3.085678e16, 1e-10);
        // the conventional value of G in these units
        assert_close_rel(units.g(), 43007.1, 1e-3);
        // H = 100 km/s/Mpc
        assert_close_rel(units.hubble(), 0.1, 1e-3);
    }

    #[test]
    fn u_to_temp() {
        let units = UnitSystem::default();
        // 1e4 K gas has a specific energy of roughly 1.2 (km/s)^2
        // per unit mass for full ionization
        let u4 = units.egy_spec_ionized(1.0e4);
        assert!(u4 > 100.0 && u4 < 300.0);
        assert_close_rel(u4 * units.u_to_temp_full_ionization(), 1.0e4, 1e-10);
    }
}
