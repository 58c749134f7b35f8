use super::CoolingModel;
use crate::prelude::Float;
use crate::units::UnitSystem;
use crate::units::HYDROGEN_MASSFRAC;
use crate::units::PROTONMASS;

/// The photo-heating rate per hydrogen atom in erg/s.
#[derive(Clone, Copy, Debug, Default)]
pub struct Uvbg {
    pub heating_rate: Float,
}

/// Free-free cooling with an optional constant photo-heating floor.
/// This is not a production cooling table; it has the right
/// qualitative shape (monotonic in density, hot gas always cools)
/// which is all the equation of state pre-solve and the integrator
/// need from the cooling interface.
pub struct SimpleCooling {
    density_to_cgs: Float,
    u_to_cgs: Float,
    time_to_s: Float,
    u_to_temp: Float,
    heating_rate: Float,
}

/// Free-free emissivity prefactor in erg cm^3 / s / sqrt(K).
const LAMBDA_FF: Float = 1.42e-27;
/// Temperature floor of the model in K.
const TEMP_MIN: Float = 10.0;

impl SimpleCooling {
    pub fn new(units: &UnitSystem) -> Self {
        Self::with_heating(units, 1.0e-25)
    }

    pub fn with_heating(units: &UnitSystem, heating_rate: Float) -> Self {
        Self {
            density_to_cgs: units.density_in_cgs(),
            u_to_cgs: units.energy_in_cgs() / units.mass_in_g,
            time_to_s: units.time_in_s(),
            u_to_temp: units.u_to_temp_full_ionization(),
            heating_rate,
        }
    }

    /// Net du/dt in cgs; negative when cooling.
    fn net_rate_cgs(&self, u: Float, rho_phys: Float, uvbg: &Uvbg, ne: Float) -> Float {
        let rho_cgs = rho_phys * self.density_to_cgs;
        let n_h = HYDROGEN_MASSFRAC * rho_cgs / PROTONMASS;
        let temp = (u * self.u_to_temp).max(TEMP_MIN);
        let cool = LAMBDA_FF * temp.sqrt() * ne * n_h * n_h / rho_cgs;
        let heat = uvbg.heating_rate * n_h / rho_cgs;
        heat - cool
    }
}

impl CoolingModel for SimpleCooling {
    fn global_uvbg(&self, zero_ionization: bool) -> Uvbg {
        if zero_ionization {
            Uvbg { heating_rate: 0.0 }
        } else {
            Uvbg {
                heating_rate: self.heating_rate,
            }
        }
    }

    fn do_cooling(
        &self,
        u: Float,
        rho_phys: Float,
        dt_phys: Float,
        uvbg: &Uvbg,
        ne: &mut Float,
        _metallicity: Float,
    ) -> Float {
        let u_min = TEMP_MIN / self.u_to_temp;
        let mut u = u.max(u_min);
        let mut remaining = dt_phys * self.time_to_s;
        // explicit sub-cycling, limited to 10% energy change per step
        for _ in 0..200 {
            if remaining <= 0.0 {
                break;
            }
            let rate = self.net_rate_cgs(u, rho_phys, uvbg, *ne) / self.u_to_cgs;
            if rate == 0.0 {
                break;
            }
            let dt_max = 0.1 * u / rate.abs();
            let dt = remaining.min(dt_max);
            u = (u + rate * dt).max(u_min);
            remaining -= dt;
        }
        // fully ionized throughout in this model
        *ne = 1.0;
        u
    }

    fn cooling_time(
        &self,
        u: Float,
        rho_phys: Float,
        uvbg: &Uvbg,
        ne: &mut Float,
        _metallicity: Float,
    ) -> Float {
        let rate = self.net_rate_cgs(u, rho_phys, uvbg, *ne);
        *ne = 1.0;
        if rate >= 0.0 {
            // net heating: no finite cooling time
            return 0.0;
        }
        let u_cgs = u * self.u_to_cgs;
        u_cgs / (-rate) / self.time_to_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitSystem;

    #[test]
    fn hot_dense_gas_cools() {
        let units = UnitSystem::default();
        let cooling = SimpleCooling::new(&units);
        let uvbg = cooling.global_uvbg(true);
        let mut ne = 1.0;
        let u_hot = units.egy_spec_ionized(1.0e6);
        let rho = 1.0e-2;
        let tcool = cooling.cooling_time(u_hot, rho, &uvbg, &mut ne, 0.0);
        assert!(tcool > 0.0);
        let u_new = cooling.do_cooling(u_hot, rho, tcool, &uvbg, &mut ne, 0.0);
        assert!(u_new < u_hot);
    }

    #[test]
    fn cooling_time_shrinks_with_density() {
        let units = UnitSystem::default();
        let cooling = SimpleCooling::new(&units);
        let uvbg = cooling.global_uvbg(true);
        let mut ne = 1.0;
        let u = units.egy_spec_ionized(1.0e6);
        let t1 = cooling.cooling_time(u, 1.0e-3, &uvbg, &mut ne, 0.0);
        let t2 = cooling.cooling_time(u, 1.0e-2, &uvbg, &mut ne, 0.0);
        assert!(t2 < t1);
    }
}
