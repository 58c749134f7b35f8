//! Derived star formation quantities and the equation of state
//! pre-solve that fixes the physical density threshold when the
//! parameter file leaves it open.

use log::info;

use super::model::SfrState;
use super::parameters::StarFormationParameters;
use super::parameters::WindParameters;
use crate::cosmology::Cosmology;
use crate::prelude::Float;
use crate::providers::CoolingModel;
use crate::units::UnitSystem;
use crate::units::GAMMA_MINUS1;
use crate::units::HYDROGEN_MASSFRAC;
use crate::units::PROTONMASS;

/// Computes thresholds, two-phase energies and the wind speed from
/// the parameters.
pub fn set_units_sfr(
    params: &StarFormationParameters,
    wind: &WindParameters,
    units: &UnitSystem,
    cosmology: &Cosmology,
) -> SfrState {
    let g = units.g();
    let hubble = units.hubble();

    let over_dens_thresh = params.crit_over_density * cosmology.omega_baryon() * 3.0 * hubble
        * hubble
        / (8.0 * std::f64::consts::PI * g);

    let phys_dens_thresh =
        params.crit_phys_density * PROTONMASS / HYDROGEN_MASSFRAC / units.density_in_cgs();

    let egy_spec_cold = units.egy_spec_neutral(params.temp_clouds);
    let egy_spec_sn = units.egy_spec_ionized(params.temp_supernova);

    let wind_speed = if wind.model.use_halo {
        let speed = (2.0 * wind.energy_fraction * params.factor_sn * egy_spec_sn
            / (1.0 - params.factor_sn))
            .sqrt();
        if !wind.model.is_none() {
            info!("Reference windspeed: {:e}", wind.sigma0 * wind.speed_factor);
        }
        speed
    } else {
        let speed = (2.0 * wind.energy_fraction * params.factor_sn * egy_spec_sn
            / (1.0 - params.factor_sn)
            / wind.efficiency)
            .sqrt();
        info!("Windspeed: {:e}", speed);
        speed
    };

    SfrState {
        over_dens_thresh,
        phys_dens_thresh,
        egy_spec_cold,
        egy_spec_sn,
        wind_speed,
        u_to_temp_fac: units.u_to_temp_full_ionization(),
        mass_of_star: 0.0,
    }
}

/// Determines the physical density threshold at z = 0 from the
/// requirement that the cooling time of the hot phase equals the
/// cloud evaporation time at the specified cold fraction, then
/// integrates the effective equation of state upward in density
/// until thermal instability (n_eff > 4/3) fails and reports the
/// resulting starburst threshold.
pub fn init_clouds(
    state: &mut SfrState,
    params: &StarFormationParameters,
    units: &UnitSystem,
    cooling: &dyn CoolingModel,
) {
    if state.phys_dens_thresh != 0.0 {
        return;
    }
    let g = units.g();
    let hubble = units.hubble();

    let a0 = params.factor_evp;
    let egyhot = state.egy_spec_sn / a0;
    let u4 = units.egy_spec_ionized(1.0e4);

    let dens = 1.0e6 * 3.0 * hubble * hubble / (8.0 * std::f64::consts::PI * g);

    // the threshold is defined at z = 0, with zeroed ionizing
    // background
    let uvbg = cooling.global_uvbg(true);

    let mut ne = 1.0;
    let tcool = cooling.cooling_time(egyhot, dens, &uvbg, &mut ne, 0.0);
    let coolrate = egyhot / tcool / dens;

    let x = (egyhot - u4) / (egyhot - state.egy_spec_cold);

    state.phys_dens_thresh = x / (1.0 - x).powi(2)
        * (params.factor_sn * state.egy_spec_sn
            - (1.0 - params.factor_sn) * state.egy_spec_cold)
        / (params.max_sfr_timescale * coolrate);

    info!("A0 = {:e}", a0);
    info!(
        "Computed: PhysDensThresh = {:e} (int units) {:e} h^2 cm^-3",
        state.phys_dens_thresh,
        state.phys_dens_thresh / (PROTONMASS / HYDROGEN_MASSFRAC / units.density_in_cgs())
    );
    info!("Expected fraction of cold gas at threshold = {:e}", x);
    info!("tcool={:e} dens={:e} egyhot={:e}", tcool, dens, egyhot);

    // integrate the effective equation of state upward in density to
    // find where the polytropic index drops below 4/3
    let eos_point = |dens: Float, ne: Float| {
        let tsfr = (state.phys_dens_thresh / dens).sqrt() * params.max_sfr_timescale;
        let factor_evp = (dens / state.phys_dens_thresh).powf(-0.8) * params.factor_evp;
        let egyhot = state.egy_spec_sn / (1.0 + factor_evp) + state.egy_spec_cold;
        let mut ne = ne;
        let tcool = cooling.cooling_time(egyhot, dens, &uvbg, &mut ne, 0.0);
        let y = tsfr / tcool * egyhot
            / (params.factor_sn * state.egy_spec_sn
                - (1.0 - params.factor_sn) * state.egy_spec_cold);
        let x = 1.0 + 1.0 / (2.0 * y) - (1.0 / y + 1.0 / (4.0 * y * y)).sqrt();
        let egyeff = egyhot * (1.0 - x) + state.egy_spec_cold * x;
        GAMMA_MINUS1 * dens * egyeff
    };

    let mut dens = state.phys_dens_thresh * 10.0;
    loop {
        let peff = eos_point(dens, 0.5);
        let fac = 1.0 / ((dens * 1.025).ln() - dens.ln());
        dens *= 1.025;
        let neff = -peff.ln() * fac + eos_point(dens, 0.5).ln() * fac;
        if neff <= 4.0 / 3.0 {
            break;
        }
    }

    let threshold_starburst = dens;
    info!("Run-away sets in for dens = {:e}", threshold_starburst);
    info!(
        "Dynamic range for quiescent star formation = {:e}",
        threshold_starburst / state.phys_dens_thresh
    );

    let sigma = 10.0 / hubble * 1.0e-10 / (1.0e-3 as Float).powi(2);
    info!(
        "Isotherm sheet central density: {:e}  z0 = {:e}",
        std::f64::consts::PI * g * sigma * sigma / (2.0 * GAMMA_MINUS1) / u4,
        GAMMA_MINUS1 * u4 / (2.0 * std::f64::consts::PI * g * sigma)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SimpleCooling;

    fn cosmology() -> Cosmology {
        Cosmology::Cosmological {
            omega0: 0.3,
            omega_baryon: 0.04,
            omega_lambda: 0.7,
            hubble_param: 0.7,
        }
    }

    #[test]
    fn derived_two_phase_energies() {
        let params = StarFormationParameters {
            star_formation_on: true,
            ..Default::default()
        };
        let wind = WindParameters::default();
        let units = UnitSystem::default();
        let state = set_units_sfr(&params, &wind, &units, &cosmology());
        // the supernova phase is vastly hotter than the clouds
        assert!(state.egy_spec_sn > 1.0e4 * state.egy_spec_cold);
        assert!(state.over_dens_thresh > 0.0);
        assert!(state.wind_speed > 0.0);
    }

    #[test]
    fn threshold_solve_converges() {
        let params = StarFormationParameters {
            star_formation_on: true,
            crit_phys_density: 0.0,
            ..Default::default()
        };
        let wind = WindParameters::default();
        let units = UnitSystem::default();
        let cooling = SimpleCooling::new(&units);
        let mut state = set_units_sfr(&params, &wind, &units, &cosmology());
        assert_eq!(state.phys_dens_thresh, 0.0);
        init_clouds(&mut state, &params, &units, &cooling);
        assert!(state.phys_dens_thresh > 0.0);
        assert!(state.phys_dens_thresh.is_finite());
    }

    #[test]
    fn configured_threshold_is_kept() {
        let params = StarFormationParameters {
            star_formation_on: true,
            crit_phys_density: 0.1,
            ..Default::default()
        };
        let wind = WindParameters::default();
        let units = UnitSystem::default();
        let cooling = SimpleCooling::new(&units);
        let mut state = set_units_sfr(&params, &wind, &units, &cosmology());
        let configured = state.phys_dens_thresh;
        assert!(configured > 0.0);
        init_clouds(&mut state, &params, &units, &cooling);
        assert_eq!(state.phys_dens_thresh, configured);
    }
}
