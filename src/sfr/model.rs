//! The effective multi-phase model: star formation condition,
//! rate, equilibrium energy and entropy relaxation.

use bevy_ecs::prelude::Resource;

use super::parameters::StarFormationParameters;
use crate::cosmology::Cosmology;
use crate::cosmology::CurrentTime;
use crate::prelude::Float;
use crate::prelude::MVec;
use crate::providers::CoolingModel;
use crate::providers::Uvbg;
use crate::units::UnitSystem;
use crate::units::GAMMA;
use crate::units::GAMMA_MINUS1;

pub const METAL_YIELD: Float = 0.02;

/// Quantities derived from the star formation parameters at startup:
/// thresholds, the two-phase specific energies and the wind speed.
#[derive(Resource, Clone, Debug, Default)]
pub struct SfrState {
    pub over_dens_thresh: Float,
    pub phys_dens_thresh: Float,
    pub egy_spec_cold: Float,
    pub egy_spec_sn: Float,
    pub wind_speed: Float,
    pub u_to_temp_fac: Float,
    /// Mass of a spawned star particle (mean initial gas mass over
    /// the generation count).
    pub mass_of_star: Float,
}

pub struct SfrContext<'a> {
    pub params: &'a StarFormationParameters,
    pub state: &'a SfrState,
    pub ct: &'a CurrentTime,
    pub units: &'a UnitSystem,
    pub cosmology: &'a Cosmology,
    pub cooling: &'a dyn CoolingModel,
    pub uvbg: Uvbg,
    /// The energy floor of the run (MinEgySpec).
    pub min_egy_spec: Float,
}

/// The per-particle gas quantities the model reads.
pub struct GasState {
    pub density: Float,
    pub eom_density: Float,
    pub mass: Float,
    pub entropy: Float,
    pub dt_entropy: Float,
    pub ne: Float,
    pub metallicity: Float,
    pub delay_time: Float,
    pub div_vel: Float,
    pub curl_vel: Float,
    pub grad_rho: MVec,
    pub hsml: Float,
}

/// Returns true if the particle is actively forming stars.
pub fn sfr_condition(ctx: &SfrContext, gas: &GasState, dt: Float) -> bool {
    if !ctx.params.star_formation_on {
        return false;
    }
    let mut forming = gas.density * ctx.ct.a3inv >= ctx.state.phys_dens_thresh;
    if gas.density < ctx.state.over_dens_thresh {
        forming = false;
    }
    if gas.mass == 0.0 {
        // swallowed by a black hole
        forming = false;
    }
    if gas.delay_time > 0.0 {
        // only normal cooling for particles in the wind
        forming = false;
    }
    if ctx.params.quick_lyman_alpha_probability > 0.0 {
        let unew = predicted_energy(ctx, gas, dt);
        let temp = ctx.state.u_to_temp_fac * unew;
        forming = gas.density > ctx.state.over_dens_thresh && temp < 1.0e5;
    }
    forming
}

/// The specific energy the particle will have at the end of the
/// step, bounded below by the energy floor.
pub fn predicted_energy(ctx: &SfrContext, gas: &GasState, dt: Float) -> Float {
    let min_egy = ctx.min_egy_spec;
    ((gas.entropy + gas.dt_entropy * dt) / GAMMA_MINUS1
        * (gas.eom_density * ctx.ct.a3inv).powf(GAMMA_MINUS1))
    .max(min_egy)
}

pub struct SfrRate {
    pub rate: Float,
    pub ne: Float,
    pub trelax: Float,
    pub egyeff: Float,
}

/// The star formation rate of the effective model together with the
/// relaxation time and equilibrium energy (Springel & Hernquist
/// 2003).
pub fn get_starformation_rate_full(
    ctx: &SfrContext,
    gas: &GasState,
    dtime: Float,
    forming: bool,
) -> SfrRate {
    if !forming {
        // this shall not happen, but put in safe numbers in case the
        // code runs wary
        return SfrRate {
            rate: 0.0,
            ne: gas.ne,
            trelax: ctx.params.max_sfr_timescale,
            egyeff: ctx.state.egy_spec_cold,
        };
    }
    let rho_phys = gas.density * ctx.ct.a3inv;
    let mut tsfr = (ctx.state.phys_dens_thresh / rho_phys).sqrt() * ctx.params.max_sfr_timescale;
    // without this cap the expected stellar mass can exceed the cold
    // cloud mass
    if tsfr < dtime {
        tsfr = dtime;
    }

    let factor_evp =
        (rho_phys / ctx.state.phys_dens_thresh).powf(-0.8) * ctx.params.factor_evp;
    let egyhot = ctx.state.egy_spec_sn / (1.0 + factor_evp) + ctx.state.egy_spec_cold;

    let mut ne = gas.ne;
    let tcool = ctx
        .cooling
        .cooling_time(egyhot, rho_phys, &ctx.uvbg, &mut ne, gas.metallicity);

    let y = tsfr / tcool * egyhot
        / (ctx.params.factor_sn * ctx.state.egy_spec_sn
            - (1.0 - ctx.params.factor_sn) * ctx.state.egy_spec_cold);
    let x = 1.0 + 1.0 / (2.0 * y) - (1.0 / y + 1.0 / (4.0 * y * y)).sqrt();

    let cloudmass = x * gas.mass;

    let mut rate = (1.0 - ctx.params.factor_sn) * cloudmass / tsfr;

    let trelax = tsfr * (1.0 - x) / x / (ctx.params.factor_sn * (1.0 + factor_evp));
    let egyeff = egyhot * (1.0 - x) + ctx.state.egy_spec_cold * x;

    if ctx.params.criterion.molecular_h2 {
        rate *= sfr_factor_due_to_h2(ctx, gas);
    }
    if ctx.params.criterion.self_gravity {
        rate *= sfr_factor_due_to_selfgravity(ctx, gas);
    }

    SfrRate {
        rate,
        ne,
        trelax,
        egyeff,
    }
}

/// Relaxes the entropy exponentially towards the equilibrium energy
/// of the effective equation of state.
pub fn cooling_relaxed(
    ctx: &SfrContext,
    entropy: &mut Float,
    dt_entropy: &mut Float,
    eom_density: Float,
    egyeff: Float,
    dtime: Float,
    trelax: Float,
) {
    let densityfac = (eom_density * ctx.ct.a3inv).powf(GAMMA_MINUS1) / GAMMA_MINUS1;
    let egycurrent = *entropy * densityfac;
    *entropy = (egyeff + (egycurrent - egyeff) * (-dtime / trelax).exp()) / densityfac;
    *dt_entropy = 0.0;
}

/// Column density from the density gradient, used by the molecular
/// fraction fit.
fn nh_from_grad_rho(grad_rho: MVec, hsml: Float, rho: Float, include_h: Float) -> Float {
    if rho <= 0.0 {
        return 0.0;
    }
    let mut gradrho_mag = grad_rho.length();
    if gradrho_mag > 0.0 {
        gradrho_mag = rho * rho / gradrho_mag;
    }
    if include_h > 0.0 {
        gradrho_mag += include_h * rho * hsml;
    }
    gradrho_mag
}

/// Krumholz & Gnedin fitting function for the molecular hydrogen
/// fraction as a function of local properties; returns the
/// enhancement on the star formation rate.
fn sfr_factor_due_to_h2(ctx: &SfrContext, gas: &GasState) -> Float {
    let zoverzsun = gas.metallicity / METAL_YIELD;
    if gas.grad_rho == MVec::ZERO {
        // no column density estimate available
        return 1.0;
    }
    let mut tau_fmol =
        nh_from_grad_rho(gas.grad_rho, gas.hsml, gas.density, 1.0) * ctx.ct.a2inv;
    tau_fmol *= 0.1 + zoverzsun;
    if tau_fmol > 0.0 {
        tau_fmol *= 434.78
            * ctx.units.density_in_cgs()
            * ctx.cosmology.little_h()
            * ctx.units.length_in_cm;
        let mut y = 0.756 * (1.0 + 3.1 * zoverzsun.powf(0.365));
        y = (1.0 + 0.6 * y + 0.01 * y * y).ln() / (0.6 * tau_fmol);
        y = 1.0 - 0.75 * y / (1.0 + 0.25 * y);
        return y.clamp(0.0, 1.0);
    }
    1.0
}

/// Virial-parameter based enhancement; restricts star formation to
/// self-gravitating (and optionally convergent) flows.
fn sfr_factor_due_to_selfgravity(ctx: &SfrContext, gas: &GasState) -> Float {
    let mut divv = gas.div_vel * ctx.ct.a2inv;
    divv += 3.0 * ctx.ct.hubble_a2; // hubble-flow correction

    if ctx.params.criterion.convergent_flow && divv >= 0.0 {
        // restrict to convergent flows
        return 0.0;
    }

    let curl = gas.curl_vel * ctx.ct.a2inv;
    let dv2abs = divv * divv + curl * curl; // all in physical units
    let alpha_vir = 0.2387 * dv2abs / (ctx.units.g() * gas.density * ctx.ct.a3inv);

    let mut y = if alpha_vir < 1.0
        || gas.density * ctx.ct.a3inv > 100.0 * ctx.state.phys_dens_thresh
    {
        66.7
    } else {
        0.1
    };

    if ctx.params.criterion.continuous_cutoff {
        // continuous cutoff with alpha_vir instead of sharp
        y *= 1.0 / (1.0 + alpha_vir);
    }
    y
}

/// Normal implicit isochoric cooling; returns the new entropy
/// derivative.
pub fn cooling_direct(
    ctx: &SfrContext,
    gas: &GasState,
    dt: Float,
    dtime: Float,
    time_bin: usize,
) -> (Float, Float, Float) {
    let mut ne = gas.ne;
    let unew = predicted_energy(ctx, gas, dt);
    let rho_phys = gas.density * ctx.ct.a3inv;
    let unew = ctx
        .cooling
        .do_cooling(unew, rho_phys, dtime, &ctx.uvbg, &mut ne, gas.metallicity);

    let mut dt_entropy = gas.dt_entropy;
    // upon start-up we need to protect against dt == 0
    if time_bin > 0 && dt > 0.0 {
        dt_entropy = (unew * GAMMA_MINUS1 / (gas.eom_density * ctx.ct.a3inv).powf(GAMMA_MINUS1)
            - gas.entropy)
            / dt;
        if dt_entropy < -0.5 * gas.entropy / dt {
            dt_entropy = -0.5 * gas.entropy / dt;
        }
    }
    (unew, dt_entropy, ne)
}

/// The entropy variable corresponding to a specific energy at the
/// given equation of motion density.
pub fn entropy_from_energy(u: Float, eom_density_phys: Float) -> Float {
    GAMMA_MINUS1 * u / eom_density_phys.powf(GAMMA_MINUS1)
}

pub fn ent_var_from_entropy(entropy: Float) -> Float {
    entropy.max(Float::MIN_POSITIVE).powf(1.0 / GAMMA)
}

#[cfg(test)]
mod tests {
    use crate::prelude::Float;

    /// The cold fraction solve: x = 1 + 1/(2y) - sqrt(1/y + 1/(4y^2))
    /// approaches one for strong cooling and zero for weak cooling.
    #[test]
    fn cold_fraction_limits() {
        let x = |y: Float| 1.0 + 1.0 / (2.0 * y) - (1.0 / y + 1.0 / (4.0 * y * y)).sqrt();
        assert!(x(1.0e6) > 0.998);
        assert!(x(1.0e-6) < 1.0e-2);
        let mid = x(1.0);
        assert!(mid > 0.0 && mid < 1.0);
        // monotonic in y
        assert!(x(2.0) > x(1.0));
    }
}
