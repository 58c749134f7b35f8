use bevy_ecs::prelude::Resource;
use derive_custom::subkick_parameters;
use derive_custom::Named;

use crate::prelude::Float;
use crate::timeline::IntegerTime;
use crate::timeline::Timeline;
use crate::units::UnitSystem;
use crate::units::GAMMA_MINUS1;
use crate::units::SEC_PER_MEGAYEAR;

#[subkick_parameters("cosmology")]
#[derive(Copy, Named, Debug)]
#[serde(untagged)]
pub enum Cosmology {
    Cosmological {
        omega0: Float,
        omega_baryon: Float,
        omega_lambda: Float,
        hubble_param: Float,
    },
    NonCosmological,
}

impl Cosmology {
    pub fn is_comoving(&self) -> bool {
        matches!(self, Cosmology::Cosmological { .. })
    }

    pub fn omega0(&self) -> Float {
        match self {
            Cosmology::Cosmological { omega0, .. } => *omega0,
            Cosmology::NonCosmological => 0.0,
        }
    }

    pub fn omega_baryon(&self) -> Float {
        match self {
            Cosmology::Cosmological { omega_baryon, .. } => *omega_baryon,
            Cosmology::NonCosmological => 0.0,
        }
    }

    pub fn omega_cdm(&self) -> Float {
        self.omega0() - self.omega_baryon()
    }

    pub fn little_h(&self) -> Float {
        match self {
            Cosmology::Cosmological { hubble_param, .. } => *hubble_param,
            Cosmology::NonCosmological => 1.0,
        }
    }

    /// H(a) in internal units. For non-comoving runs this is defined
    /// as one, so that dloga intervals are physical time intervals.
    pub fn hubble_function(&self, units: &UnitSystem, a: Float) -> Float {
        match self {
            Cosmology::Cosmological {
                omega0,
                omega_lambda,
                ..
            } => {
                let hubble = units.hubble();
                hubble
                    * (omega0 / (a * a * a)
                        + (1.0 - omega0 - omega_lambda) / (a * a)
                        + omega_lambda)
                        .sqrt()
            }
            Cosmology::NonCosmological => 1.0,
        }
    }

    /// Lookback time from a to a = 1 in megayears.
    pub fn time_to_present_myr(&self, units: &UnitSystem, a: Float) -> Float {
        let n = 1000;
        let loga_start = a.ln();
        let dloga = (0.0 - loga_start) / n as Float;
        let mut sum = 0.0;
        for i in 0..n {
            let loga = loga_start + (i as Float + 0.5) * dloga;
            sum += dloga / self.hubble_function(units, loga.exp());
        }
        sum * units.time_in_s() / SEC_PER_MEGAYEAR
    }

    /// Scale factors of the periodic auxiliary (UV background)
    /// events: every `interval_myr` of cosmic time starting at
    /// `start_redshift`.
    pub fn uvbg_event_times(
        &self,
        units: &UnitSystem,
        time_max: Float,
        start_redshift: Float,
        interval_myr: Float,
    ) -> Vec<Float> {
        if !self.is_comoving() {
            return vec![];
        }
        let mut times = vec![];
        let mut a = 1.0 / (1.0 + start_redshift);
        while a <= time_max {
            times.push(a);
            let delta_a = 1.0e-4;
            let lbt = self.time_to_present_myr(units, a);
            loop {
                a += delta_a;
                if lbt - self.time_to_present_myr(units, a) > interval_myr || a > time_max {
                    break;
                }
            }
        }
        times
    }
}

/// The state of the global clock: the current scale factor together
/// with the conversion factors that depend on it. Updated in one
/// place whenever the clock moves (including temporarily for the
/// z = 0 equation of state solve).
#[derive(Resource, Clone, Copy, Debug)]
pub struct CurrentTime {
    pub a: Float,
    pub a2inv: Float,
    pub a3inv: Float,
    /// a^{3 (gamma - 1)}; converts comoving energy densities.
    pub fac_egy: Float,
    pub hubble: Float,
    pub hubble_a2: Float,
}

pub fn set_global_time(cosmology: &Cosmology, units: &UnitSystem, a: Float) -> CurrentTime {
    let a = if cosmology.is_comoving() { a } else { 1.0 };
    CurrentTime {
        a,
        a2inv: 1.0 / (a * a),
        a3inv: 1.0 / (a * a * a),
        fac_egy: a.powf(3.0 * GAMMA_MINUS1),
        hubble: cosmology.hubble_function(units, a),
        hubble_a2: a * a * cosmology.hubble_function(units, a),
    }
}

enum KickKind {
    Grav,
    Hydro,
    Drift,
}

fn integrate_fac(
    cosmology: &Cosmology,
    units: &UnitSystem,
    timeline: &Timeline,
    ti0: IntegerTime,
    ti1: IntegerTime,
    kind: KickKind,
) -> Float {
    if ti0 == ti1 {
        return 0.0;
    }
    debug_assert!(ti1 > ti0);
    let loga0 = timeline.loga_from_ti(ti0);
    let loga1 = timeline.loga_from_ti(ti1);
    if !cosmology.is_comoving() {
        // H = 1 and a = 1: every factor reduces to the time interval
        return loga1 - loga0;
    }
    let integrand = |loga: Float| {
        let a = match cosmology.is_comoving() {
            true => loga.exp(),
            false => 1.0,
        };
        let h = cosmology.hubble_function(units, a);
        match kind {
            KickKind::Grav => 1.0 / (h * a),
            KickKind::Hydro => 1.0 / (h * a.powf(3.0 * GAMMA_MINUS1) * a),
            KickKind::Drift => 1.0 / (h * a * a),
        }
    };
    // composite Simpson rule; the fixed subdivision keeps restarts
    // bit-identical
    let n = 128;
    let h = (loga1 - loga0) / n as Float;
    let mut sum = integrand(loga0) + integrand(loga1);
    for i in 1..n {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * integrand(loga0 + i as Float * h);
    }
    sum * h / 3.0
}

/// The integration factor of the gravitational kick between two
/// integer times.
pub fn get_gravkick_factor(
    cosmology: &Cosmology,
    units: &UnitSystem,
    timeline: &Timeline,
    ti0: IntegerTime,
    ti1: IntegerTime,
) -> Float {
    integrate_fac(cosmology, units, timeline, ti0, ti1, KickKind::Grav)
}

/// The integration factor of the hydrodynamical kick between two
/// integer times.
pub fn get_hydrokick_factor(
    cosmology: &Cosmology,
    units: &UnitSystem,
    timeline: &Timeline,
    ti0: IntegerTime,
    ti1: IntegerTime,
) -> Float {
    integrate_fac(cosmology, units, timeline, ti0, ti1, KickKind::Hydro)
}

/// The integration factor of the position drift between two integer
/// times.
pub fn get_drift_factor(
    cosmology: &Cosmology,
    units: &UnitSystem,
    timeline: &Timeline,
    ti0: IntegerTime,
    ti1: IntegerTime,
) -> Float {
    integrate_fac(cosmology, units, timeline, ti0, ti1, KickKind::Drift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_close_rel;
    use crate::timeline::SyncPointSpec;
    use crate::timeline::TIMEBASE;

    fn timeline() -> Timeline {
        Timeline::setup(SyncPointSpec {
            time_ic: 0.5,
            time_max: 1.0,
            output_times: vec![],
            no_snapshot_until: None,
            snapshots_with_fof: false,
            uvbg_times: vec![],
        })
    }

    #[test]
    fn kick_factors_match_closed_form_for_matter_only() {
        // For an Einstein-de-Sitter universe the gravkick factor
        // has the closed form 2/H0 (sqrt(a1) - sqrt(a0)).
        let cosmology = Cosmology::Cosmological {
            omega0: 1.0,
            omega_baryon: 0.04,
            omega_lambda: 0.0,
            hubble_param: 0.7,
        };
        let units = UnitSystem::default();
        let timeline = timeline();
        let h0 = units.hubble();
        let fac = get_gravkick_factor(&cosmology, &units, &timeline, 0, TIMEBASE);
        let expected = 2.0 / h0 * (1.0 - (0.5 as Float).sqrt());
        assert_close_rel(fac, expected, 1e-8);
    }

    #[test]
    fn factors_are_additive() {
        let cosmology = Cosmology::Cosmological {
            omega0: 0.3,
            omega_baryon: 0.04,
            omega_lambda: 0.7,
            hubble_param: 0.7,
        };
        let units = UnitSystem::default();
        let timeline = timeline();
        let mid = TIMEBASE / 2;
        let full = get_drift_factor(&cosmology, &units, &timeline, 0, TIMEBASE);
        let first = get_drift_factor(&cosmology, &units, &timeline, 0, mid);
        let second = get_drift_factor(&cosmology, &units, &timeline, mid, TIMEBASE);
        assert_close_rel(full, first + second, 1e-6);
    }

    #[test]
    fn non_cosmological_factors_are_time_intervals() {
        let cosmology = Cosmology::NonCosmological;
        let units = UnitSystem::default();
        let timeline = timeline();
        let fac = get_gravkick_factor(&cosmology, &units, &timeline, 0, TIMEBASE);
        let dloga = timeline.loga_from_ti(TIMEBASE) - timeline.loga_from_ti(0);
        assert_close_rel(fac, dloga, 1e-12);
    }
}
