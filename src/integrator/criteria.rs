//! The per-particle timestep criteria. Returns raw tick counts; the
//! caller rounds down to a power of two and maps to a bin.

use super::parameters::TimestepParameters;
use super::softening::SofteningTable;
use crate::components::BlackHole;
use crate::cosmology::CurrentTime;
use crate::prelude::Float;
use crate::prelude::MVec;
use crate::prelude::ParticleType;
use crate::timeline::IntegerTime;
use crate::timeline::Timeline;
use crate::timeline::TIMEBASE;
use crate::units::GAMMA;

pub struct GasTimestepData {
    pub hydro_accel: MVec,
    pub hsml: Float,
    pub max_signal_vel: Float,
    pub density: Float,
    pub sfr: Float,
}

pub struct TimestepData<'a> {
    pub id: u64,
    pub ptype: ParticleType,
    pub position: MVec,
    pub grav_accel: MVec,
    pub grav_pm: MVec,
    pub gas: Option<GasTimestepData>,
    pub bh: Option<&'a BlackHole>,
}

/// Diagnostics of a timestep underflow; the step loop aggregates
/// these and aborts the run after an emergency snapshot.
pub struct BadStep {
    pub message: String,
}

/// The maximum allowed timestep of a particle in ticks of the
/// integer timeline. `dti_max` is the global displacement
/// constraint.
pub fn get_timestep(
    data: &TimestepData,
    ct: &CurrentTime,
    params: &TimestepParameters,
    softening: &SofteningTable,
    timeline: &Timeline,
    dti_max: IntegerTime,
) -> Result<IntegerTime, BadStep> {
    if dti_max == 0 {
        return Ok(0);
    }
    // with the tree off there is nothing to constrain the step
    if !params.tree_gravity {
        return Ok(dti_max);
    }

    let mut a_phys = ct.a2inv * (data.grav_accel + data.grav_pm);
    if let Some(gas) = &data.gas {
        let fac2 = 1.0 / ct.a.powf(3.0 * GAMMA - 2.0);
        a_phys += fac2 * gas.hydro_accel;
    }
    let mut ac = a_phys.length();
    if ac == 0.0 {
        ac = 1.0e-30;
    }

    let class = data.ptype.softening_class();
    let dt_accel =
        (2.0 * params.err_tol_int_accuracy * ct.a * softening.plummer(class) / ac).sqrt();
    let mut dt = dt_accel;

    let mut dt_courant = 0.0;
    if let Some(gas) = &data.gas {
        let fac3 = ct.a.powf(3.0 * (1.0 - GAMMA) / 2.0);
        if gas.max_signal_vel > 0.0 {
            dt_courant = 2.0 * params.courant_fac * ct.a * gas.hsml / (fac3 * gas.max_signal_vel);
            if dt_courant < dt {
                dt = dt_courant;
            }
        }
    }

    if let Some(bh) = data.bh {
        if bh.mdot > 0.0 && bh.mass > 0.0 {
            let dt_accr = 0.25 * bh.mass / bh.mdot;
            if dt_accr < dt {
                dt = dt_accr;
            }
        }
        if let Some(limit) = bh.time_bin_limit {
            let dt_limiter = timeline.get_dloga_for_bin(limit) / ct.hubble;
            if dt_limiter < dt {
                dt = dt_limiter;
            }
        }
    }

    // convert the physical timestep to dloga. For non-comoving
    // integration hubble is one.
    dt *= ct.hubble;

    if dt < params.min_size_timestep {
        dt = params.min_size_timestep;
    }

    let dloga_per_tick = timeline.dloga_interval(timeline.ti_current());
    if dloga_per_tick == 0.0 {
        // past the last sync point; the caller closes the run
        return Ok(dti_max);
    }
    let mut ti_step = (dt / dloga_per_tick) as IntegerTime;

    if ti_step > dti_max {
        ti_step = dti_max;
    }

    if !(ti_step > 1 && ti_step < TIMEBASE) {
        let mut message = format!(
            "A timestep of size zero was assigned on the integer timeline! \
             type {:?} Part-ID={} dt={:e} dtc={:e} dtdis={} tibase={:e} ti_step={} ac={:e} \
             xyz=({:e}|{:e}|{:e}) tree=({:e}|{:e}|{:e}) dt0={:e} ErrTolIntAccuracy={:e} \
             pm_force=({:e}|{:e}|{:e})",
            data.ptype,
            data.id,
            dt,
            dt_courant,
            dti_max,
            dloga_per_tick,
            ti_step,
            ac,
            data.position.x,
            data.position.y,
            data.position.z,
            data.grav_accel.x,
            data.grav_accel.y,
            data.grav_accel.z,
            dt_accel * ct.hubble,
            params.err_tol_int_accuracy,
            data.grav_pm.x,
            data.grav_pm.y,
            data.grav_pm.z,
        );
        if let Some(gas) = &data.gas {
            message += &format!(
                " hydro-frc=({:e}|{:e}|{:e}) dens={:e} hsml={:e} sfr={:e}",
                gas.hydro_accel.x,
                gas.hydro_accel.y,
                gas.hydro_accel.z,
                gas.density,
                gas.hsml,
                gas.sfr,
            );
        }
        return Err(BadStep { message });
    }

    Ok(ti_step)
}

/// Maps a power-of-two tick count to its bin index; 0 ticks map to
/// bin 0, a single tick is below the resolution of the timeline and
/// yields None (the fatal "bin = -1" of the original).
pub fn get_timestep_bin(ti_step: IntegerTime) -> Option<usize> {
    if ti_step == 0 {
        return Some(0);
    }
    if ti_step == 1 {
        return None;
    }
    let mut bin = 0;
    let mut ti = ti_step;
    while ti > 0 {
        bin += 1;
        ti >>= 1;
    }
    Some(bin - 1)
}

#[cfg(test)]
mod tests {
    use super::get_timestep_bin;

    #[test]
    fn bin_from_ticks() {
        assert_eq!(get_timestep_bin(0), Some(0));
        assert_eq!(get_timestep_bin(1), None);
        assert_eq!(get_timestep_bin(2), Some(1));
        assert_eq!(get_timestep_bin(4), Some(2));
        assert_eq!(get_timestep_bin(1 << 20), Some(20));
    }
}
