use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::ResMut;

use super::displacement::update_displacement_constraint;
use super::displacement::DisplacementConstraint;
use super::parameters::TimestepParameters;
use super::PmState;
use crate::components::GravityAccel;
use crate::components::GravityPmAccel;
use crate::components::HydroAccel;
use crate::components::Mass;
use crate::components::PredictedVelocity;
use crate::components::TiBegStep;
use crate::components::TimeBin;
use crate::components::Velocity;
use crate::cosmology::get_gravkick_factor;
use crate::cosmology::get_hydrokick_factor;
use crate::cosmology::Cosmology;
use crate::cosmology::CurrentTime;
use crate::prelude::Float;
use crate::prelude::MVec;
use crate::prelude::ParticleType;
use crate::prelude::Particles;
use crate::timeline::round_down_power_of_two;
use crate::timeline::IntegerTime;
use crate::timeline::Timeline;
use crate::units::UnitSystem;
use crate::units::GAMMA_MINUS1;

pub struct KickContext<'a> {
    pub timeline: &'a Timeline,
    pub cosmology: &'a Cosmology,
    pub units: &'a UnitSystem,
    pub ct: &'a CurrentTime,
    pub params: &'a TimestepParameters,
}

impl KickContext<'_> {
    fn gravkick(&self, ti0: IntegerTime, ti1: IntegerTime) -> Float {
        get_gravkick_factor(self.cosmology, self.units, self.timeline, ti0, ti1)
    }

    fn hydrokick(&self, ti0: IntegerTime, ti1: IntegerTime) -> Float {
        get_hydrokick_factor(self.cosmology, self.units, self.timeline, ti0, ti1)
    }
}

pub struct GasKick<'a> {
    pub vel_pred: &'a mut MVec,
    pub entropy: &'a mut Float,
    pub dt_entropy: &'a mut Float,
    pub hydro_accel: MVec,
    pub grav_pm: MVec,
    pub eom_density: Float,
    pub time_bin: usize,
}

/// Applies the combined half-step kicks between the midpoint of the
/// previous step and the midpoint of the new one, together with the
/// velocity and entropy limiters.
pub fn do_the_kick(
    ctx: &KickContext,
    tstart: IntegerTime,
    tend: IntegerTime,
    tcurrent: IntegerTime,
    dt_gravkick_pm: Float,
    vel: &mut MVec,
    grav_accel: MVec,
    gas: Option<GasKick>,
) {
    let mut dt_entr = ctx.timeline.dloga_from_dti(tend - tstart);
    let dt_gravkick = ctx.gravkick(tstart, tend);
    let dt_hydrokick = ctx.hydrokick(tstart, tend);
    let dt_gravkick2 = ctx.gravkick(tcurrent, tend);
    let dt_hydrokick2 = ctx.hydrokick(tcurrent, tend);

    *vel += grav_accel * dt_gravkick;

    let gas = match gas {
        Some(gas) => gas,
        None => return,
    };

    *vel += gas.hydro_accel * dt_hydrokick;
    *gas.vel_pred =
        *vel - dt_gravkick2 * grav_accel - dt_hydrokick2 * gas.hydro_accel + gas.grav_pm * dt_gravkick_pm;

    // hard limit on the gas velocity, then limits on the entropy
    // change
    let velfac = ctx.ct.a3inv.sqrt();
    let vv = vel.length();
    if vv > ctx.params.max_gas_vel * velfac && vv > 0.0 {
        *vel *= ctx.params.max_gas_vel * velfac / vv;
        *gas.vel_pred = *vel - dt_gravkick2 * grav_accel - dt_hydrokick2 * gas.hydro_accel
            + gas.grav_pm * dt_gravkick_pm;
    }

    // the entropy (and hence temperature) may not drop by more than
    // a factor of two over the step
    if *gas.dt_entropy * dt_entr > -0.5 * *gas.entropy {
        *gas.entropy += *gas.dt_entropy * dt_entr;
    } else {
        *gas.entropy *= 0.5;
    }

    if ctx.params.min_egy_spec > 0.0 {
        let minentropy = ctx.params.min_egy_spec * GAMMA_MINUS1
            / (gas.eom_density * ctx.ct.a3inv).powf(GAMMA_MINUS1);
        if *gas.entropy < minentropy {
            *gas.entropy = minentropy;
            *gas.dt_entropy = 0.0;
        }
    }

    // in case the timestep increases in the new step, make sure we
    // do not 'overcool'
    dt_entr = ctx.timeline.get_dloga_for_bin(gas.time_bin) / 2.0;
    if dt_entr > 0.0 && *gas.entropy + *gas.dt_entropy * dt_entr < 0.5 * *gas.entropy {
        *gas.dt_entropy = -0.5 * *gas.entropy / dt_entr;
    }
}

/// Advances the long-range step and applies the mesh kick to every
/// particle, refreshing all gas velocity predictions.
pub(super) fn long_range_kick_system(
    timeline: Res<Timeline>,
    cosmology: Res<Cosmology>,
    units: Res<UnitSystem>,
    ct: Res<CurrentTime>,
    params: Res<TimestepParameters>,
    mut pm: ResMut<PmState>,
    mut constraint: ResMut<DisplacementConstraint>,
    mut particles: Particles<(
        &mut Velocity,
        &ParticleType,
        &Mass,
        &GravityPmAccel,
        &TimeBin,
        &TiBegStep,
        Option<(
            &mut PredictedVelocity,
            &GravityAccel,
            &HydroAccel,
        )>,
    )>,
) {
    if pm.ti_endstep != timeline.ti_current() {
        return;
    }

    update_displacement_constraint(
        particles
            .iter()
            .map(|(vel, ptype, mass, ..)| (*ptype, vel.length_squared(), mass.0)),
        &mut constraint,
        &ct,
        &cosmology,
        &units,
        &params,
        &timeline,
        &pm,
    );

    let mut ti_step = round_down_power_of_two(constraint.dti_max);
    // make it a little larger so it will go through the output time
    ti_step <<= 1;

    if timeline.find_next_sync_point(timeline.ti_current()).is_none() {
        // we here finish the last timestep
        ti_step = 0;
    }

    let tstart = (pm.ti_begstep + pm.ti_endstep) / 2;
    let tend = pm.ti_endstep + ti_step / 2;

    let dt_gravkick = get_gravkick_factor(&cosmology, &units, &timeline, tstart, tend);

    pm.ti_begstep = pm.ti_endstep;
    pm.ti_endstep = pm.ti_begstep + ti_step;

    let mid = (pm.ti_begstep + pm.ti_endstep) / 2;
    let dt_gravkick_pm = -get_gravkick_factor(&cosmology, &units, &timeline, pm.ti_begstep, mid);

    let ti_current = timeline.ti_current();
    for (mut vel, _, _, grav_pm, bin, beg_step, gas) in particles.iter_mut() {
        **vel += grav_pm.0 * dt_gravkick;

        if let Some((mut vel_pred, grav_accel, hydro_accel)) = gas {
            let dt_step = if bin.0 > 0 { 1 << bin.0 } else { 0 };
            let half = beg_step.0 + dt_step / 2;
            let dt_gravkick_a =
                get_gravkick_factor(&cosmology, &units, &timeline, beg_step.0, ti_current)
                    - get_gravkick_factor(&cosmology, &units, &timeline, beg_step.0, half);
            let dt_hydrokick_a =
                get_hydrokick_factor(&cosmology, &units, &timeline, beg_step.0, ti_current)
                    - get_hydrokick_factor(&cosmology, &units, &timeline, beg_step.0, half);
            **vel_pred = **vel
                + grav_accel.0 * dt_gravkick_a
                + hydro_accel.0 * dt_hydrokick_a
                + grav_pm.0 * dt_gravkick_pm;
        }
    }
}
