use derive_custom::subkick_parameters;

use crate::prelude::Float;

#[subkick_parameters("simulation")]
#[derive(Debug)]
pub struct SimulationParameters {
    /// Scale factor (or time, for non-comoving runs) at which the
    /// run starts.
    pub time_begin: Float,
    pub time_max: Float,
    /// Scale factor of the initial conditions; differs from
    /// time_begin when resuming, so that the integer timeline is
    /// identical to the original run.
    #[serde(default)]
    pub time_ic: Option<Float>,
}

impl SimulationParameters {
    pub fn time_ic(&self) -> Float {
        self.time_ic.unwrap_or(self.time_begin)
    }
}

#[subkick_parameters("output")]
#[derive(Debug, Default)]
pub struct OutputParameters {
    /// Scale factors at which snapshots are requested.
    #[serde(default)]
    pub output_times: Vec<Float>,
    #[serde(default)]
    pub snapshots_with_fof: bool,
    /// Suppress snapshots at sync points earlier than this.
    #[serde(default)]
    pub no_snapshot_until: Option<Float>,
    /// Spacing of the periodic UV background events in megayears of
    /// cosmic time; none disables them.
    #[serde(default)]
    pub uvbg_interval_myr: Option<Float>,
    #[serde(default = "default_uvbg_start_redshift")]
    pub uvbg_start_redshift: Float,
}

fn default_uvbg_start_redshift() -> Float {
    20.0
}
