//! The integer timeline. The simulated span of log a is divided into
//! intervals delimited by sync points; each interval is subdivided
//! into `TIMEBASE` ticks. The high bits of an integer time index the
//! sync interval, the low `TIMEBINS` bits the sub-step within it,
//! which keeps per-particle time arithmetic in integers and makes
//! restarts bit-identical.

use bevy_ecs::prelude::Resource;

use crate::endrun;
use crate::prelude::Float;

pub type IntegerTime = u64;

/// The number of power-of-two timestep bins; a bin-b timestep spans
/// 2^b ticks.
pub const TIMEBINS: u32 = 29;
/// The number of ticks between two sync points.
pub const TIMEBASE: IntegerTime = 1 << TIMEBINS;

/// A position on the timeline at which all particles are
/// synchronized and global actions (output, auxiliary events) may
/// happen.
#[derive(Debug, Clone)]
pub struct SyncPoint {
    pub a: Float,
    pub loga: Float,
    pub ti: IntegerTime,
    pub write_snapshot: bool,
    pub write_fof: bool,
    pub calc_uvbg: bool,
}

impl SyncPoint {
    fn new(a: Float) -> Self {
        Self {
            a,
            loga: a.ln(),
            ti: 0,
            write_snapshot: false,
            write_fof: false,
            calc_uvbg: false,
        }
    }
}

#[derive(Resource)]
pub struct Timeline {
    sync_points: Vec<SyncPoint>,
    ti_current: IntegerTime,
}

/// Requested entries for the sync point table, before merging.
pub struct SyncPointSpec {
    pub time_ic: Float,
    pub time_max: Float,
    pub output_times: Vec<Float>,
    /// No snapshots are written at sync points earlier than this.
    pub no_snapshot_until: Option<Float>,
    pub snapshots_with_fof: bool,
    /// Scale factors of auxiliary (UV background) events.
    pub uvbg_times: Vec<Float>,
}

impl Timeline {
    pub fn setup(spec: SyncPointSpec) -> Self {
        let mut sync_points = vec![SyncPoint::new(spec.time_ic)];

        for &a in spec.uvbg_times.iter() {
            if a > spec.time_max {
                continue;
            }
            let mut point = SyncPoint::new(a);
            point.write_snapshot = true;
            point.calc_uvbg = true;
            insert_sorted(&mut sync_points, point);
        }

        let no_snapshot_until = spec.no_snapshot_until.unwrap_or(0.0);
        for &a in spec.output_times.iter() {
            if a > spec.time_max {
                // beyond TimeMax, skip
                continue;
            }
            let index = match sync_points.iter().position(|p| (p.a - a).abs() < f64::EPSILON) {
                Some(index) => index,
                None => insert_sorted(&mut sync_points, SyncPoint::new(a)),
            };
            if sync_points[index].a > no_snapshot_until {
                sync_points[index].write_snapshot = true;
                sync_points[index].write_fof = spec.snapshots_with_fof;
            } else {
                sync_points[index].write_snapshot = false;
                sync_points[index].write_fof = false;
                sync_points[index].calc_uvbg = false;
            }
        }

        if sync_points.last().map(|p| p.a) != Some(spec.time_max) {
            insert_sorted(&mut sync_points, SyncPoint::new(spec.time_max));
        }

        for (k, point) in sync_points.iter_mut().enumerate() {
            point.ti = (k as IntegerTime) << TIMEBINS;
        }

        Self {
            sync_points,
            ti_current: 0,
        }
    }

    pub fn ti_current(&self) -> IntegerTime {
        self.ti_current
    }

    pub fn advance(&mut self, ti: IntegerTime) {
        debug_assert!(ti >= self.ti_current);
        self.ti_current = ti;
    }

    pub fn sync_points(&self) -> &[SyncPoint] {
        &self.sync_points
    }

    pub fn on_sync_point(&self) -> bool {
        self.find_current_sync_point(self.ti_current).is_some()
    }

    /// Dloga per tick, valid up to the next sync point. Zero past the
    /// end of the timeline.
    pub fn dloga_interval(&self, ti: IntegerTime) -> Float {
        let lastsnap = (ti >> TIMEBINS) as usize;
        if lastsnap >= self.sync_points.len() - 1 {
            // stop advancing loga after the last sync point
            return 0.0;
        }
        let lastoutput = self.sync_points[lastsnap].loga;
        (self.sync_points[lastsnap + 1].loga - lastoutput) / TIMEBASE as Float
    }

    pub fn loga_from_ti(&self, ti: IntegerTime) -> Float {
        let lastsnap = (ti >> TIMEBINS) as usize;
        if lastsnap > self.sync_points.len() {
            endrun!(1, "Requesting a time beyond the last sync point");
        }
        let lastsnap = lastsnap.min(self.sync_points.len() - 1);
        let last = self.sync_points[lastsnap].loga;
        let dti = ti & (TIMEBASE - 1);
        last + dti as Float * self.dloga_interval(ti)
    }

    pub fn a_from_ti(&self, ti: IntegerTime) -> Float {
        self.loga_from_ti(ti).exp()
    }

    pub fn ti_from_loga(&self, loga: Float) -> IntegerTime {
        let mut i = 0;
        while i < self.sync_points.len() - 1 {
            if self.sync_points[i].loga > loga {
                break;
            }
            i += 1;
        }
        let i = i.max(1);
        let dloga_tick = (self.sync_points[i].loga - self.sync_points[i - 1].loga)
            / TIMEBASE as Float;
        let ti = ((i - 1) as IntegerTime) << TIMEBINS;
        // Note this means that if we overrun the end of the timeline,
        // we still get something reasonable
        ti + ((loga - self.sync_points[i - 1].loga) / dloga_tick) as IntegerTime
    }

    pub fn dloga_from_dti(&self, dti: IntegerTime) -> Float {
        if dti > TIMEBASE {
            endrun!(1, "Requesting dti larger than TIMEBASE");
        }
        self.dloga_interval(self.ti_current) * dti as Float
    }

    /// The dloga which a particle in the given bin advances per step
    /// at the current clock position.
    pub fn get_dloga_for_bin(&self, timebin: usize) -> Float {
        let dti = if timebin > 0 { 1 << timebin } else { 0 };
        self.dloga_interval(self.ti_current) * dti as Float
    }

    /// The smallest sync point strictly in the future of ti, or None
    /// if the run is complete.
    pub fn find_next_sync_point(&self, ti: IntegerTime) -> Option<&SyncPoint> {
        self.sync_points.iter().find(|point| point.ti > ti)
    }

    /// The sync point at exactly ti, if any.
    pub fn find_current_sync_point(&self, ti: IntegerTime) -> Option<&SyncPoint> {
        self.sync_points.iter().find(|point| point.ti == ti)
    }
}

fn insert_sorted(sync_points: &mut Vec<SyncPoint>, point: SyncPoint) -> usize {
    let index = sync_points
        .iter()
        .position(|p| p.a > point.a)
        .unwrap_or(sync_points.len());
    sync_points.insert(index, point);
    index
}

pub fn round_down_power_of_two(dti: IntegerTime) -> IntegerTime {
    // make dti a power 2 subdivision
    let mut ti_min = TIMEBASE;
    while ti_min > dti {
        ti_min >>= 1;
    }
    ti_min
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_timeline(output_times: Vec<Float>) -> Timeline {
        Timeline::setup(SyncPointSpec {
            time_ic: 0.1,
            time_max: 1.0,
            output_times,
            no_snapshot_until: None,
            snapshots_with_fof: false,
            uvbg_times: vec![],
        })
    }

    #[test]
    fn sync_point_stamps_are_interval_multiples() {
        let timeline = simple_timeline(vec![0.25, 0.5]);
        for (k, point) in timeline.sync_points().iter().enumerate() {
            assert_eq!(point.ti, (k as IntegerTime) << TIMEBINS);
        }
        assert!(timeline
            .sync_points()
            .windows(2)
            .all(|w| w[0].a < w[1].a));
    }

    #[test]
    fn duplicate_output_time_only_sets_flag() {
        let timeline = Timeline::setup(SyncPointSpec {
            time_ic: 0.1,
            time_max: 1.0,
            output_times: vec![0.1, 0.5, 0.5],
            no_snapshot_until: None,
            snapshots_with_fof: true,
            uvbg_times: vec![],
        });
        // 0.1 is TimeIC, 0.5 occurs twice: three unique points total
        assert_eq!(timeline.sync_points().len(), 3);
        assert!(timeline.sync_points()[0].write_snapshot);
        assert!(timeline.sync_points()[1].write_snapshot);
        assert!(timeline.sync_points()[1].write_fof);
    }

    #[test]
    fn output_times_beyond_time_max_are_dropped() {
        let timeline = simple_timeline(vec![0.5, 2.0, 3.0]);
        assert_eq!(timeline.sync_points().len(), 3);
        assert!(timeline.sync_points().iter().all(|p| p.a <= 1.0));
    }

    #[test]
    fn ti_loga_round_trip() {
        let timeline = simple_timeline(vec![0.3, 0.6]);
        for ti in [
            0,
            1,
            12345,
            TIMEBASE - 1,
            TIMEBASE,
            TIMEBASE + 17,
            2 * TIMEBASE + 12391,
            3 * TIMEBASE - 1,
        ] {
            let loga = timeline.loga_from_ti(ti);
            let roundtrip = timeline.ti_from_loga(loga);
            assert!(
                (roundtrip as i64 - ti as i64).abs() <= 1,
                "{} vs {}",
                roundtrip,
                ti
            );
        }
    }

    #[test]
    fn loga_stops_at_the_end() {
        let timeline = simple_timeline(vec![]);
        let end = timeline.sync_points().last().unwrap().ti;
        assert_eq!(timeline.loga_from_ti(end), (1.0 as Float).ln());
        assert_eq!(timeline.dloga_interval(end), 0.0);
    }

    #[test]
    fn find_sync_points() {
        let timeline = simple_timeline(vec![0.5]);
        assert_eq!(timeline.find_next_sync_point(0).unwrap().ti, TIMEBASE);
        assert_eq!(
            timeline.find_next_sync_point(TIMEBASE - 1).unwrap().ti,
            TIMEBASE
        );
        assert!(timeline.find_next_sync_point(2 * TIMEBASE).is_none());
        assert!(timeline.find_current_sync_point(TIMEBASE).is_some());
        assert!(timeline.find_current_sync_point(TIMEBASE + 1).is_none());
    }

    #[test]
    fn power_of_two_rounding() {
        assert_eq!(round_down_power_of_two(1), 1);
        assert_eq!(round_down_power_of_two(2), 2);
        assert_eq!(round_down_power_of_two(3), 2);
        assert_eq!(round_down_power_of_two(1023), 512);
        assert_eq!(round_down_power_of_two(TIMEBASE + 1), TIMEBASE);
    }
}
