//! Per-particle time bins. Bin b holds particles stepping with
//! 2^b ticks; bin 0 means the step is still undefined. The bins keep
//! counts and membership lists and provide the dense active set for
//! the current step.

use bevy_ecs::prelude::Entity;
use bevy_ecs::prelude::Resource;

use crate::timeline::IntegerTime;
use crate::timeline::TIMEBINS;

#[derive(Default, Clone)]
pub struct Bin {
    count: usize,
    count_sph: usize,
    active: bool,
    particles: Vec<Entity>,
}

impl Bin {
    fn reset(&mut self) {
        self.count = 0;
        self.count_sph = 0;
        self.particles.clear();
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn count_sph(&self) -> usize {
        self.count_sph
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn particles(&self) -> &[Entity] {
        &self.particles
    }
}

#[derive(Resource)]
pub struct TimeBins {
    bins: Vec<Bin>,
    active_set: Vec<Entity>,
}

impl Default for TimeBins {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeBins {
    pub fn new() -> Self {
        let mut bins = vec![Bin::default(); TIMEBINS as usize];
        // at start-up every bin counts as active so that the first
        // force pass covers all particles
        for bin in bins.iter_mut() {
            bin.active = true;
        }
        Self {
            bins,
            active_set: vec![],
        }
    }

    pub fn bin(&self, index: usize) -> &Bin {
        &self.bins[index]
    }

    pub fn is_bin_active(&self, index: usize) -> bool {
        self.bins[index].active
    }

    /// Rebuilds counts, membership lists and the dense active set
    /// from scratch. Called once per step after the active flags have
    /// been set; also reestablishes consistency after spawning or
    /// type conversion.
    pub fn reconstruct(&mut self, particles: impl Iterator<Item = (Entity, usize, bool)>) {
        for bin in self.bins.iter_mut() {
            bin.reset();
        }
        self.active_set.clear();
        for (entity, bin_index, is_gas) in particles {
            let bin = &mut self.bins[bin_index];
            bin.count += 1;
            if is_gas {
                bin.count_sph += 1;
            }
            bin.particles.push(entity);
            if bin.active {
                self.active_set.push(entity);
            }
        }
    }

    /// Marks the bins that have a kick boundary at `next_kick`.
    /// Bin 0 (undefined step) is always active. Returns the number of
    /// particles that will receive a force update.
    pub fn mark_active(&mut self, next_kick: IntegerTime) -> usize {
        self.bins[0].active = true;
        let mut num_force_update = self.bins[0].count;
        for n in 1..self.bins.len() {
            let dt_bin = 1 << n;
            if next_kick % dt_bin == 0 {
                self.bins[n].active = true;
                num_force_update += self.bins[n].count;
            } else {
                self.bins[n].active = false;
            }
        }
        num_force_update
    }

    /// The dense list of active particles of this step. Stays valid
    /// until the next reconstruct; particles that change bins during
    /// the step remain in it.
    pub fn active_particles(&self) -> &[Entity] {
        &self.active_set
    }

    /// Count updates for a particle moving between bins during
    /// timestep assignment. Membership lists are refreshed by the
    /// next reconstruct.
    pub fn apply_bin_change(&mut self, old_bin: usize, new_bin: usize, is_gas: bool) {
        self.bins[old_bin].count -= 1;
        self.bins[new_bin].count += 1;
        if is_gas {
            self.bins[old_bin].count_sph -= 1;
            self.bins[new_bin].count_sph += 1;
        }
    }

    /// Called when a gas particle is converted in place into a star.
    pub fn convert_sph(&mut self, bin: usize) {
        self.bins[bin].count_sph -= 1;
    }

    pub fn total_count(&self) -> usize {
        self.bins.iter().map(|bin| bin.count).sum()
    }

    /// The next tick at which any occupied bin has a kick boundary.
    /// Bin 0 particles have no step yet and make the current time the
    /// next kick time.
    pub fn find_next_kick(&self, ti_current: IntegerTime) -> Option<IntegerTime> {
        self.bins
            .iter()
            .enumerate()
            .filter(|(_, bin)| bin.count > 0)
            .map(|(b, _)| {
                if b == 0 {
                    ti_current
                } else {
                    let dt_bin = 1 << b;
                    ti_current - ti_current % dt_bin + dt_bin
                }
            })
            .min()
    }

    #[cfg(test)]
    pub fn assert_consistent(&self, expected_total: usize) {
        assert_eq!(self.total_count(), expected_total);
        for bin in self.bins.iter() {
            assert_eq!(bin.count, bin.particles.len());
            assert!(bin.count_sph <= bin.count);
        }
    }
}
