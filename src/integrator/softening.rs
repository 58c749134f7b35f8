use bevy_ecs::prelude::Resource;

use super::parameters::SofteningParameters;
use crate::prelude::Float;

/// The per-class softening lengths at the current scale factor. The
/// comoving values are capped so that the physical softening never
/// exceeds the configured maximum.
#[derive(Resource, Clone, Debug)]
pub struct SofteningTable {
    table: [Float; 6],
    force: [Float; 6],
    min_gas_hsml: Float,
}

impl SofteningTable {
    pub fn new(params: &SofteningParameters, time: Float) -> Self {
        let mut result = Self {
            table: [0.0; 6],
            force: [0.0; 6],
            min_gas_hsml: 0.0,
        };
        result.update(params, time);
        result
    }

    pub fn update(&mut self, params: &SofteningParameters, time: Float) {
        for class in 0..6 {
            let pair = params.pair(class);
            self.table[class] = if pair.comoving * time > pair.max_phys && pair.max_phys > 0.0 {
                pair.max_phys / time
            } else {
                pair.comoving
            };
            self.force[class] = 2.8 * self.table[class];
        }
        self.min_gas_hsml = params.min_gas_hsml_fractional * self.force[0];
    }

    pub fn plummer(&self, class: usize) -> Float {
        self.table[class]
    }

    pub fn force(&self, class: usize) -> Float {
        self.force[class]
    }

    pub fn min_gas_hsml(&self) -> Float {
        self.min_gas_hsml
    }
}

#[cfg(test)]
mod tests {
    use super::SofteningTable;
    use crate::integrator::parameters::SofteningPair;
    use crate::integrator::parameters::SofteningParameters;

    #[test]
    fn physical_cap_takes_over_at_late_times() {
        let params = SofteningParameters {
            halo: SofteningPair {
                comoving: 10.0,
                max_phys: 5.0,
            },
            ..Default::default()
        };
        let early = SofteningTable::new(&params, 0.1);
        assert_eq!(early.plummer(1), 10.0);
        let late = SofteningTable::new(&params, 1.0);
        assert_eq!(late.plummer(1), 5.0);
        assert_eq!(late.force(1), 2.8 * 5.0);
    }
}
