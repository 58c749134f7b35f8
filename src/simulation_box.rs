use derive_custom::subkick_parameters;

use crate::prelude::Float;
use crate::prelude::MVec;

/// The comoving box of the simulation. Periodic boundary conditions
/// apply beyond it, meaning that positions outside of the box are
/// wrapped back into it and distances are taken to the nearest
/// periodic image.
#[subkick_parameters("box_size")]
#[derive(Copy, Debug)]
pub struct SimulationBox {
    pub side_length: Float,
}

fn periodic_wrap_component(v: Float, length: Float) -> Float {
    v.rem_euclid(length)
}

fn minimize_component(v: Float, length: Float) -> Float {
    if v < 0.0 {
        if v.abs() < (v + length).abs() {
            v
        } else {
            v + length
        }
    } else if v.abs() < (v - length).abs() {
        v
    } else {
        v - length
    }
}

impl SimulationBox {
    pub fn new(side_length: Float) -> Self {
        Self { side_length }
    }

    pub fn volume(&self) -> Float {
        self.side_length.powi(3)
    }

    pub fn periodic_wrap(&self, pos: MVec) -> MVec {
        MVec::new(
            periodic_wrap_component(pos.x, self.side_length),
            periodic_wrap_component(pos.y, self.side_length),
            periodic_wrap_component(pos.z, self.side_length),
        )
    }

    /// The shortest vector from p2 to p1 over all periodic images.
    pub fn periodic_distance_vec(&self, p1: MVec, p2: MVec) -> MVec {
        let dist = p1 - p2;
        MVec::new(
            minimize_component(dist.x, self.side_length),
            minimize_component(dist.y, self.side_length),
            minimize_component(dist.z, self.side_length),
        )
    }

    pub fn periodic_distance(&self, p1: MVec, p2: MVec) -> Float {
        self.periodic_distance_vec(p1, p2).length()
    }
}

#[cfg(test)]
mod tests {
    use super::SimulationBox;
    use crate::prelude::MVec;

    #[test]
    fn periodic_wrap() {
        let box_ = SimulationBox::new(2.0);
        let check_wrap = |(x, y, z), (xw, yw, zw)| {
            let v = box_.periodic_wrap(MVec::new(x, y, z));
            assert!((v - MVec::new(xw, yw, zw)).length() < 1e-12, "{:?}", v);
        };
        check_wrap((0.5, 0.5, 0.5), (0.5, 0.5, 0.5));
        check_wrap((2.5, 0.5, 0.5), (0.5, 0.5, 0.5));
        check_wrap((0.5, -0.5, 0.5), (0.5, 1.5, 0.5));
        check_wrap((4.5, 4.5, -3.5), (0.5, 0.5, 0.5));
    }

    #[test]
    fn periodic_distance() {
        let box_ = SimulationBox::new(2.0);
        let d = box_.periodic_distance(MVec::new(0.1, 0.0, 0.0), MVec::new(1.9, 0.0, 0.0));
        assert!((d - 0.2).abs() < 1e-12);
        let d = box_.periodic_distance(MVec::new(0.5, 0.5, 0.5), MVec::new(0.5, 0.5, 0.7));
        assert!((d - 0.2).abs() < 1e-12);
    }
}
