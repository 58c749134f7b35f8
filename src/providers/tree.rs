use kiddo::distance::squared_euclidean;
use kiddo::KdTree;

use crate::prelude::Float;
use crate::prelude::MVec;
use crate::simulation_box::SimulationBox;

/// A periodic neighbour search tree over a fixed set of positions.
/// Queries return indices into the position slice the tree was built
/// from. Periodicity is handled by querying shifted images of the
/// search sphere where it sticks out of the box.
pub struct NeighbourTree {
    tree: KdTree<Float, 3>,
    side_length: Float,
}

fn to_coord(pos: &MVec) -> [Float; 3] {
    [pos.x, pos.y, pos.z]
}

impl NeighbourTree {
    pub fn build(box_: &SimulationBox, positions: &[MVec]) -> Self {
        let coords: Vec<_> = positions
            .iter()
            .map(|pos| to_coord(&box_.periodic_wrap(*pos)))
            .collect();
        let tree: KdTree<Float, 3> = (&coords).into();
        Self {
            tree,
            side_length: box_.side_length,
        }
    }

    /// Indices of all positions within `radius` of `center`, taking
    /// the nearest periodic image.
    pub fn within(&self, center: MVec, radius: Float) -> Vec<usize> {
        let length = self.side_length;
        let mut result = vec![];
        let shifts = |c: Float| {
            let mut s = vec![0.0];
            if c - radius < 0.0 {
                s.push(length);
            }
            if c + radius > length {
                s.push(-length);
            }
            s
        };
        let center = MVec::new(
            center.x.rem_euclid(length),
            center.y.rem_euclid(length),
            center.z.rem_euclid(length),
        );
        for sx in shifts(center.x) {
            for sy in shifts(center.y) {
                for sz in shifts(center.z) {
                    let query = [center.x + sx, center.y + sy, center.z + sz];
                    for neighbour in self
                        .tree
                        .within_unsorted(&query, radius * radius, &squared_euclidean)
                    {
                        result.push(neighbour.item);
                    }
                }
            }
        }
        result.sort_unstable();
        result.dedup();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::NeighbourTree;
    use crate::prelude::MVec;
    use crate::simulation_box::SimulationBox;

    #[test]
    fn finds_neighbours_across_the_periodic_boundary() {
        let box_ = SimulationBox::new(1.0);
        let positions = vec![
            MVec::new(0.05, 0.5, 0.5),
            MVec::new(0.95, 0.5, 0.5),
            MVec::new(0.5, 0.5, 0.5),
        ];
        let tree = NeighbourTree::build(&box_, &positions);
        let ngbs = tree.within(MVec::new(0.0, 0.5, 0.5), 0.2);
        assert_eq!(ngbs, vec![0, 1]);
    }

    #[test]
    fn neighbours_are_unique() {
        let box_ = SimulationBox::new(1.0);
        let positions = vec![MVec::new(0.5, 0.5, 0.5)];
        let tree = NeighbourTree::build(&box_, &positions);
        // radius larger than the half box still yields each particle once
        let ngbs = tree.within(MVec::new(0.5, 0.5, 0.5), 0.8);
        assert_eq!(ngbs, vec![0]);
    }
}
