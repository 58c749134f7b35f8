use bevy_ecs::prelude::Component;
use bevy_ecs::prelude::Query;
use bevy_ecs::prelude::With;
use derive_more::Display;
use serde::Deserialize;
use serde::Serialize;

use crate::named::Named;

#[derive(
    Component, Clone, Debug, PartialEq, Eq, Hash, Copy, Display, Named, PartialOrd, Ord,
)]
#[name = "id"]
pub struct ParticleId(pub u64);

#[derive(Component)]
pub struct LocalParticle;

/// Marker for SPH particles; removed when a gas particle turns into
/// a star.
#[derive(Component)]
pub struct GasParticle;

#[derive(Component)]
pub struct StarParticle;

/// The type tag of a particle. Determines the softening class and
/// the displacement-constraint bucket.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleType {
    Gas,
    Halo,
    Disk,
    Bulge,
    Star,
    BlackHole,
}

impl ParticleType {
    pub const NUM_TYPES: usize = 6;

    pub fn softening_class(&self) -> usize {
        match self {
            ParticleType::Gas => 0,
            ParticleType::Halo => 1,
            ParticleType::Disk => 2,
            ParticleType::Bulge => 3,
            ParticleType::Star => 4,
            ParticleType::BlackHole => 5,
        }
    }

    pub fn from_softening_class(class: usize) -> Self {
        match class {
            0 => ParticleType::Gas,
            1 => ParticleType::Halo,
            2 => ParticleType::Disk,
            3 => ParticleType::Bulge,
            4 => ParticleType::Star,
            5 => ParticleType::BlackHole,
            _ => panic!("Invalid particle type: {}", class),
        }
    }

    pub fn is_gas(&self) -> bool {
        matches!(self, ParticleType::Gas)
    }
}

/// A convenience type to query for local particles.
pub type Particles<'world, 'state, T, F = ()> = Query<'world, 'state, T, (With<LocalParticle>, F)>;

#[cfg(test)]
mod tests {
    use bevy_ecs::prelude::Component;
    use bevy_ecs::prelude::With;
    use bevy_ecs::prelude::World;

    use crate::prelude::LocalParticle;
    use crate::prelude::Particles;
    use crate::test_utils::run_system_on_world;

    #[test]
    fn particles_query_respects_filters() {
        #[derive(Component)]
        struct A;
        #[derive(Component)]
        struct B;
        let mut world = World::default();
        world.spawn((A, B, LocalParticle));
        world.spawn((A, B, LocalParticle));
        world.spawn((A, LocalParticle));
        world.spawn((A,));
        fn system(particles: Particles<&A, With<B>>) {
            assert_eq!(particles.iter().count(), 2);
        }
        run_system_on_world(&mut world, system);
    }

    #[test]
    fn particles_query_respects_tuple_filters() {
        #[derive(Component)]
        struct A;
        #[derive(Component)]
        struct B;
        #[derive(Component)]
        struct C;
        let mut world = World::default();
        world.spawn((A, B, C, LocalParticle));
        world.spawn((A, B, LocalParticle));
        world.spawn((A, LocalParticle));
        world.spawn((A,));
        fn system(particles: Particles<&A, (With<B>, With<C>)>) {
            assert_eq!(particles.iter().count(), 1);
        }
        run_system_on_world(&mut world, system);
    }
}
