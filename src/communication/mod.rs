mod collective_communicator;
mod sized_communicator;

pub use collective_communicator::CollectiveCommunicator;
pub use collective_communicator::Operation;
pub use sized_communicator::SizedCommunicator;

#[cfg(not(feature = "mpi"))]
mod local;

#[cfg(not(feature = "mpi"))]
pub use local::LocalCommunicator as Communicator;

#[cfg(feature = "mpi")]
mod mpi_world;

#[cfg(feature = "mpi")]
pub use mpi_world::MpiWorld as Communicator;
#[cfg(feature = "mpi")]
pub use mpi_world::MPI_UNIVERSE;

use bevy_ecs::prelude::Resource;
use derive_more::Deref;

use crate::named::Named;
use crate::simulation::SubkickPlugin;
use crate::simulation::Simulation;

#[cfg(feature = "mpi")]
pub type Rank = mpi::Rank;
#[cfg(not(feature = "mpi"))]
pub type Rank = i32;

#[derive(Resource, Clone, Copy, PartialEq, Eq, Deref)]
pub struct WorldSize(pub usize);

#[derive(Resource, Clone, Copy, PartialEq, Eq, Deref)]
pub struct WorldRank(pub Rank);

impl WorldRank {
    pub fn is_main(&self) -> bool {
        self.0 == 0
    }

    pub fn main() -> Rank {
        0
    }
}

/// Inserts the world rank and size resources. Every simulation
/// needs this, whether it runs under MPI or standalone.
#[derive(Named, Clone)]
pub struct BaseCommunicationPlugin {
    num_ranks: usize,
    world_rank: Rank,
}

impl BaseCommunicationPlugin {
    pub fn new(size: usize, rank: Rank) -> Self {
        Self {
            num_ranks: size,
            world_rank: rank,
        }
    }
}

impl SubkickPlugin for BaseCommunicationPlugin {
    fn build_everywhere(&self, sim: &mut Simulation) {
        sim.insert_resource(WorldRank(self.world_rank))
            .insert_resource(WorldSize(self.num_ranks));
    }
}

/// Terminates the run on all ranks. Under MPI this calls `Abort` on
/// the world communicator, otherwise it panics, which gives tests
/// something to assert on and the process a non-zero exit code.
pub fn abort_run(code: i32, msg: String) -> ! {
    #[cfg(feature = "mpi")]
    {
        use ::mpi::traits::Communicator as _;
        log::error!("endrun({}): {}", code, msg);
        MPI_UNIVERSE.world().abort(code);
    }
    #[cfg(not(feature = "mpi"))]
    {
        panic!("endrun({}): {}", code, msg);
    }
}

/// The fatal error path of the simulation. Logs the message, writes
/// no further state and brings the whole run down.
#[macro_export]
macro_rules! endrun {
    ($code:expr, $($arg:tt)*) => {
        $crate::communication::abort_run($code, format!($($arg)*))
    };
}
