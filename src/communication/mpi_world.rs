use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::Mutex;

use lazy_static::lazy_static;
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SystemCommunicator;
use mpi::traits::Communicator as _;
use mpi::traits::CommunicatorCollectives;
use mpi::traits::Equivalence;
use mpi::Threading;

use super::CollectiveCommunicator;
use super::Operation;
use super::Rank;
use super::SizedCommunicator;

/// A wrapper around the universe which contains it in an Option.
/// This allows calling .take at program completion so that the
/// Universe is dropped, which will call MPI_FINALIZE. This is
/// necessary because anything in a lazy_static is never dropped.
pub struct StaticUniverse(Arc<Mutex<Option<Universe>>>);

impl StaticUniverse {
    pub fn world(&self) -> SystemCommunicator {
        self.0.lock().unwrap().as_ref().unwrap().world()
    }

    pub fn drop(&self) {
        let _ = self.0.lock().unwrap().take();
    }
}

lazy_static! {
    pub static ref MPI_UNIVERSE: StaticUniverse = {
        let threading = Threading::Funneled;
        let (universe, threading_initialized) =
            mpi::initialize_with_threading(threading).unwrap();
        assert!(
            threading_initialized >= threading,
            "Could not initialize MPI with the required threading level"
        );
        StaticUniverse(Arc::new(Mutex::new(Some(universe))))
    };
}

pub struct MpiWorld<T> {
    world: SystemCommunicator,
    _marker: PhantomData<T>,
}

impl<T> MpiWorld<T> {
    pub fn new() -> Self {
        let world = MPI_UNIVERSE.world();
        Self {
            world,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MpiWorld<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SizedCommunicator for MpiWorld<T> {
    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn rank(&self) -> Rank {
        self.world.rank()
    }
}

fn system_operation(operation: Operation) -> SystemOperation {
    match operation {
        Operation::Sum => SystemOperation::sum(),
        Operation::Min => SystemOperation::min(),
        Operation::Max => SystemOperation::max(),
    }
}

impl<T: Equivalence + Clone + Default> CollectiveCommunicator<T> for MpiWorld<T> {
    fn all_reduce(&mut self, send: &T, operation: Operation) -> T {
        let mut result = T::default();
        self.world
            .all_reduce_into(send, &mut result, system_operation(operation));
        result
    }

    fn all_reduce_vec(&mut self, send: &[T], operation: Operation) -> Vec<T> {
        let mut result = vec![T::default(); send.len()];
        self.world
            .all_reduce_into(send, &mut result[..], system_operation(operation));
        result
    }

    fn all_gather(&mut self, send: &T) -> Vec<T> {
        let mut result = vec![T::default(); self.size()];
        self.world.all_gather_into(send, &mut result[..]);
        result
    }
}
