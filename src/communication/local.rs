use std::marker::PhantomData;

use super::CollectiveCommunicator;
use super::Operation;
use super::Rank;
use super::SizedCommunicator;

/// The stand-in communicator for builds without MPI. All collective
/// operations are identities over a world of size one.
pub struct LocalCommunicator<T> {
    _marker: PhantomData<T>,
}

impl<T> LocalCommunicator<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for LocalCommunicator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SizedCommunicator for LocalCommunicator<T> {
    fn size(&self) -> usize {
        1
    }

    fn rank(&self) -> Rank {
        0
    }
}

impl<T: Clone> CollectiveCommunicator<T> for LocalCommunicator<T> {
    fn all_reduce(&mut self, send: &T, _operation: Operation) -> T {
        send.clone()
    }

    fn all_reduce_vec(&mut self, send: &[T], _operation: Operation) -> Vec<T> {
        send.to_vec()
    }

    fn all_gather(&mut self, send: &T) -> Vec<T> {
        vec![send.clone()]
    }
}
