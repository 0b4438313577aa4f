//! MPI-backed communicator for multi-process runs.
//!
//! Wraps the MPI world communicator and exposes the identity/barrier surface
//! [`Resources`](crate::resources::Resources) binds. Only available with the
//! `mpi` feature; the process must be launched under an MPI runner.

use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI world communicator wrapper.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    /// Initializes MPI and wraps the world communicator.
    ///
    /// # Panics
    /// Panics if MPI initialization fails or MPI was already initialized.
    pub fn new() -> Self {
        let universe = mpi::initialize().unwrap();
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        MpiComm { world, rank, size }
    }
}

impl super::Comm for MpiComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }
    fn barrier(&self) { self.world.barrier(); }
}
