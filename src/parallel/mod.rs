//! Communicator surface bound into [`Resources`](crate::resources::Resources).
//!
//! The engine treats the communicator as opaque; this layer only snapshots
//! its identity (rank and size) at Resources creation and never touches the
//! transport. `SerialComm` is the explicit no-communicator sentinel for
//! single-process runs; `MpiComm` (behind the `mpi` feature) wraps the MPI
//! world communicator.

pub trait Comm {
    /// Rank of this process within the group.
    fn rank(&self) -> usize;
    /// Total number of processes in the group.
    fn size(&self) -> usize;
    /// Synchronize all processes in the group.
    fn barrier(&self);
}

/// Single-process sentinel: rank 0 of 1, barrier is a no-op.
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) {}
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
