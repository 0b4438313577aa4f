//! Matrix module: distributed sparse-matrix handles and halo-exchange maps.

pub mod comm_map;
pub use comm_map::{CommMap, CommMapBuilder};
pub mod distributed;
pub use distributed::{CsrSource, DistributedMatrix};
