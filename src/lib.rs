//! amghost: host-side resource & data-transfer layer for a distributed AMG engine
//!
//! This crate manages the lifecycle of solver-visible objects (compute
//! resources, configuration, distributed sparse matrices, vectors, solver
//! instances) and moves CSR data between host-accessible arrays and the
//! engine's internal representation, including distributed partitioning and
//! halo-exchange metadata for multi-rank, multi-device execution.

pub mod parallel;

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod matrix;
pub mod mode;
pub mod resources;
pub mod solver;
pub mod vector;

// Re-exports for convenience
pub use config::Config;
pub use engine::{Engine, ReferenceEngine, StatusCode};
pub use error::AmgError;
pub use matrix::{CommMap, CommMapBuilder, CsrSource, DistributedMatrix};
pub use mode::{IndexPrecision, MemorySpace, Mode, ValuePrecision};
pub use resources::Resources;
pub use solver::Solver;
pub use vector::Vector;
