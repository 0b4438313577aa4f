//! The solver-engine surface this layer calls through.
//!
//! Every solver-visible object owns a handle allocated by an [`Engine`]
//! implementation. Engine calls return [`StatusCode`]s; the wrappers in the
//! rest of the crate map every nonzero code into
//! [`AmgError::Engine`](crate::error::AmgError) and never retry (the engine
//! has no idempotent-retry semantics for partial uploads).
//!
//! The engine also requires a process-wide initialize/finalize pairing,
//! modeled here as an explicit registry: [`initialize`] installs the
//! in-process [`ReferenceEngine`], [`initialize_with`] installs a custom
//! backend, [`instance`] hands out the installed engine, and [`finalize`]
//! tears it down. Double-initialize and use-before-initialize are typed
//! [`InvalidState`](crate::error::AmgError::InvalidState) failures, not
//! undefined behavior.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::AmgError;
use crate::matrix::CommMap;
use crate::mode::Mode;

pub mod reference;
pub use reference::ReferenceEngine;

/// Raw status returned by an engine entry point. Zero never appears here;
/// success is the `Ok` arm of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    /// Malformed or mutually inconsistent call parameters.
    pub const BAD_PARAMETERS: StatusCode = StatusCode(1);
    /// Handle does not name a live engine object.
    pub const UNKNOWN_HANDLE: StatusCode = StatusCode(2);
    /// Operation needs engine-side state that was never established.
    pub const NOT_INITIALIZED: StatusCode = StatusCode(3);
    /// Valid request the engine build cannot serve.
    pub const UNSUPPORTED: StatusCode = StatusCode(4);
    /// Configuration file could not be read or parsed.
    pub const IO_ERROR: StatusCode = StatusCode(5);
    /// Engine-internal failure.
    pub const INTERNAL: StatusCode = StatusCode(6);
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a parsed configuration blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigHandle(pub u64);
/// Handle to a compute-context binding (devices + communicator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourcesHandle(pub u64);
/// Handle to an internal sparse-matrix object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixHandle(pub u64);
/// Handle to an internal vector object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorHandle(pub u64);
/// Handle to a solver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolverHandle(pub u64);

/// Identity snapshot of a distributed communicator, taken at Resources
/// creation. The communicator itself stays opaque to this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommBinding {
    pub rank: usize,
    pub size: usize,
}

/// The native entry-point surface.
///
/// All methods are synchronous: a call either returns or blocks the calling
/// thread until the engine completes. Per-handle call ordering is the
/// caller's responsibility; implementations must be safe to share across
/// threads for distinct handles.
pub trait Engine: Send + Sync {
    fn config_create(&self, options: &str) -> Result<ConfigHandle, StatusCode>;
    fn config_create_from_file(&self, path: &Path) -> Result<ConfigHandle, StatusCode>;
    fn config_destroy(&self, cfg: ConfigHandle) -> Result<(), StatusCode>;

    /// Bind a device set and optional process group into a compute context.
    fn resources_create(
        &self,
        cfg: ConfigHandle,
        comm: Option<CommBinding>,
        device_ids: &[u32],
    ) -> Result<ResourcesHandle, StatusCode>;
    fn resources_destroy(&self, res: ResourcesHandle) -> Result<(), StatusCode>;

    fn matrix_create(&self, res: ResourcesHandle, mode: Mode) -> Result<MatrixHandle, StatusCode>;
    fn matrix_destroy(&self, mat: MatrixHandle) -> Result<(), StatusCode>;

    /// Single-partition CSR upload. `data` holds `nnz * bx * by` values,
    /// block-row-major per nonzero.
    #[allow(clippy::too_many_arguments)]
    fn matrix_upload(
        &self,
        mat: MatrixHandle,
        n: usize,
        nnz: usize,
        block_dims: (usize, usize),
        row_ptrs: &[usize],
        col_indices: &[usize],
        data: &[f64],
    ) -> Result<(), StatusCode>;

    /// Globally partitioned CSR upload: each rank hands over its local row
    /// slice indexed globally. `partition` maps global row to owning rank;
    /// `None` selects the engine's default partitioning. The two ring
    /// depths are accepted independently even though the wrapper currently
    /// threads one halo depth into both.
    #[allow(clippy::too_many_arguments)]
    fn matrix_upload_global(
        &self,
        mat: MatrixHandle,
        n_global: usize,
        nnz: usize,
        block_dims: (usize, usize),
        row_ptrs: &[usize],
        col_indices: &[usize],
        data: &[f64],
        inner_rings: usize,
        outer_rings: usize,
        partition: Option<&[u32]>,
    ) -> Result<(), StatusCode>;

    /// Attach halo-exchange metadata to an already-created matrix.
    fn matrix_comm_from_maps(&self, mat: MatrixHandle, map: &CommMap) -> Result<(), StatusCode>;

    /// Replace coefficient values in place; the sparsity pattern is fixed.
    fn matrix_replace_coefficients(
        &self,
        mat: MatrixHandle,
        n: usize,
        nnz: usize,
        data: &[f64],
    ) -> Result<(), StatusCode>;

    /// `(n, (bx, by))`; zero dimensions until an upload has populated the
    /// matrix.
    fn matrix_size(&self, mat: MatrixHandle) -> Result<(usize, (usize, usize)), StatusCode>;
    fn matrix_nnz(&self, mat: MatrixHandle) -> Result<usize, StatusCode>;

    fn vector_create(&self, res: ResourcesHandle, mode: Mode) -> Result<VectorHandle, StatusCode>;
    fn vector_destroy(&self, vec: VectorHandle) -> Result<(), StatusCode>;
    fn vector_upload(
        &self,
        vec: VectorHandle,
        n: usize,
        block_dim: usize,
        data: &[f64],
    ) -> Result<(), StatusCode>;
    fn vector_set_zero(&self, vec: VectorHandle, n: usize, block_dim: usize)
        -> Result<(), StatusCode>;
    fn vector_download(&self, vec: VectorHandle, out: &mut Vec<f64>) -> Result<(), StatusCode>;
    /// `(n, block_dim)` as last established by upload/set_zero.
    fn vector_size(&self, vec: VectorHandle) -> Result<(usize, usize), StatusCode>;

    fn solver_create(
        &self,
        res: ResourcesHandle,
        mode: Mode,
        cfg: ConfigHandle,
    ) -> Result<SolverHandle, StatusCode>;
    fn solver_destroy(&self, solver: SolverHandle) -> Result<(), StatusCode>;
    fn solver_setup(&self, solver: SolverHandle, mat: MatrixHandle) -> Result<(), StatusCode>;
    fn solver_solve(
        &self,
        solver: SolverHandle,
        rhs: VectorHandle,
        sol: VectorHandle,
    ) -> Result<(), StatusCode>;
    fn solver_iterations(&self, solver: SolverHandle) -> Result<usize, StatusCode>;
}

// Process-scoped engine slot. const Mutex keeps this allocation-free until
// first initialize.
static GLOBAL_ENGINE: Mutex<Option<Arc<dyn Engine>>> = Mutex::new(None);

fn global_slot() -> std::sync::MutexGuard<'static, Option<Arc<dyn Engine>>> {
    GLOBAL_ENGINE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the in-process [`ReferenceEngine`] as the process-wide engine.
pub fn initialize() -> Result<(), AmgError> {
    initialize_with(ReferenceEngine::shared())
}

/// Install a specific engine backend as the process-wide engine.
pub fn initialize_with(engine: Arc<dyn Engine>) -> Result<(), AmgError> {
    let mut slot = global_slot();
    if slot.is_some() {
        return Err(AmgError::InvalidState("engine already initialized"));
    }
    log::info!("engine initialized");
    *slot = Some(engine);
    Ok(())
}

/// The installed process-wide engine.
pub fn instance() -> Result<Arc<dyn Engine>, AmgError> {
    global_slot()
        .as_ref()
        .cloned()
        .ok_or(AmgError::InvalidState("engine not initialized"))
}

/// Tear down the process-wide engine. Objects created from it must already
/// be destroyed; the engine backend itself is dropped here.
pub fn finalize() -> Result<(), AmgError> {
    let mut slot = global_slot();
    if slot.take().is_none() {
        return Err(AmgError::InvalidState("engine not initialized"));
    }
    log::info!("engine finalized");
    Ok(())
}
