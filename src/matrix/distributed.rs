//! Distributed sparse-matrix handle ownership and CSR upload paths.
//!
//! [`DistributedMatrix`] owns one internal matrix handle, created against a
//! [`Resources`] instance and a resolved [`Mode`]. Data enters through one
//! of three upload paths:
//!
//! - [`upload`](DistributedMatrix::upload): single-partition CSR triple;
//! - [`upload_global`](DistributedMatrix::upload_global): globally
//!   partitioned CSR, each rank handing over its local row slice in global
//!   numbering, with halo depth and an optional partition vector;
//! - [`upload_from_csr`](DistributedMatrix::upload_from_csr): any container
//!   following the standard compressed-row convention.
//!
//! Every structural precondition is checked here, before the engine sees a
//! slice; malformed input fails with a typed error and leaves the matrix
//! exactly as it was. The wrapped engine only accepts square matrices with
//! square nonzero blocks, and both are enforced as such, not as cosmetics:
//! a violation upstream would corrupt numerical results, not crash.

use std::sync::Arc;

use num_traits::Zero;

use crate::engine::{Engine, MatrixHandle};
use crate::error::AmgError;
use crate::lifecycle::HandleState;
use crate::matrix::CommMap;
use crate::mode::Mode;
use crate::resources::Resources;

/// A source following the standard compressed-sparse-row container
/// convention: `shape`, `indptr`, `indices`, `data`.
pub trait CsrSource {
    fn shape(&self) -> (usize, usize);
    fn indptr(&self) -> &[usize];
    fn indices(&self) -> &[usize];
    fn values(&self) -> &[f64];
}

pub struct DistributedMatrix {
    state: HandleState,
    engine: Option<Arc<dyn Engine>>,
    handle: Option<MatrixHandle>,
    mode: Option<Mode>,
}

impl DistributedMatrix {
    /// A matrix in the not-created state.
    pub fn new() -> Self {
        DistributedMatrix {
            state: HandleState::Uninitialized,
            engine: None,
            handle: None,
            mode: None,
        }
    }

    /// Resolve `descriptor` into a [`Mode`] and allocate the internal
    /// handle scoped to `resources`, which must be active.
    pub fn create(&mut self, resources: &Resources, descriptor: &str) -> Result<(), AmgError> {
        self.state.require_uninitialized("matrix already created")?;
        let mode = Mode::resolve(descriptor)?;
        let (engine, res_handle) = resources.parts()?;
        let handle = engine.matrix_create(res_handle, mode)?;
        log::debug!("matrix {} created with mode {mode}", handle.0);
        self.engine = Some(Arc::clone(engine));
        self.handle = Some(handle);
        self.mode = Some(mode);
        self.state = HandleState::Active;
        Ok(())
    }

    /// Single-partition CSR upload.
    ///
    /// `row_ptrs` has length `n + 1`; `col_indices` holds `nnz` entries;
    /// `data` holds `nnz * bx * by` values. The column count is derived as
    /// `1 + max(col_indices)` and must equal the row count.
    pub fn upload(
        &mut self,
        row_ptrs: &[usize],
        col_indices: &[usize],
        data: &[f64],
        block_dims: (usize, usize),
    ) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        let (nrows, nnz) = check_local_csr(row_ptrs, col_indices, data, block_dims)?;
        engine.matrix_upload(handle, nrows, nnz, block_dims, row_ptrs, col_indices, data)?;
        log::debug!("matrix {} uploaded, n={nrows} nnz={nnz}", handle.0);
        Ok(())
    }

    /// Globally partitioned CSR upload.
    ///
    /// This rank hands over its local row slice with columns in global
    /// numbering; the engine reconciles global indices across ranks.
    /// `halo_depth` counts the import rings replicated locally and is
    /// threaded into both of the engine's ring parameters. `partition`
    /// maps global row to owning rank; `None` selects the engine's default
    /// partitioning. Collective in spirit: every participating rank must
    /// call this in matching order with consistent parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn upload_global(
        &mut self,
        n_global: usize,
        row_ptrs: &[usize],
        col_indices: &[usize],
        data: &[f64],
        halo_depth: usize,
        block_dims: (usize, usize),
        partition: Option<&[u32]>,
    ) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        check_block(block_dims)?;
        check_triple(row_ptrs, col_indices, data, block_dims)?;
        let ncols = 1 + col_indices.iter().max().copied().unwrap_or(0);
        if col_indices.iter().any(|&c| c >= n_global) {
            return Err(AmgError::NonSquareMatrix { rows: n_global, cols: ncols });
        }
        if let Some(part) = partition {
            if part.len() != n_global {
                return Err(AmgError::ShapeMismatch { expected: n_global, actual: part.len() });
            }
        }
        let nnz = col_indices.len();
        engine.matrix_upload_global(
            handle, n_global, nnz, block_dims, row_ptrs, col_indices, data, halo_depth,
            halo_depth, partition,
        )?;
        log::debug!(
            "matrix {} uploaded globally, n_global={n_global} local_rows={} nnz={nnz} halo={halo_depth}",
            handle.0,
            row_ptrs.len() - 1,
        );
        Ok(())
    }

    /// Upload from any compressed-row container.
    ///
    /// A source with zero stored nonzeros gets one explicit zero entry
    /// synthesized at the last column, so downstream structure queries
    /// always see at least one nonzero; callers must not rely on
    /// `get_nnz()` returning 0 for all-zero inputs.
    pub fn upload_from_csr<S: CsrSource>(&mut self, source: &S) -> Result<(), AmgError> {
        let (nrows, ncols) = source.shape();
        if nrows != ncols {
            return Err(AmgError::NonSquareMatrix { rows: nrows, cols: ncols });
        }
        if source.indptr().len() != nrows + 1 {
            return Err(AmgError::ShapeMismatch {
                expected: nrows + 1,
                actual: source.indptr().len(),
            });
        }
        if source.values().is_empty() {
            if nrows == 0 {
                return self.upload(&[0], &[], &[], (1, 1));
            }
            let mut row_ptrs = vec![0; nrows];
            row_ptrs.push(1);
            return self.upload(&row_ptrs, &[nrows - 1], &[f64::zero()], (1, 1));
        }
        self.upload(source.indptr(), source.indices(), source.values(), (1, 1))
    }

    /// Attach halo-exchange metadata from raw map arrays.
    ///
    /// The map is validated structurally (neighbor budget, prefix
    /// monotonicity and coverage) before the engine sees it, so inconsistent
    /// input fails with [`AmgError::InvalidCommunicationMap`] instead of
    /// reaching native memory unsafely.
    #[allow(clippy::too_many_arguments)]
    pub fn comm_from_maps(
        &mut self,
        allocated_halo_depth: usize,
        num_import_rings: usize,
        max_num_neighbors: usize,
        neighbors: &[u32],
        send_ptrs: &[usize],
        send_maps: &[usize],
        recv_ptrs: &[usize],
        recv_maps: &[usize],
    ) -> Result<(), AmgError> {
        let map = CommMap {
            allocated_halo_depth,
            num_import_rings,
            neighbors: neighbors.to_vec(),
            send_ptrs: send_ptrs.to_vec(),
            send_maps: send_maps.to_vec(),
            recv_ptrs: recv_ptrs.to_vec(),
            recv_maps: recv_maps.to_vec(),
        };
        self.attach_comm_map(&map, max_num_neighbors)
    }

    /// Attach an already-built [`CommMap`].
    pub fn attach_comm_map(
        &mut self,
        map: &CommMap,
        max_num_neighbors: usize,
    ) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        map.validate(max_num_neighbors)?;
        engine.matrix_comm_from_maps(handle, map)?;
        log::debug!(
            "matrix {} comm map attached, {} neighbor(s), {} import ring(s)",
            handle.0,
            map.neighbors.len(),
            map.num_import_rings,
        );
        Ok(())
    }

    /// Replace coefficient values in place; the sparsity pattern and all
    /// structural queries are untouched. `data` must hold exactly
    /// `nnz * bx * by` values for the current structure.
    pub fn replace_coefficients(&mut self, data: &[f64]) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        let (n, (bx, by)) = engine.matrix_size(handle)?;
        if n == 0 {
            return Err(AmgError::InvalidState("matrix not uploaded"));
        }
        let nnz = engine.matrix_nnz(handle)?;
        let expected = nnz * bx * by;
        if data.len() != expected {
            return Err(AmgError::ShapeMismatch { expected, actual: data.len() });
        }
        engine.matrix_replace_coefficients(handle, n, nnz, data)?;
        Ok(())
    }

    /// `(n, (bx, by))`. Reports zero dimensions until an upload has
    /// populated the matrix; fails with `InvalidState` before creation.
    pub fn get_size(&self) -> Result<(usize, (usize, usize)), AmgError> {
        let (engine, handle) = self.parts()?;
        Ok(engine.matrix_size(handle)?)
    }

    /// Stored nonzero count (block entries, not scalar values).
    pub fn get_nnz(&self) -> Result<usize, AmgError> {
        let (engine, handle) = self.parts()?;
        Ok(engine.matrix_nnz(handle)?)
    }

    /// The mode this matrix was created against.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub(crate) fn parts(&self) -> Result<(&Arc<dyn Engine>, MatrixHandle), AmgError> {
        match (&self.engine, self.handle) {
            (Some(engine), Some(handle)) if self.state == HandleState::Active => {
                Ok((engine, handle))
            }
            _ => Err(AmgError::InvalidState("matrix not active")),
        }
    }

    /// Release the internal handle. Exactly once, after a successful create.
    pub fn destroy(&mut self) -> Result<(), AmgError> {
        self.state.require_active("matrix not active")?;
        let (engine, handle) = self.parts()?;
        engine.matrix_destroy(handle)?;
        log::debug!("matrix {} destroyed", handle.0);
        self.state = HandleState::Destroyed;
        Ok(())
    }
}

impl Default for DistributedMatrix {
    fn default() -> Self {
        DistributedMatrix::new()
    }
}

impl Drop for DistributedMatrix {
    fn drop(&mut self) {
        if self.state == HandleState::Active {
            log::warn!("matrix dropped while active, releasing handle");
            if let (Some(engine), Some(handle)) = (&self.engine, self.handle) {
                let _ = engine.matrix_destroy(handle);
            }
        }
    }
}

fn check_block(block_dims: (usize, usize)) -> Result<(), AmgError> {
    let (bx, by) = block_dims;
    if bx == 0 || by == 0 || bx != by {
        return Err(AmgError::UnsupportedShape { bx, by });
    }
    Ok(())
}

/// Length contracts shared by both upload paths.
fn check_triple(
    row_ptrs: &[usize],
    col_indices: &[usize],
    data: &[f64],
    block_dims: (usize, usize),
) -> Result<(), AmgError> {
    if row_ptrs.is_empty() {
        return Err(AmgError::ShapeMismatch { expected: 1, actual: 0 });
    }
    let n = row_ptrs.len() - 1;
    let nnz = col_indices.len();
    if row_ptrs[n] != nnz {
        return Err(AmgError::ShapeMismatch { expected: nnz, actual: row_ptrs[n] });
    }
    let (bx, by) = block_dims;
    if data.len() != nnz * bx * by {
        return Err(AmgError::ShapeMismatch { expected: nnz * bx * by, actual: data.len() });
    }
    Ok(())
}

/// Full local-upload validation; returns `(nrows, nnz)`.
fn check_local_csr(
    row_ptrs: &[usize],
    col_indices: &[usize],
    data: &[f64],
    block_dims: (usize, usize),
) -> Result<(usize, usize), AmgError> {
    check_block(block_dims)?;
    check_triple(row_ptrs, col_indices, data, block_dims)?;
    let nrows = row_ptrs.len() - 1;
    let ncols = 1 + col_indices.iter().max().copied().unwrap_or(0);
    let ncols = if col_indices.is_empty() { 0 } else { ncols };
    if nrows != ncols {
        return Err(AmgError::NonSquareMatrix { rows: nrows, cols: ncols });
    }
    Ok((nrows, col_indices.len()))
}
