//! In-process reference implementation of the [`Engine`] surface.
//!
//! Stores every object in host memory behind a single registry lock, checks
//! the same structural preconditions a native engine would, and reports
//! failures through the same [`StatusCode`] taxonomy. The solver capability
//! is a dense direct solve through faer's full-pivot LU, with an optional
//! Jacobi path selected by `solver=jacobi` in the configuration string.
//!
//! This backend exists so the host layer (and its callers) can be exercised
//! end to end without a device or a native engine build. It also enforces
//! destruction order: a Config with live Resources, or Resources with live
//! matrices/vectors/solvers, refuses to die with `BAD_PARAMETERS`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use faer::Mat;
use faer::linalg::solvers::SolveCore;
use num_traits::Float;

use crate::engine::{
    CommBinding, ConfigHandle, Engine, MatrixHandle, ResourcesHandle, SolverHandle, StatusCode,
    VectorHandle,
};
use crate::matrix::CommMap;
use crate::mode::Mode;

struct ConfigRecord {
    options: HashMap<String, String>,
    live_resources: usize,
}

struct ResourcesRecord {
    config: u64,
    #[allow(dead_code)]
    comm: Option<CommBinding>,
    #[allow(dead_code)]
    devices: Vec<u32>,
    live_objects: usize,
}

struct CsrStore {
    n: usize,
    block: (usize, usize),
    row_ptrs: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

struct MatrixRecord {
    resources: u64,
    mode: Mode,
    store: Option<CsrStore>,
    comm_map: Option<CommMap>,
    partition: Option<Vec<u32>>,
    rings: (usize, usize),
}

struct VectorRecord {
    resources: u64,
    mode: Mode,
    n: usize,
    block_dim: usize,
    values: Vec<f64>,
}

struct SolverRecord {
    resources: u64,
    mode: Mode,
    config: u64,
    matrix: Option<u64>,
    iterations: usize,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    configs: HashMap<u64, ConfigRecord>,
    resources: HashMap<u64, ResourcesRecord>,
    matrices: HashMap<u64, MatrixRecord>,
    vectors: HashMap<u64, VectorRecord>,
    solvers: HashMap<u64, SolverRecord>,
}

impl Registry {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Host-memory engine backend.
#[derive(Default)]
pub struct ReferenceEngine {
    registry: Mutex<Registry>,
}

impl ReferenceEngine {
    pub fn new() -> Self {
        ReferenceEngine::default()
    }

    /// A fresh engine behind an `Arc`, ready for `initialize_with` or for
    /// threading directly into `Config::create`.
    pub fn shared() -> Arc<ReferenceEngine> {
        Arc::new(ReferenceEngine::new())
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Partition vector recorded by the last globally partitioned upload,
    /// if one was given. Lets callers inspect what a native engine would
    /// have received.
    pub fn matrix_partition(&self, mat: MatrixHandle) -> Result<Option<Vec<u32>>, StatusCode> {
        let reg = self.lock();
        let record = reg.matrices.get(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        Ok(record.partition.clone())
    }

    /// `(inner_rings, outer_rings)` recorded by the last globally
    /// partitioned upload; `(0, 0)` before one.
    pub fn matrix_rings(&self, mat: MatrixHandle) -> Result<(usize, usize), StatusCode> {
        let reg = self.lock();
        let record = reg.matrices.get(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        Ok(record.rings)
    }

    /// Neighbor ranks of the attached communication map, if any.
    pub fn matrix_neighbors(&self, mat: MatrixHandle) -> Result<Option<Vec<u32>>, StatusCode> {
        let reg = self.lock();
        let record = reg.matrices.get(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        Ok(record.comm_map.as_ref().map(|m| m.neighbors.clone()))
    }
}

fn parse_options(options: &str) -> Result<HashMap<String, String>, StatusCode> {
    let mut parsed = HashMap::new();
    for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (key, value) = token.split_once('=').ok_or(StatusCode::IO_ERROR)?;
        parsed.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(parsed)
}

fn check_csr(
    n: usize,
    nnz: usize,
    block_dims: (usize, usize),
    row_ptrs: &[usize],
    col_indices: &[usize],
    data: &[f64],
    ncols_bound: usize,
) -> Result<(), StatusCode> {
    let (bx, by) = block_dims;
    if bx == 0 || by == 0 {
        return Err(StatusCode::BAD_PARAMETERS);
    }
    if row_ptrs.len() != n + 1 || row_ptrs[0] != 0 || row_ptrs[n] != nnz {
        return Err(StatusCode::BAD_PARAMETERS);
    }
    if row_ptrs.windows(2).any(|w| w[0] > w[1]) {
        return Err(StatusCode::BAD_PARAMETERS);
    }
    if col_indices.len() != nnz || data.len() != nnz * bx * by {
        return Err(StatusCode::BAD_PARAMETERS);
    }
    if col_indices.iter().any(|&c| c >= ncols_bound) {
        return Err(StatusCode::BAD_PARAMETERS);
    }
    Ok(())
}

/// y = A x over the scalar CSR structure.
fn spmv<T: Float + Send + Sync>(
    row_ptrs: &[usize],
    col_indices: &[usize],
    values: &[T],
    x: &[T],
    y: &mut [T],
) {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            let mut sum = T::zero();
            for k in row_ptrs[i]..row_ptrs[i + 1] {
                sum = sum + values[k] * x[col_indices[k]];
            }
            *yi = sum;
        });
    }
    #[cfg(not(feature = "rayon"))]
    for (i, yi) in y.iter_mut().enumerate() {
        let mut sum = T::zero();
        for k in row_ptrs[i]..row_ptrs[i + 1] {
            sum = sum + values[k] * x[col_indices[k]];
        }
        *yi = sum;
    }
}

fn norm2<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, &v| acc + v * v).sqrt()
}

/// Dense direct solve of the scalar CSR system through faer's LU.
fn solve_direct(store: &CsrStore, rhs: &[f64], sol: &mut [f64]) {
    let n = store.n;
    let mut dense = vec![0.0; n * n];
    for row in 0..n {
        for k in store.row_ptrs[row]..store.row_ptrs[row + 1] {
            dense[row * n + store.col_indices[k]] += store.values[k];
        }
    }
    let a = Mat::from_fn(n, n, |i, j| dense[i * n + j]);
    let lu = faer::linalg::solvers::FullPivLu::new(a.as_ref());
    sol.copy_from_slice(rhs);
    let sol_mat = faer::MatMut::from_column_major_slice_mut(sol, n, 1);
    lu.solve_in_place_with_conj(faer::Conj::No, sol_mat);
}

/// Jacobi relaxation; returns the iteration count at convergence or cutoff.
fn solve_jacobi(
    store: &CsrStore,
    rhs: &[f64],
    sol: &mut [f64],
    tol: f64,
    max_iters: usize,
) -> Result<usize, StatusCode> {
    let n = store.n;
    let mut diag = vec![0.0; n];
    for row in 0..n {
        for k in store.row_ptrs[row]..store.row_ptrs[row + 1] {
            if store.col_indices[k] == row {
                diag[row] += store.values[k];
            }
        }
    }
    if diag.iter().any(|&d| d == 0.0) {
        return Err(StatusCode::INTERNAL);
    }
    let rhs_norm = norm2(rhs).max(f64::MIN_POSITIVE);
    let mut ax = vec![0.0; n];
    for it in 0..max_iters {
        spmv(&store.row_ptrs, &store.col_indices, &store.values, sol, &mut ax);
        let mut res_norm = 0.0;
        for i in 0..n {
            let r = rhs[i] - ax[i];
            res_norm += r * r;
            sol[i] += r / diag[i];
        }
        if res_norm.sqrt() / rhs_norm <= tol {
            return Ok(it + 1);
        }
    }
    Ok(max_iters)
}

impl Engine for ReferenceEngine {
    fn config_create(&self, options: &str) -> Result<ConfigHandle, StatusCode> {
        let parsed = parse_options(options)?;
        let mut reg = self.lock();
        let id = reg.alloc();
        reg.configs.insert(id, ConfigRecord { options: parsed, live_resources: 0 });
        Ok(ConfigHandle(id))
    }

    fn config_create_from_file(&self, path: &Path) -> Result<ConfigHandle, StatusCode> {
        let text = std::fs::read_to_string(path).map_err(|_| StatusCode::IO_ERROR)?;
        self.config_create(&text)
    }

    fn config_destroy(&self, cfg: ConfigHandle) -> Result<(), StatusCode> {
        let mut reg = self.lock();
        let record = reg.configs.get(&cfg.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        if record.live_resources > 0 {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        reg.configs.remove(&cfg.0);
        Ok(())
    }

    fn resources_create(
        &self,
        cfg: ConfigHandle,
        comm: Option<CommBinding>,
        device_ids: &[u32],
    ) -> Result<ResourcesHandle, StatusCode> {
        if device_ids.is_empty() {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        let mut seen = device_ids.to_vec();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != device_ids.len() {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        if let Some(binding) = comm {
            if binding.size == 0 || binding.rank >= binding.size {
                return Err(StatusCode::BAD_PARAMETERS);
            }
        }
        let mut reg = self.lock();
        let config = reg.configs.get_mut(&cfg.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        config.live_resources += 1;
        let id = reg.alloc();
        reg.resources.insert(
            id,
            ResourcesRecord { config: cfg.0, comm, devices: device_ids.to_vec(), live_objects: 0 },
        );
        Ok(ResourcesHandle(id))
    }

    fn resources_destroy(&self, res: ResourcesHandle) -> Result<(), StatusCode> {
        let mut reg = self.lock();
        let record = reg.resources.get(&res.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        if record.live_objects > 0 {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        let config = record.config;
        reg.resources.remove(&res.0);
        if let Some(cfg) = reg.configs.get_mut(&config) {
            cfg.live_resources -= 1;
        }
        Ok(())
    }

    fn matrix_create(&self, res: ResourcesHandle, mode: Mode) -> Result<MatrixHandle, StatusCode> {
        let mut reg = self.lock();
        let record = reg.resources.get_mut(&res.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        record.live_objects += 1;
        let id = reg.alloc();
        reg.matrices.insert(
            id,
            MatrixRecord {
                resources: res.0,
                mode,
                store: None,
                comm_map: None,
                partition: None,
                rings: (0, 0),
            },
        );
        Ok(MatrixHandle(id))
    }

    fn matrix_destroy(&self, mat: MatrixHandle) -> Result<(), StatusCode> {
        let mut reg = self.lock();
        let record = reg.matrices.remove(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        if let Some(res) = reg.resources.get_mut(&record.resources) {
            res.live_objects -= 1;
        }
        Ok(())
    }

    fn matrix_upload(
        &self,
        mat: MatrixHandle,
        n: usize,
        nnz: usize,
        block_dims: (usize, usize),
        row_ptrs: &[usize],
        col_indices: &[usize],
        data: &[f64],
    ) -> Result<(), StatusCode> {
        check_csr(n, nnz, block_dims, row_ptrs, col_indices, data, n)?;
        let mut reg = self.lock();
        let record = reg.matrices.get_mut(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        record.store = Some(CsrStore {
            n,
            block: block_dims,
            row_ptrs: row_ptrs.to_vec(),
            col_indices: col_indices.to_vec(),
            values: data.to_vec(),
        });
        Ok(())
    }

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
    ) -> Result<(), StatusCode> {
        // Single-process backend: the local slice is the whole structure,
        // but partition and ring metadata are recorded as given.
        if row_ptrs.is_empty() {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        check_csr(row_ptrs.len() - 1, nnz, block_dims, row_ptrs, col_indices, data, n_global)?;
        if inner_rings == 0 || outer_rings == 0 {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        if let Some(part) = partition {
            if part.len() != n_global {
                return Err(StatusCode::BAD_PARAMETERS);
            }
        }
        let mut reg = self.lock();
        let record = reg.matrices.get_mut(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        record.store = Some(CsrStore {
            n: row_ptrs.len() - 1,
            block: block_dims,
            row_ptrs: row_ptrs.to_vec(),
            col_indices: col_indices.to_vec(),
            values: data.to_vec(),
        });
        record.partition = partition.map(|p| p.to_vec());
        record.rings = (inner_rings, outer_rings);
        Ok(())
    }

    fn matrix_comm_from_maps(&self, mat: MatrixHandle, map: &CommMap) -> Result<(), StatusCode> {
        // Same structural checks a native attach would perform.
        let nb = map.neighbors.len();
        if map.send_ptrs.len() != nb + 1 || map.recv_ptrs.len() != nb + 1 {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        if map.send_ptrs.windows(2).any(|w| w[0] > w[1])
            || map.recv_ptrs.windows(2).any(|w| w[0] > w[1])
        {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        if map.send_ptrs[nb] != map.send_maps.len() || map.recv_ptrs[nb] != map.recv_maps.len() {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        let mut reg = self.lock();
        let record = reg.matrices.get_mut(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        record.comm_map = Some(map.clone());
        Ok(())
    }

    fn matrix_replace_coefficients(
        &self,
        mat: MatrixHandle,
        n: usize,
        nnz: usize,
        data: &[f64],
    ) -> Result<(), StatusCode> {
        let mut reg = self.lock();
        let record = reg.matrices.get_mut(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        let store = record.store.as_mut().ok_or(StatusCode::NOT_INITIALIZED)?;
        let (bx, by) = store.block;
        if n != store.n || nnz * bx * by != store.values.len() || data.len() != store.values.len() {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        store.values.copy_from_slice(data);
        Ok(())
    }

    fn matrix_size(&self, mat: MatrixHandle) -> Result<(usize, (usize, usize)), StatusCode> {
        let reg = self.lock();
        let record = reg.matrices.get(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        Ok(match &record.store {
            Some(store) => (store.n, store.block),
            None => (0, (0, 0)),
        })
    }

    fn matrix_nnz(&self, mat: MatrixHandle) -> Result<usize, StatusCode> {
        let reg = self.lock();
        let record = reg.matrices.get(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        Ok(record.store.as_ref().map_or(0, |s| s.col_indices.len()))
    }

    fn vector_create(&self, res: ResourcesHandle, mode: Mode) -> Result<VectorHandle, StatusCode> {
        let mut reg = self.lock();
        let record = reg.resources.get_mut(&res.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        record.live_objects += 1;
        let id = reg.alloc();
        reg.vectors.insert(
            id,
            VectorRecord { resources: res.0, mode, n: 0, block_dim: 0, values: Vec::new() },
        );
        Ok(VectorHandle(id))
    }

    fn vector_destroy(&self, vec: VectorHandle) -> Result<(), StatusCode> {
        let mut reg = self.lock();
        let record = reg.vectors.remove(&vec.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        if let Some(res) = reg.resources.get_mut(&record.resources) {
            res.live_objects -= 1;
        }
        Ok(())
    }

    fn vector_upload(
        &self,
        vec: VectorHandle,
        n: usize,
        block_dim: usize,
        data: &[f64],
    ) -> Result<(), StatusCode> {
        if block_dim == 0 || data.len() != n * block_dim {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        let mut reg = self.lock();
        let record = reg.vectors.get_mut(&vec.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        record.n = n;
        record.block_dim = block_dim;
        record.values = data.to_vec();
        Ok(())
    }

    fn vector_set_zero(
        &self,
        vec: VectorHandle,
        n: usize,
        block_dim: usize,
    ) -> Result<(), StatusCode> {
        if block_dim == 0 {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        let mut reg = self.lock();
        let record = reg.vectors.get_mut(&vec.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        record.n = n;
        record.block_dim = block_dim;
        record.values = vec![0.0; n * block_dim];
        Ok(())
    }

    fn vector_download(&self, vec: VectorHandle, out: &mut Vec<f64>) -> Result<(), StatusCode> {
        let reg = self.lock();
        let record = reg.vectors.get(&vec.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        out.clear();
        out.extend_from_slice(&record.values);
        Ok(())
    }

    fn vector_size(&self, vec: VectorHandle) -> Result<(usize, usize), StatusCode> {
        let reg = self.lock();
        let record = reg.vectors.get(&vec.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        Ok((record.n, record.block_dim))
    }

    fn solver_create(
        &self,
        res: ResourcesHandle,
        mode: Mode,
        cfg: ConfigHandle,
    ) -> Result<SolverHandle, StatusCode> {
        let mut reg = self.lock();
        if !reg.configs.contains_key(&cfg.0) {
            return Err(StatusCode::UNKNOWN_HANDLE);
        }
        let record = reg.resources.get_mut(&res.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        record.live_objects += 1;
        let id = reg.alloc();
        reg.solvers.insert(
            id,
            SolverRecord { resources: res.0, mode, config: cfg.0, matrix: None, iterations: 0 },
        );
        Ok(SolverHandle(id))
    }

    fn solver_destroy(&self, solver: SolverHandle) -> Result<(), StatusCode> {
        let mut reg = self.lock();
        let record = reg.solvers.remove(&solver.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        if let Some(res) = reg.resources.get_mut(&record.resources) {
            res.live_objects -= 1;
        }
        Ok(())
    }

    fn solver_setup(&self, solver: SolverHandle, mat: MatrixHandle) -> Result<(), StatusCode> {
        let mut reg = self.lock();
        let (mode, block) = {
            let record = reg.matrices.get(&mat.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
            let store = record.store.as_ref().ok_or(StatusCode::NOT_INITIALIZED)?;
            (record.mode, store.block)
        };
        if block != (1, 1) {
            // Block-structured solves are outside this backend.
            return Err(StatusCode::UNSUPPORTED);
        }
        let record = reg.solvers.get_mut(&solver.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        if record.mode != mode {
            return Err(StatusCode::BAD_PARAMETERS);
        }
        record.matrix = Some(mat.0);
        Ok(())
    }

    fn solver_solve(
        &self,
        solver: SolverHandle,
        rhs: VectorHandle,
        sol: VectorHandle,
    ) -> Result<(), StatusCode> {
        let mut reg = self.lock();
        let (matrix_id, config_id, mode) = {
            let record = reg.solvers.get(&solver.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
            let matrix = record.matrix.ok_or(StatusCode::NOT_INITIALIZED)?;
            (matrix, record.config, record.mode)
        };
        let (kind, tol, max_iters) = {
            let config = reg.configs.get(&config_id).ok_or(StatusCode::UNKNOWN_HANDLE)?;
            let kind = config.options.get("solver").map(String::as_str).unwrap_or("direct").to_string();
            let tol = config
                .options
                .get("tolerance")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1e-10);
            let max_iters = config
                .options
                .get("max_iters")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000);
            (kind, tol, max_iters)
        };
        let rhs_values = {
            let record = reg.vectors.get(&rhs.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
            if record.mode != mode {
                return Err(StatusCode::BAD_PARAMETERS);
            }
            record.values.clone()
        };
        let mut sol_values = {
            let record = reg.vectors.get(&sol.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
            if record.mode != mode {
                return Err(StatusCode::BAD_PARAMETERS);
            }
            record.values.clone()
        };
        let iterations = {
            let matrix = reg.matrices.get(&matrix_id).ok_or(StatusCode::UNKNOWN_HANDLE)?;
            let store = matrix.store.as_ref().ok_or(StatusCode::NOT_INITIALIZED)?;
            if rhs_values.len() != store.n || sol_values.len() != store.n {
                return Err(StatusCode::BAD_PARAMETERS);
            }
            match kind.as_str() {
                "direct" => {
                    solve_direct(store, &rhs_values, &mut sol_values);
                    1
                }
                "jacobi" => solve_jacobi(store, &rhs_values, &mut sol_values, tol, max_iters)?,
                _ => return Err(StatusCode::UNSUPPORTED),
            }
        };
        log::debug!("solver {} finished in {} iteration(s)", solver.0, iterations);
        if let Some(record) = reg.vectors.get_mut(&sol.0) {
            record.values = sol_values;
        }
        if let Some(record) = reg.solvers.get_mut(&solver.0) {
            record.iterations = iterations;
        }
        Ok(())
    }

    fn solver_iterations(&self, solver: SolverHandle) -> Result<usize, StatusCode> {
        let reg = self.lock();
        let record = reg.solvers.get(&solver.0).ok_or(StatusCode::UNKNOWN_HANDLE)?;
        Ok(record.iterations)
    }
}
