//! Upload-path tests: CSR triples in, structural queries out.
//!
//! Covers the single-partition upload, the compressed-row container
//! ingestion path with its degenerate all-zero tolerance, the globally
//! partitioned upload, and halo-map attachment from raw arrays.

use std::sync::Arc;

use amghost::{
    AmgError, Config, CsrSource, DistributedMatrix, Engine, ReferenceEngine, Resources,
};

struct Fixture {
    cfg: Config,
    res: Resources,
}

impl Fixture {
    fn new() -> Self {
        let engine: Arc<dyn Engine> = ReferenceEngine::shared();
        let mut cfg = Config::new();
        cfg.create(&engine, "").unwrap();
        let mut res = Resources::new();
        res.create_simple(&cfg).unwrap();
        Fixture { cfg, res }
    }

    fn matrix(&self) -> DistributedMatrix {
        let mut mat = DistributedMatrix::new();
        mat.create(&self.res, "hDDI").unwrap();
        mat
    }

    fn teardown(mut self, mut mat: DistributedMatrix) {
        mat.destroy().unwrap();
        self.res.destroy().unwrap();
        self.cfg.destroy().unwrap();
    }
}

#[test]
fn upload_reports_size_and_nnz() {
    // 2x2 with a full pattern
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    mat.upload(&[0, 2, 4], &[0, 1, 0, 1], &[1.0, 2.0, 3.0, 4.0], (1, 1)).unwrap();
    assert_eq!(mat.get_size().unwrap(), (2, (1, 1)));
    assert_eq!(mat.get_nnz().unwrap(), 4);
    fx.teardown(mat);
}

#[test]
fn upload_single_entry() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    mat.upload(&[0, 1], &[0], &[5.0], (1, 1)).unwrap();
    assert_eq!(mat.get_size().unwrap(), (1, (1, 1)));
    assert_eq!(mat.get_nnz().unwrap(), 1);
    fx.teardown(mat);
}

#[test]
fn rectangular_upload_rejected() {
    // column index 2 implies 3 columns against 2 rows
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    let err = mat.upload(&[0, 2, 4], &[0, 1, 0, 2], &[1.0; 4], (1, 1)).unwrap_err();
    assert_eq!(err, AmgError::NonSquareMatrix { rows: 2, cols: 3 });
    // No partial state: the matrix still reports the pre-upload shape.
    assert_eq!(mat.get_size().unwrap(), (0, (0, 0)));
    assert_eq!(mat.get_nnz().unwrap(), 0);
    fx.teardown(mat);
}

#[test]
fn non_square_blocks_rejected() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    let err = mat.upload(&[0, 1], &[0], &[5.0, 6.0], (2, 1)).unwrap_err();
    assert_eq!(err, AmgError::UnsupportedShape { bx: 2, by: 1 });
    fx.teardown(mat);
}

#[test]
fn block_upload_carries_block_shape() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    let data: Vec<f64> = (0..8).map(f64::from).collect();
    mat.upload(&[0, 1, 2], &[0, 1], &data, (2, 2)).unwrap();
    assert_eq!(mat.get_size().unwrap(), (2, (2, 2)));
    assert_eq!(mat.get_nnz().unwrap(), 2);
    fx.teardown(mat);
}

struct HostCsr {
    shape: (usize, usize),
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrSource for HostCsr {
    fn shape(&self) -> (usize, usize) {
        self.shape
    }
    fn indptr(&self) -> &[usize] {
        &self.indptr
    }
    fn indices(&self) -> &[usize] {
        &self.indices
    }
    fn values(&self) -> &[f64] {
        &self.data
    }
}

#[test]
fn csr_container_ingestion() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    let src = HostCsr {
        shape: (2, 2),
        indptr: vec![0, 2, 4],
        indices: vec![0, 1, 0, 1],
        data: vec![1.0, 2.0, 3.0, 4.0],
    };
    mat.upload_from_csr(&src).unwrap();
    assert_eq!(mat.get_size().unwrap(), (2, (1, 1)));
    assert_eq!(mat.get_nnz().unwrap(), 4);
    fx.teardown(mat);
}

#[test]
fn empty_container_synthesizes_one_zero() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    let src = HostCsr { shape: (1, 1), indptr: vec![0, 0], indices: vec![], data: vec![] };
    mat.upload_from_csr(&src).unwrap();
    assert_eq!(mat.get_size().unwrap(), (1, (1, 1)));
    assert_eq!(mat.get_nnz().unwrap(), 1);
    fx.teardown(mat);
}

#[test]
fn rectangular_container_rejected() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    let src = HostCsr { shape: (2, 3), indptr: vec![0, 0, 0], indices: vec![], data: vec![] };
    let err = mat.upload_from_csr(&src).unwrap_err();
    assert_eq!(err, AmgError::NonSquareMatrix { rows: 2, cols: 3 });
    fx.teardown(mat);
}

#[test]
fn global_upload_with_partition_vector() {
    // 4-row global chain, two ranks, this process holding rows 0..2
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    mat.upload_global(
        4,
        &[0, 2, 5],
        &[0, 1, 0, 1, 2],
        &[2.0, -1.0, -1.0, 2.0, -1.0],
        1,
        (1, 1),
        Some(&[0, 0, 1, 1]),
    )
    .unwrap();
    assert_eq!(mat.get_nnz().unwrap(), 5);
    fx.teardown(mat);
}

#[test]
fn global_upload_checks_partition_length() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    let err = mat
        .upload_global(4, &[0, 1], &[0], &[1.0], 1, (1, 1), Some(&[0, 0]))
        .unwrap_err();
    assert_eq!(err, AmgError::ShapeMismatch { expected: 4, actual: 2 });
    fx.teardown(mat);
}

#[test]
fn global_upload_rejects_columns_outside_global_size() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    let err = mat
        .upload_global(2, &[0, 1], &[3], &[1.0], 1, (1, 1), None)
        .unwrap_err();
    assert_eq!(err, AmgError::NonSquareMatrix { rows: 2, cols: 4 });
    fx.teardown(mat);
}

#[test]
fn comm_maps_attach_and_budget() {
    let fx = Fixture::new();
    let mut mat = fx.matrix();
    mat.upload(&[0, 2, 4], &[0, 1, 0, 1], &[1.0, 2.0, 3.0, 4.0], (1, 1)).unwrap();
    mat.comm_from_maps(1, 1, 1, &[1], &[0, 3], &[0, 1, 2], &[0, 2], &[5, 6]).unwrap();
    // Same map under a zero-neighbor budget is structurally inconsistent.
    let err = mat
        .comm_from_maps(1, 1, 0, &[1], &[0, 3], &[0, 1, 2], &[0, 2], &[5, 6])
        .unwrap_err();
    assert!(matches!(err, AmgError::InvalidCommunicationMap(_)));
    fx.teardown(mat);
}

#[test]
fn upload_before_create_fails() {
    let mut mat = DistributedMatrix::new();
    let err = mat.upload(&[0, 1], &[0], &[5.0], (1, 1)).unwrap_err();
    assert!(matches!(err, AmgError::InvalidState(_)));
}

#[test]
fn unresolvable_mode_rejected_at_create() {
    let fx = Fixture::new();
    let mut mat = DistributedMatrix::new();
    let err = mat.create(&fx.res, "dDDX").unwrap_err();
    assert!(matches!(err, AmgError::InvalidMode(_)));
    // Failed create never reaches Active.
    assert!(matches!(mat.destroy(), Err(AmgError::InvalidState(_))));
    let mat = fx.matrix();
    fx.teardown(mat);
}
