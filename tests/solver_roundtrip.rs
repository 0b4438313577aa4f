//! End-to-end solves through the engine surface, checked against a direct
//! faer factorization of the same system.

use std::sync::Arc;

use amghost::{
    AmgError, Config, DistributedMatrix, Engine, ReferenceEngine, Resources, Solver, Vector,
};
use approx::assert_abs_diff_eq;
use faer::Mat;
use faer::linalg::solvers::SolveCore;
use rand::Rng;

struct Stack {
    cfg: Config,
    res: Resources,
}

fn stack(options: &str) -> Stack {
    let engine: Arc<dyn Engine> = ReferenceEngine::shared();
    let mut cfg = Config::new();
    cfg.create(&engine, options).unwrap();
    let mut res = Resources::new();
    res.create_simple(&cfg).unwrap();
    Stack { cfg, res }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.res.destroy().unwrap();
        self.cfg.destroy().unwrap();
    }
}

/// Random SPD system as a fully populated CSR triple.
fn random_spd_csr(n: usize) -> (Vec<usize>, Vec<usize>, Vec<f64>, Vec<f64>) {
    let mut rng = rand::thread_rng();
    let entries: Vec<f64> = (0..n * n).map(|_| rng.r#gen()).collect();
    let m = Mat::from_fn(n, n, |i, j| entries[j * n + i]);
    let m_t = m.transpose();
    let a = &m_t * &m + Mat::<f64>::identity(n, n);
    let mut row_ptrs = vec![0];
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for i in 0..n {
        for j in 0..n {
            cols.push(j);
            values.push(a[(i, j)]);
        }
        row_ptrs.push(cols.len());
    }
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    (row_ptrs, cols, values, b)
}

fn direct_oracle(n: usize, row_ptrs: &[usize], cols: &[usize], values: &[f64], b: &[f64]) -> Vec<f64> {
    let mut dense = vec![0.0; n * n];
    for i in 0..n {
        for k in row_ptrs[i]..row_ptrs[i + 1] {
            dense[i * n + cols[k]] = values[k];
        }
    }
    let a = Mat::from_fn(n, n, |i, j| dense[i * n + j]);
    let lu = faer::linalg::solvers::FullPivLu::new(a.as_ref());
    let mut x = b.to_vec();
    let x_mat = faer::MatMut::from_column_major_slice_mut(&mut x, n, 1);
    lu.solve_in_place_with_conj(faer::Conj::No, x_mat);
    x
}

#[test]
fn solve_matches_direct_factorization() {
    let n = 10;
    let (row_ptrs, cols, values, b) = random_spd_csr(n);
    let stack = stack("solver=direct");

    let mut mat = DistributedMatrix::new();
    mat.create(&stack.res, "hDDI").unwrap();
    mat.upload(&row_ptrs, &cols, &values, (1, 1)).unwrap();

    let mut rhs = Vector::new();
    rhs.create(&stack.res, "hDDI").unwrap();
    rhs.upload(&b, n, 1).unwrap();
    let mut sol = Vector::new();
    sol.create(&stack.res, "hDDI").unwrap();
    sol.set_zero(n, 1).unwrap();

    let mut solver = Solver::new();
    solver.create(&stack.res, "hDDI", &stack.cfg).unwrap();
    solver.setup(&mat).unwrap();
    solver.solve(&rhs, &mut sol).unwrap();

    let mut x = Vec::new();
    sol.download(&mut x).unwrap();
    let expected = direct_oracle(n, &row_ptrs, &cols, &values, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x[i], expected[i], epsilon = 1e-8);
    }

    solver.destroy().unwrap();
    sol.destroy().unwrap();
    rhs.destroy().unwrap();
    mat.destroy().unwrap();
}

#[test]
fn jacobi_configuration_iterates() {
    // Diagonally dominant 3x3 so Jacobi converges.
    let stack = stack("solver=jacobi, tolerance=1e-12, max_iters=500");
    let row_ptrs = vec![0, 3, 6, 9];
    let cols = vec![0, 1, 2, 0, 1, 2, 0, 1, 2];
    let values = vec![10.0, 1.0, 1.0, 1.0, 12.0, 1.0, 1.0, 1.0, 9.0];
    let b = vec![12.0, 14.0, 11.0];

    let mut mat = DistributedMatrix::new();
    mat.create(&stack.res, "hDDI").unwrap();
    mat.upload(&row_ptrs, &cols, &values, (1, 1)).unwrap();

    let mut rhs = Vector::new();
    rhs.create(&stack.res, "hDDI").unwrap();
    rhs.upload(&b, 3, 1).unwrap();
    let mut sol = Vector::new();
    sol.create(&stack.res, "hDDI").unwrap();
    sol.set_zero(3, 1).unwrap();

    let mut solver = Solver::new();
    solver.create(&stack.res, "hDDI", &stack.cfg).unwrap();
    solver.setup(&mat).unwrap();
    solver.solve(&rhs, &mut sol).unwrap();
    let iters = solver.iterations().unwrap();
    assert!(iters > 1 && iters < 500);

    let mut x = Vec::new();
    sol.download(&mut x).unwrap();
    let expected = direct_oracle(3, &row_ptrs, &cols, &values, &b);
    for i in 0..3 {
        assert_abs_diff_eq!(x[i], expected[i], epsilon = 1e-6);
    }

    solver.destroy().unwrap();
    sol.destroy().unwrap();
    rhs.destroy().unwrap();
    mat.destroy().unwrap();
}

#[test]
fn replace_coefficients_changes_values_not_structure() {
    let stack = stack("solver=direct");
    let mut mat = DistributedMatrix::new();
    mat.create(&stack.res, "hDDI").unwrap();
    mat.upload(&[0, 1], &[0], &[5.0], (1, 1)).unwrap();

    let mut rhs = Vector::new();
    rhs.create(&stack.res, "hDDI").unwrap();
    rhs.upload(&[10.0], 1, 1).unwrap();
    let mut sol = Vector::new();
    sol.create(&stack.res, "hDDI").unwrap();
    sol.set_zero(1, 1).unwrap();

    let mut solver = Solver::new();
    solver.create(&stack.res, "hDDI", &stack.cfg).unwrap();
    solver.setup(&mat).unwrap();
    solver.solve(&rhs, &mut sol).unwrap();
    let mut x = Vec::new();
    sol.download(&mut x).unwrap();
    assert_abs_diff_eq!(x[0], 2.0, epsilon = 1e-12);

    // Correctly sized replacement changes values, not structure.
    mat.replace_coefficients(&[4.0]).unwrap();
    assert_eq!(mat.get_size().unwrap(), (1, (1, 1)));
    assert_eq!(mat.get_nnz().unwrap(), 1);
    solver.setup(&mat).unwrap();
    solver.solve(&rhs, &mut sol).unwrap();
    sol.download(&mut x).unwrap();
    assert_abs_diff_eq!(x[0], 2.5, epsilon = 1e-12);

    // Mismatched replacement fails and leaves the prior coefficients.
    let err = mat.replace_coefficients(&[1.0, 2.0]).unwrap_err();
    assert_eq!(err, AmgError::ShapeMismatch { expected: 1, actual: 2 });
    solver.solve(&rhs, &mut sol).unwrap();
    sol.download(&mut x).unwrap();
    assert_abs_diff_eq!(x[0], 2.5, epsilon = 1e-12);

    solver.destroy().unwrap();
    sol.destroy().unwrap();
    rhs.destroy().unwrap();
    mat.destroy().unwrap();
}

#[test]
fn mode_mixing_rejected() {
    let stack = stack("solver=direct");
    let mut mat = DistributedMatrix::new();
    mat.create(&stack.res, "hDDI").unwrap();
    mat.upload(&[0, 1], &[0], &[1.0], (1, 1)).unwrap();

    let mut solver = Solver::new();
    solver.create(&stack.res, "hFFI", &stack.cfg).unwrap();
    assert!(matches!(solver.setup(&mat), Err(AmgError::InvalidState(_))));

    solver.destroy().unwrap();
    mat.destroy().unwrap();
}

#[test]
fn solve_before_setup_fails() {
    let stack = stack("solver=direct");
    let mut rhs = Vector::new();
    rhs.create(&stack.res, "hDDI").unwrap();
    rhs.upload(&[1.0], 1, 1).unwrap();
    let mut sol = Vector::new();
    sol.create(&stack.res, "hDDI").unwrap();
    sol.set_zero(1, 1).unwrap();

    let mut solver = Solver::new();
    solver.create(&stack.res, "hDDI", &stack.cfg).unwrap();
    assert!(matches!(solver.solve(&rhs, &mut sol), Err(AmgError::Engine { .. })));

    solver.destroy().unwrap();
    sol.destroy().unwrap();
    rhs.destroy().unwrap();
}
