//! Solver-instance lifecycle.
//!
//! The iteration engine itself (smoothers, coarsening, Krylov acceleration)
//! lives behind the [`Engine`] surface; this wrapper owns the solver handle
//! and sequences setup/solve against it. The matrix and both vectors must
//! carry the solver's own [`Mode`]; mixing modes across objects used
//! together is rejected rather than left undefined.

use std::sync::Arc;

use crate::config::Config;
use crate::engine::{Engine, SolverHandle};
use crate::error::AmgError;
use crate::lifecycle::HandleState;
use crate::matrix::DistributedMatrix;
use crate::mode::Mode;
use crate::resources::Resources;
use crate::vector::Vector;

pub struct Solver {
    state: HandleState,
    engine: Option<Arc<dyn Engine>>,
    handle: Option<SolverHandle>,
    mode: Option<Mode>,
}

impl Solver {
    pub fn new() -> Self {
        Solver { state: HandleState::Uninitialized, engine: None, handle: None, mode: None }
    }

    /// Allocate a solver instance against `resources`, configured by `config`.
    pub fn create(
        &mut self,
        resources: &Resources,
        descriptor: &str,
        config: &Config,
    ) -> Result<(), AmgError> {
        self.state.require_uninitialized("solver already created")?;
        let mode = Mode::resolve(descriptor)?;
        let (engine, res_handle) = resources.parts()?;
        let (_, cfg_handle) = config.parts()?;
        let handle = engine.solver_create(res_handle, mode, cfg_handle)?;
        log::debug!("solver {} created with mode {mode}", handle.0);
        self.engine = Some(Arc::clone(engine));
        self.handle = Some(handle);
        self.mode = Some(mode);
        self.state = HandleState::Active;
        Ok(())
    }

    /// Build the solve hierarchy for `matrix`, which must be active,
    /// uploaded, and created against this solver's mode.
    pub fn setup(&mut self, matrix: &DistributedMatrix) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        let (_, mat_handle) = matrix.parts()?;
        if matrix.mode() != self.mode {
            return Err(AmgError::InvalidState("matrix mode differs from solver mode"));
        }
        engine.solver_setup(handle, mat_handle)?;
        Ok(())
    }

    /// Solve into `sol` for the right-hand side `rhs`. Both vectors must
    /// carry this solver's mode; `setup` must have succeeded first.
    pub fn solve(&mut self, rhs: &Vector, sol: &mut Vector) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        let (_, rhs_handle) = rhs.parts()?;
        let (_, sol_handle) = sol.parts()?;
        if rhs.mode() != self.mode || sol.mode() != self.mode {
            return Err(AmgError::InvalidState("vector mode differs from solver mode"));
        }
        engine.solver_solve(handle, rhs_handle, sol_handle)?;
        Ok(())
    }

    /// Iterations taken by the last solve.
    pub fn iterations(&self) -> Result<usize, AmgError> {
        let (engine, handle) = self.parts()?;
        Ok(engine.solver_iterations(handle)?)
    }

    fn parts(&self) -> Result<(&Arc<dyn Engine>, SolverHandle), AmgError> {
        match (&self.engine, self.handle) {
            (Some(engine), Some(handle)) if self.state == HandleState::Active => {
                Ok((engine, handle))
            }
            _ => Err(AmgError::InvalidState("solver not active")),
        }
    }

    pub fn destroy(&mut self) -> Result<(), AmgError> {
        self.state.require_active("solver not active")?;
        let (engine, handle) = self.parts()?;
        engine.solver_destroy(handle)?;
        log::debug!("solver {} destroyed", handle.0);
        self.state = HandleState::Destroyed;
        Ok(())
    }
}

impl Default for Solver {
    fn default() -> Self {
        Solver::new()
    }
}

impl Drop for Solver {
    fn drop(&mut self) {
        if self.state == HandleState::Active {
            log::warn!("solver dropped while active, releasing handle");
            if let (Some(engine), Some(handle)) = (&self.engine, self.handle) {
                let _ = engine.solver_destroy(handle);
            }
        }
    }
}
