//! Solver-visible vector handles.
//!
//! Same lifecycle state machine as the matrix wrapper, simpler surface:
//! upload host data, zero-fill, download, query size.

use std::sync::Arc;

use crate::engine::{Engine, VectorHandle};
use crate::error::AmgError;
use crate::lifecycle::HandleState;
use crate::mode::Mode;
use crate::resources::Resources;

pub struct Vector {
    state: HandleState,
    engine: Option<Arc<dyn Engine>>,
    handle: Option<VectorHandle>,
    mode: Option<Mode>,
}

impl Vector {
    pub fn new() -> Self {
        Vector { state: HandleState::Uninitialized, engine: None, handle: None, mode: None }
    }

    /// Resolve `descriptor` and allocate the internal vector handle scoped
    /// to `resources`.
    pub fn create(&mut self, resources: &Resources, descriptor: &str) -> Result<(), AmgError> {
        self.state.require_uninitialized("vector already created")?;
        let mode = Mode::resolve(descriptor)?;
        let (engine, res_handle) = resources.parts()?;
        let handle = engine.vector_create(res_handle, mode)?;
        log::debug!("vector {} created with mode {mode}", handle.0);
        self.engine = Some(Arc::clone(engine));
        self.handle = Some(handle);
        self.mode = Some(mode);
        self.state = HandleState::Active;
        Ok(())
    }

    /// Upload `n` block entries of `block_dim` values each.
    pub fn upload(&mut self, data: &[f64], n: usize, block_dim: usize) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        if block_dim == 0 || data.len() != n * block_dim {
            return Err(AmgError::ShapeMismatch { expected: n * block_dim, actual: data.len() });
        }
        engine.vector_upload(handle, n, block_dim, data)?;
        Ok(())
    }

    /// Resize to `n` block entries and zero-fill.
    pub fn set_zero(&mut self, n: usize, block_dim: usize) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        engine.vector_set_zero(handle, n, block_dim)?;
        Ok(())
    }

    /// Copy the vector back into host memory.
    pub fn download(&self, out: &mut Vec<f64>) -> Result<(), AmgError> {
        let (engine, handle) = self.parts()?;
        engine.vector_download(handle, out)?;
        Ok(())
    }

    /// `(n, block_dim)` as last established by upload or set_zero.
    pub fn get_size(&self) -> Result<(usize, usize), AmgError> {
        let (engine, handle) = self.parts()?;
        Ok(engine.vector_size(handle)?)
    }

    /// The mode this vector was created against.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub(crate) fn parts(&self) -> Result<(&Arc<dyn Engine>, VectorHandle), AmgError> {
        match (&self.engine, self.handle) {
            (Some(engine), Some(handle)) if self.state == HandleState::Active => {
                Ok((engine, handle))
            }
            _ => Err(AmgError::InvalidState("vector not active")),
        }
    }

    pub fn destroy(&mut self) -> Result<(), AmgError> {
        self.state.require_active("vector not active")?;
        let (engine, handle) = self.parts()?;
        engine.vector_destroy(handle)?;
        log::debug!("vector {} destroyed", handle.0);
        self.state = HandleState::Destroyed;
        Ok(())
    }
}

impl Default for Vector {
    fn default() -> Self {
        Vector::new()
    }
}

impl Drop for Vector {
    fn drop(&mut self) {
        if self.state == HandleState::Active {
            log::warn!("vector dropped while active, releasing handle");
            if let (Some(engine), Some(handle)) = (&self.engine, self.handle) {
                let _ = engine.vector_destroy(handle);
            }
        }
    }
}
