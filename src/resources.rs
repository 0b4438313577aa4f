//! Compute-context binding: devices, communicator, configuration.
//!
//! [`Resources`] owns the engine's compute-context handle. It binds a set of
//! local device indices and, for multi-process runs, the identity of a
//! distributed communicator. Every matrix, vector, and solver is created
//! against exactly one Resources and must be destroyed before it.
//!
//! Exactly one `create` (or `create_simple`) and exactly one `destroy` per
//! instance; anything else is `InvalidState`.

use std::sync::Arc;

use crate::config::Config;
use crate::engine::{CommBinding, Engine, ResourcesHandle};
use crate::error::AmgError;
use crate::lifecycle::HandleState;
use crate::parallel::Comm;

pub struct Resources {
    state: HandleState,
    engine: Option<Arc<dyn Engine>>,
    handle: Option<ResourcesHandle>,
    comm: Option<CommBinding>,
}

impl Resources {
    /// A compute context in the not-created state.
    pub fn new() -> Self {
        Resources { state: HandleState::Uninitialized, engine: None, handle: None, comm: None }
    }

    /// Bind `device_ids` and, when `comm` is given, the distributed process
    /// group described by it. The config must be active and outlive this
    /// instance. Engine-side failures (bad device id, communicator
    /// mismatch) surface as [`AmgError::Engine`].
    pub fn create(
        &mut self,
        config: &Config,
        comm: Option<&dyn Comm>,
        device_ids: &[u32],
    ) -> Result<(), AmgError> {
        self.state.require_uninitialized("resources already created")?;
        let (engine, cfg_handle) = config.parts()?;
        let binding = comm.map(|c| CommBinding { rank: c.rank(), size: c.size() });
        let handle = engine.resources_create(cfg_handle, binding, device_ids)?;
        log::info!(
            "resources {} created on {} device(s), rank {}/{}",
            handle.0,
            device_ids.len(),
            binding.map_or(0, |b| b.rank),
            binding.map_or(1, |b| b.size),
        );
        self.engine = Some(Arc::clone(engine));
        self.handle = Some(handle);
        self.comm = binding;
        self.state = HandleState::Active;
        Ok(())
    }

    /// Single-process convenience path: no communicator, default device.
    pub fn create_simple(&mut self, config: &Config) -> Result<(), AmgError> {
        self.create(config, None, &[0])
    }

    /// Release the compute context. Every matrix, vector, and solver built
    /// from it must already be destroyed.
    pub fn destroy(&mut self) -> Result<(), AmgError> {
        self.state.require_active("resources not active")?;
        let (engine, handle) = self.parts()?;
        engine.resources_destroy(handle)?;
        log::info!("resources {} destroyed", handle.0);
        self.state = HandleState::Destroyed;
        Ok(())
    }

    /// Communicator identity captured at creation, if any.
    pub fn comm_binding(&self) -> Option<CommBinding> {
        self.comm
    }

    pub(crate) fn parts(&self) -> Result<(&Arc<dyn Engine>, ResourcesHandle), AmgError> {
        match (&self.engine, self.handle) {
            (Some(engine), Some(handle)) if self.state == HandleState::Active => {
                Ok((engine, handle))
            }
            _ => Err(AmgError::InvalidState("resources not active")),
        }
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources::new()
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        if self.state == HandleState::Active {
            log::warn!("resources dropped while active, releasing handle");
            if let (Some(engine), Some(handle)) = (&self.engine, self.handle) {
                let _ = engine.resources_destroy(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ReferenceEngine;
    use crate::parallel::SerialComm;

    fn active_config(engine: &Arc<dyn Engine>) -> Config {
        let mut cfg = Config::new();
        cfg.create(engine, "").unwrap();
        cfg
    }

    #[test]
    fn create_simple_lifecycle() {
        let engine: Arc<dyn Engine> = ReferenceEngine::shared();
        let mut cfg = active_config(&engine);
        let mut res = Resources::new();
        res.create_simple(&cfg).unwrap();
        assert_eq!(res.comm_binding(), None);
        res.destroy().unwrap();
        cfg.destroy().unwrap();
    }

    #[test]
    fn create_with_communicator_snapshots_identity() {
        let engine: Arc<dyn Engine> = ReferenceEngine::shared();
        let mut cfg = active_config(&engine);
        let mut res = Resources::new();
        res.create(&cfg, Some(&SerialComm), &[0]).unwrap();
        assert_eq!(res.comm_binding(), Some(CommBinding { rank: 0, size: 1 }));
        res.destroy().unwrap();
        cfg.destroy().unwrap();
    }

    #[test]
    fn duplicate_device_ids_rejected_by_engine() {
        let engine: Arc<dyn Engine> = ReferenceEngine::shared();
        let mut cfg = active_config(&engine);
        let mut res = Resources::new();
        let err = res.create(&cfg, None, &[0, 0]).unwrap_err();
        assert!(matches!(err, AmgError::Engine { .. }));
        // Failed create leaves the wrapper not-created.
        assert!(matches!(res.destroy(), Err(AmgError::InvalidState(_))));
        cfg.destroy().unwrap();
    }

    #[test]
    fn create_requires_active_config() {
        let mut res = Resources::new();
        let cfg = Config::new();
        assert!(matches!(res.create_simple(&cfg), Err(AmgError::InvalidState(_))));
    }

    #[test]
    fn double_destroy_fails_both_times() {
        let engine: Arc<dyn Engine> = ReferenceEngine::shared();
        let mut cfg = active_config(&engine);
        let mut res = Resources::new();
        res.create_simple(&cfg).unwrap();
        res.destroy().unwrap();
        assert!(matches!(res.destroy(), Err(AmgError::InvalidState(_))));
        assert!(matches!(res.destroy(), Err(AmgError::InvalidState(_))));
        cfg.destroy().unwrap();
    }
}
