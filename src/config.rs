//! Parsed-configuration handle ownership.
//!
//! A [`Config`] owns one engine configuration handle, created from an
//! options string or a file. It is a two-phase lifecycle object: construct
//! with [`Config::new`], then call exactly one of the create methods, then
//! exactly one [`Config::destroy`]. A Config must outlive every Resources
//! created from it; the engine refuses out-of-order destruction.

use std::path::Path;
use std::sync::Arc;

use crate::engine::{ConfigHandle, Engine};
use crate::error::AmgError;
use crate::lifecycle::HandleState;

pub struct Config {
    state: HandleState,
    engine: Option<Arc<dyn Engine>>,
    handle: Option<ConfigHandle>,
}

impl Config {
    /// A configuration in the not-created state.
    pub fn new() -> Self {
        Config { state: HandleState::Uninitialized, engine: None, handle: None }
    }

    /// Parse an options string into an engine configuration handle.
    pub fn create(&mut self, engine: &Arc<dyn Engine>, options: &str) -> Result<(), AmgError> {
        self.state.require_uninitialized("config already created")?;
        let handle = engine.config_create(options)?;
        log::debug!("config {} created", handle.0);
        self.engine = Some(Arc::clone(engine));
        self.handle = Some(handle);
        self.state = HandleState::Active;
        Ok(())
    }

    /// Read and parse a configuration file.
    pub fn create_from_file(
        &mut self,
        engine: &Arc<dyn Engine>,
        path: impl AsRef<Path>,
    ) -> Result<(), AmgError> {
        self.state.require_uninitialized("config already created")?;
        let handle = engine.config_create_from_file(path.as_ref())?;
        log::debug!("config {} created from {}", handle.0, path.as_ref().display());
        self.engine = Some(Arc::clone(engine));
        self.handle = Some(handle);
        self.state = HandleState::Active;
        Ok(())
    }

    /// Release the configuration handle. Fails with `InvalidState` before a
    /// successful create or on a second call.
    pub fn destroy(&mut self) -> Result<(), AmgError> {
        self.state.require_active("config not active")?;
        let (engine, handle) = self.parts()?;
        engine.config_destroy(handle)?;
        log::debug!("config {} destroyed", handle.0);
        self.state = HandleState::Destroyed;
        Ok(())
    }

    pub(crate) fn parts(&self) -> Result<(&Arc<dyn Engine>, ConfigHandle), AmgError> {
        match (&self.engine, self.handle) {
            (Some(engine), Some(handle)) if self.state == HandleState::Active => {
                Ok((engine, handle))
            }
            _ => Err(AmgError::InvalidState("config not active")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        if self.state == HandleState::Active {
            log::warn!("config dropped while active, releasing handle");
            if let (Some(engine), Some(handle)) = (&self.engine, self.handle) {
                let _ = engine.config_destroy(handle);
            }
        }
    }
}
