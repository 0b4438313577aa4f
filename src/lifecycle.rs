//! Lifecycle state tag shared by every handle-owning wrapper.
//!
//! Each wrapper moves strictly through `Uninitialized -> Active ->
//! Destroyed`. The tag is checked on every call, turning call-order mistakes
//! (double create, use after destroy, destroy before create) into typed
//! [`AmgError::InvalidState`] failures instead of engine-side undefined
//! behavior.

use crate::error::AmgError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Uninitialized,
    Active,
    Destroyed,
}

impl HandleState {
    pub(crate) fn require_uninitialized(self, msg: &'static str) -> Result<(), AmgError> {
        if self == HandleState::Uninitialized {
            Ok(())
        } else {
            Err(AmgError::InvalidState(msg))
        }
    }

    pub(crate) fn require_active(self, msg: &'static str) -> Result<(), AmgError> {
        if self == HandleState::Active {
            Ok(())
        } else {
            Err(AmgError::InvalidState(msg))
        }
    }
}
