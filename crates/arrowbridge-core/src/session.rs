//! Open/Closed state shared by reader and writer sessions.

use crate::error::{BridgeError, Result};

/// A session is open until it is closed; there is no unopened value, since
/// opening is construction.
pub(crate) enum SessionState<H> {
    Open(H),
    Closed,
}

impl<H> SessionState<H> {
    /// The handle, or an invalid-state error naming the rejected operation.
    pub(crate) fn open_handle(&self, operation: &str) -> Result<&H> {
        match self {
            SessionState::Open(handle) => Ok(handle),
            SessionState::Closed => Err(BridgeError::invalid_state(format!(
                "{operation} on a closed session"
            ))),
        }
    }

    /// Transition to Closed, yielding the handle on the first call only.
    pub(crate) fn take(&mut self) -> Option<H> {
        match std::mem::replace(self, SessionState::Closed) {
            SessionState::Open(handle) => Some(handle),
            SessionState::Closed => None,
        }
    }
}
