//! Process-wide engine installation.
//!
//! Installation is explicit, happens at most once, and later attempts are
//! reported rather than silently swapping engines out from under open
//! sessions. Sessions opened without an explicit engine go through here.

use std::sync::{Arc, OnceLock};

use crate::engine::NativeEngine;
use crate::error::{BridgeError, Result};

static ENGINE: OnceLock<Arc<dyn NativeEngine>> = OnceLock::new();

/// Install the process-wide engine.
///
/// Returns `false` when an engine was already installed; the first
/// installation wins and stays.
pub fn install(engine: Arc<dyn NativeEngine>) -> bool {
    ENGINE.set(engine).is_ok()
}

/// Whether an engine has been installed.
pub fn is_installed() -> bool {
    ENGINE.get().is_some()
}

/// The installed engine.
pub fn engine() -> Result<Arc<dyn NativeEngine>> {
    ENGINE
        .get()
        .cloned()
        .ok_or_else(|| BridgeError::invalid_state("no native engine installed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubEngine;

    // One test owns the whole global, since installation is permanent.
    #[test]
    fn test_install_is_one_time_and_guarded() {
        if is_installed() {
            // Another test binary state; nothing to verify here.
            return;
        }
        assert!(matches!(engine(), Err(BridgeError::InvalidState(_))));

        let first: Arc<dyn NativeEngine> = Arc::new(StubEngine::new());
        assert!(install(first));
        assert!(is_installed());
        assert!(engine().is_ok());

        let second: Arc<dyn NativeEngine> = Arc::new(StubEngine::new());
        assert!(!install(second));
    }
}
