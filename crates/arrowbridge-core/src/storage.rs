//! Shared storage connections.
//!
//! One open filesystem connection can serve several reader sessions. The
//! native handle is reference-counted independently of any single session
//! and closed when the last clone drops.

use std::sync::Arc;

use crate::engine::{NativeEngine, StorageHandle};
use crate::error::Result;
use crate::runtime;

/// A cloneable handle to engine-side storage state.
#[derive(Clone)]
pub struct StorageConnection {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    engine: Arc<dyn NativeEngine>,
    handle: Option<StorageHandle>,
    uri: String,
}

impl StorageConnection {
    /// Connect through the process-wide engine.
    pub fn connect(uri: &str) -> Result<Self> {
        Self::connect_with(runtime::engine()?, uri)
    }

    /// Connect through an explicit engine.
    pub fn connect_with(engine: Arc<dyn NativeEngine>, uri: &str) -> Result<Self> {
        let handle = engine.open_storage(uri)?;
        log::debug!("opened storage connection to {uri}");
        Ok(StorageConnection {
            inner: Arc::new(StorageInner {
                engine,
                handle: Some(handle),
                uri: uri.to_string(),
            }),
        })
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub(crate) fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.inner.engine
    }

    pub(crate) fn handle(&self) -> &StorageHandle {
        // Present from construction until StorageInner::drop.
        self.inner.handle.as_ref().expect("open storage connection")
    }
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.engine.close_storage(handle) {
                log::warn!("closing storage connection to {} failed: {err}", self.uri);
            }
        }
    }
}
