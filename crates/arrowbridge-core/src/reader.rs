//! Reader sessions: one forward-only cursor over one file.

use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;

use crate::batch::{Batch, BatchMaterializer};
use crate::engine::{NativeEngine, ReaderHandle, Selection, SelectionMode};
use crate::error::Result;
use crate::runtime;
use crate::schema::decode_schema;
use crate::session::SessionState;
use crate::storage::StorageConnection;

/// A reader session over one file, pulling batches in the order the engine
/// produces them.
///
/// A session is not internally synchronized; calls on one session must be
/// serialized by the caller. Independent sessions over the same file, each
/// with its own selection, are the intended way to scale a scan out.
pub struct ReaderSession {
    engine: Arc<dyn NativeEngine>,
    state: SessionState<ReaderHandle>,
    mode: SelectionMode,
    materializer: BatchMaterializer,
    path: String,
    schema: Option<SchemaRef>,
    exhausted: bool,
    last_row_count: usize,
    _storage: Option<StorageConnection>,
}

impl ReaderSession {
    /// Open through the process-wide engine.
    pub fn open(path: &str, selection: Selection) -> Result<Self> {
        Self::open_with(runtime::engine()?, path, selection)
    }

    /// Open through an explicit engine.
    pub fn open_with(
        engine: Arc<dyn NativeEngine>,
        path: &str,
        selection: Selection,
    ) -> Result<Self> {
        Self::open_inner(engine, None, path, selection)
    }

    /// Open over a shared storage connection. The connection stays alive at
    /// least as long as this session.
    pub fn open_on(
        storage: &StorageConnection,
        path: &str,
        selection: Selection,
    ) -> Result<Self> {
        Self::open_inner(
            Arc::clone(storage.engine()),
            Some(storage.clone()),
            path,
            selection,
        )
    }

    fn open_inner(
        engine: Arc<dyn NativeEngine>,
        storage: Option<StorageConnection>,
        path: &str,
        selection: Selection,
    ) -> Result<Self> {
        selection.validate()?;
        let handle = engine.open_reader(
            storage.as_ref().map(|s| s.handle()),
            path,
            &selection,
        )?;
        log::debug!("opened reader session on {path}");
        Ok(ReaderSession {
            materializer: BatchMaterializer::new(Arc::clone(&engine)),
            engine,
            state: SessionState::Open(handle),
            mode: selection.mode(),
            path: path.to_string(),
            schema: None,
            exhausted: false,
            last_row_count: 0,
            _storage: storage,
        })
    }

    /// The session schema, decoded from the engine's message exactly once
    /// and cached for the life of the session.
    pub fn schema(&mut self) -> Result<SchemaRef> {
        if let Some(schema) = &self.schema {
            return Ok(Arc::clone(schema));
        }
        let handle = self.state.open_handle("schema")?;
        let message = self.engine.schema_bytes(handle)?;
        let schema = decode_schema(&message)?;
        self.schema = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Pull the next batch.
    ///
    /// Returns `None` once the engine reports exhaustion, and keeps
    /// returning `None` on every call after that without going back to the
    /// engine.
    pub fn read_next(&mut self) -> Result<Option<Batch>> {
        let handle = self.state.open_handle("read_next")?;
        if self.exhausted {
            return Ok(None);
        }
        let descriptor = self.engine.read_next(handle)?;
        match self.materializer.materialize(descriptor)? {
            Some(batch) => {
                self.last_row_count = batch.row_count();
                Ok(Some(batch))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// [`ReaderSession::read_next`], loaded into the managed container.
    pub fn read_next_record_batch(&mut self) -> Result<Option<RecordBatch>> {
        let schema = self.schema()?;
        match self.read_next()? {
            Some(batch) => Ok(Some(batch.to_record_batch(&schema)?)),
            None => Ok(None),
        }
    }

    /// Rows in the most recent non-empty batch.
    pub fn last_row_count(&self) -> usize {
        self.last_row_count
    }

    /// The request shape this session was opened with.
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Release the native session. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.state.take() {
            self.engine.close_reader(handle)?;
            log::debug!("closed reader session on {}", self.path);
        }
        Ok(())
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("closing reader session on {} failed: {err}", self.path);
        }
    }
}
