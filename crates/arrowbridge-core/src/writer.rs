//! Writer sessions: a schema committed once, then a sequence of batches.

use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;

use crate::batch::Batch;
use crate::engine::{NativeEngine, WriterHandle};
use crate::error::Result;
use crate::layout;
use crate::runtime;
use crate::schema::encode_schema;
use crate::session::SessionState;

/// A writer session over one destination.
///
/// The schema is serialized once at open and cannot change afterwards.
/// Batches handed to the session stay owned by the caller: the engine
/// consumes their buffers synchronously, before `write_next` returns.
pub struct WriterSession {
    engine: Arc<dyn NativeEngine>,
    state: SessionState<WriterHandle>,
    schema: SchemaRef,
    destination: String,
    rows_written: u64,
}

impl WriterSession {
    /// Open through the process-wide engine.
    pub fn open(destination: &str, schema: SchemaRef) -> Result<Self> {
        Self::open_with(runtime::engine()?, destination, schema)
    }

    /// Open through an explicit engine.
    pub fn open_with(
        engine: Arc<dyn NativeEngine>,
        destination: &str,
        schema: SchemaRef,
    ) -> Result<Self> {
        let message = encode_schema(&schema)?;
        let handle = engine.open_writer(destination, &message)?;
        log::debug!("opened writer session on {destination}");
        Ok(WriterSession {
            engine,
            state: SessionState::Open(handle),
            schema,
            destination: destination.to_string(),
            rows_written: 0,
        })
    }

    /// The schema this session was opened with.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Persist one batch from the managed container.
    ///
    /// The batch is decomposed into parallel address/size arrays in column
    /// layout order and handed to the engine together with its row count.
    pub fn write_next(&mut self, batch: &RecordBatch) -> Result<()> {
        let handle = self.state.open_handle("write_next")?;
        // The clones in `buffers` pin the batch memory for the duration of
        // the engine call.
        let buffers = layout::flatten_record_batch(batch)?;
        let addresses: Vec<u64> = buffers.iter().map(|b| b.as_ptr() as u64).collect();
        let sizes: Vec<u64> = buffers.iter().map(|b| b.len() as u64).collect();
        self.engine
            .write_next(handle, batch.num_rows(), &addresses, &sizes)?;
        self.rows_written += batch.num_rows() as u64;
        Ok(())
    }

    /// Persist a batch still backed by engine-owned buffers, without
    /// reassembling it first. The caller keeps ownership and releases the
    /// batch afterwards as usual.
    pub fn write_materialized(&mut self, batch: &Batch) -> Result<()> {
        let handle = self.state.open_handle("write_next")?;
        let addresses = batch.buffer_addresses();
        let sizes = batch.buffer_sizes();
        self.engine
            .write_next(handle, batch.row_count(), &addresses, &sizes)?;
        self.rows_written += batch.row_count() as u64;
        Ok(())
    }

    /// Total rows handed to the engine so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and release the native writer. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.state.take() {
            self.engine.close_writer(handle)?;
            log::debug!("closed writer session on {}", self.destination);
        }
        Ok(())
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("closing writer session on {} failed: {err}", self.destination);
        }
    }
}
