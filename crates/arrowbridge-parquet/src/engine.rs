//! The parquet-rs engine behind the native boundary.

use std::collections::HashMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arrow_array::{RecordBatch, RecordBatchReader};
use arrow_buffer::Buffer;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::Compression;
use parquet::file::metadata::ParquetMetaData;
use parquet::file::properties::WriterProperties;

use arrowbridge_core::schema::{decode_schema, encode_schema};
use arrowbridge_core::{
    layout, BatchDescriptor, BridgeError, BufferOwnerId, FieldNode, NativeEngine, ReaderHandle,
    Result, Selection, StorageHandle, WriterHandle,
};

use crate::ledger::BufferLedger;

/// Reference engine: does the Parquet file work in-process, over the local
/// filesystem.
///
/// Session state is keyed by handle id; one engine serves any number of
/// concurrent sessions, each independently locked.
#[derive(Default)]
pub struct ParquetFileEngine {
    readers: Mutex<HashMap<u64, ReaderState>>,
    writers: Mutex<HashMap<u64, WriterState>>,
    storages: Mutex<HashMap<u64, PathBuf>>,
    ledger: BufferLedger,
    next_handle: AtomicU64,
}

struct ReaderState {
    reader: ParquetRecordBatchReader,
    schema: SchemaRef,
}

struct WriterState {
    writer: ArrowWriter<File>,
    schema: SchemaRef,
}

impl ParquetFileEngine {
    pub fn new() -> Self {
        ParquetFileEngine::default()
    }

    /// Allocations currently on loan to the bridge.
    pub fn retained_buffer_count(&self) -> usize {
        self.ledger.len()
    }

    fn next_id(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn resolve(&self, storage: Option<&StorageHandle>, path: &str) -> Result<PathBuf> {
        match storage {
            None => Ok(PathBuf::from(path)),
            Some(handle) => {
                let storages = self.storages.lock().unwrap();
                let root = storages.get(&handle.raw()).ok_or_else(|| {
                    BridgeError::invalid_state(format!("unknown storage handle {}", handle.raw()))
                })?;
                Ok(root.join(path))
            }
        }
    }

    /// Decompose one arrow batch into a descriptor, pinning every buffer in
    /// the ledger until the bridge releases it.
    fn describe_batch(&self, batch: &RecordBatch) -> Result<BatchDescriptor> {
        let flat = layout::flatten_record_batch(batch)?;
        let mut descriptor = BatchDescriptor::new(batch.num_rows() as u64);
        for column in batch.columns() {
            descriptor.nodes.push(FieldNode::new(
                column.len() as u64,
                column.null_count() as u64,
            ));
        }
        for buffer in flat {
            descriptor.buffers.push(self.ledger.register(buffer));
        }
        Ok(descriptor)
    }
}

impl NativeEngine for ParquetFileEngine {
    fn open_storage(&self, uri: &str) -> Result<StorageHandle> {
        let root = PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri));
        if !root.is_dir() {
            return Err(BridgeError::engine(format!(
                "storage root {} is not a directory",
                root.display()
            )));
        }
        let id = self.next_id();
        self.storages.lock().unwrap().insert(id, root);
        log::debug!("engine: opened storage {id} at {uri}");
        Ok(StorageHandle::new(id))
    }

    fn close_storage(&self, storage: StorageHandle) -> Result<()> {
        match self.storages.lock().unwrap().remove(&storage.raw()) {
            Some(_) => Ok(()),
            None => Err(BridgeError::invalid_state(format!(
                "unknown storage handle {}",
                storage.raw()
            ))),
        }
    }

    fn open_reader(
        &self,
        storage: Option<&StorageHandle>,
        path: &str,
        selection: &Selection,
    ) -> Result<ReaderHandle> {
        selection.validate()?;
        let resolved = self.resolve(storage, path)?;
        let file = File::open(&resolved).map_err(|e| {
            BridgeError::engine(format!("open {} failed: {e}", resolved.display()))
        })?;

        let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(engine_err)?
            .with_batch_size(selection.batch_size());

        match selection {
            Selection::RowGroupColumns {
                row_group_indices, ..
            } => {
                // An empty index list keeps every row group.
                if !row_group_indices.is_empty() {
                    builder = builder.with_row_groups(row_group_indices.clone());
                }
            }
            Selection::ColumnsByteRange {
                start_byte,
                end_byte,
                ..
            } => {
                let groups = row_groups_in_range(builder.metadata(), *start_byte, *end_byte);
                builder = builder.with_row_groups(groups);
            }
        }

        let column_indices = selection.column_indices();
        if !column_indices.is_empty() {
            let mask =
                ProjectionMask::roots(builder.parquet_schema(), column_indices.iter().copied());
            builder = builder.with_projection(mask);
        }

        let reader = builder.build().map_err(engine_err)?;
        let schema = reader.schema();
        let id = self.next_id();
        self.readers
            .lock()
            .unwrap()
            .insert(id, ReaderState { reader, schema });
        log::debug!("engine: opened reader {id} on {}", resolved.display());
        Ok(ReaderHandle::new(id))
    }

    fn close_reader(&self, reader: ReaderHandle) -> Result<()> {
        match self.readers.lock().unwrap().remove(&reader.raw()) {
            Some(_) => {
                log::debug!("engine: closed reader {}", reader.raw());
                Ok(())
            }
            None => Err(BridgeError::invalid_state(format!(
                "unknown reader handle {}",
                reader.raw()
            ))),
        }
    }

    fn schema_bytes(&self, reader: &ReaderHandle) -> Result<Bytes> {
        let readers = self.readers.lock().unwrap();
        let state = readers
            .get(&reader.raw())
            .ok_or_else(|| unknown_reader(reader))?;
        Ok(Bytes::from(encode_schema(&state.schema)?))
    }

    fn read_next(&self, reader: &ReaderHandle) -> Result<BatchDescriptor> {
        let mut readers = self.readers.lock().unwrap();
        let state = readers
            .get_mut(&reader.raw())
            .ok_or_else(|| unknown_reader(reader))?;
        match state.reader.next() {
            None => Ok(BatchDescriptor::end_of_stream()),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(batch)) => self.describe_batch(&batch),
        }
    }

    fn open_writer(&self, destination: &str, schema: &[u8]) -> Result<WriterHandle> {
        let schema = decode_schema(schema)?;
        let path = Path::new(destination);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)
            .map_err(|e| BridgeError::engine(format!("create {destination} failed: {e}")))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer =
            ArrowWriter::try_new(file, Arc::clone(&schema), Some(props)).map_err(engine_err)?;
        let id = self.next_id();
        self.writers
            .lock()
            .unwrap()
            .insert(id, WriterState { writer, schema });
        log::debug!("engine: opened writer {id} on {destination}");
        Ok(WriterHandle::new(id))
    }

    fn close_writer(&self, writer: WriterHandle) -> Result<()> {
        let state = self.writers.lock().unwrap().remove(&writer.raw());
        match state {
            Some(state) => {
                state.writer.close().map_err(engine_err)?;
                log::debug!("engine: closed writer {}", writer.raw());
                Ok(())
            }
            None => Err(BridgeError::invalid_state(format!(
                "unknown writer handle {}",
                writer.raw()
            ))),
        }
    }

    fn write_next(
        &self,
        writer: &WriterHandle,
        row_count: usize,
        addresses: &[u64],
        sizes: &[u64],
    ) -> Result<()> {
        if addresses.len() != sizes.len() {
            return Err(BridgeError::malformed_batch(format!(
                "{} addresses but {} sizes",
                addresses.len(),
                sizes.len()
            )));
        }
        let mut writers = self.writers.lock().unwrap();
        let state = writers.get_mut(&writer.raw()).ok_or_else(|| {
            BridgeError::invalid_state(format!("unknown writer handle {}", writer.raw()))
        })?;

        // Copy out of the caller's regions first; ownership of the originals
        // stays with the caller once this returns.
        let mut buffers = Vec::with_capacity(addresses.len());
        for (&address, &size) in addresses.iter().zip(sizes) {
            buffers.push(copy_region(address, size));
        }
        let batch = layout::assemble_record_batch(&state.schema, row_count, buffers, None)?;
        state.writer.write(&batch).map_err(engine_err)?;
        Ok(())
    }

    fn release_buffer(&self, owner: BufferOwnerId) {
        self.ledger.release(owner);
    }
}

/// Row groups whose starting byte offset falls inside `[start, end)`.
///
/// Offsets are cumulative `total_byte_size` sums, so disjoint ranges claim
/// disjoint row-group sets across parallel readers of one file.
fn row_groups_in_range(metadata: &ParquetMetaData, start: u64, end: u64) -> Vec<usize> {
    let mut selected = Vec::new();
    let mut position = 0u64;
    for (index, row_group) in metadata.row_groups().iter().enumerate() {
        if position >= start && position < end {
            selected.push(index);
        }
        position += row_group.total_byte_size() as u64;
    }
    selected
}

fn copy_region(address: u64, size: u64) -> Buffer {
    if size == 0 {
        return Buffer::from_vec(Vec::<u8>::new());
    }
    // Valid for the duration of the call, per the write_next contract.
    let region = unsafe { std::slice::from_raw_parts(address as *const u8, size as usize) };
    Buffer::from_vec(region.to_vec())
}

fn engine_err<E: Display>(error: E) -> BridgeError {
    BridgeError::engine(error.to_string())
}

fn unknown_reader(reader: &ReaderHandle) -> BridgeError {
    BridgeError::invalid_state(format!("unknown reader handle {}", reader.raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> Selection {
        Selection::RowGroupColumns {
            row_group_indices: vec![],
            column_indices: vec![],
            batch_size: 1024,
        }
    }

    #[test]
    fn test_open_reader_on_missing_file_fails() {
        let engine = ParquetFileEngine::new();
        let err = engine
            .open_reader(None, "/definitely/not/here.parquet", &selection())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Engine(_)));
    }

    #[test]
    fn test_unknown_handles_are_invalid_state() {
        let engine = ParquetFileEngine::new();
        assert!(matches!(
            engine.close_reader(ReaderHandle::new(99)),
            Err(BridgeError::InvalidState(_))
        ));
        assert!(matches!(
            engine.close_writer(WriterHandle::new(99)),
            Err(BridgeError::InvalidState(_))
        ));
        assert!(matches!(
            engine.close_storage(StorageHandle::new(99)),
            Err(BridgeError::InvalidState(_))
        ));
    }

    #[test]
    fn test_open_storage_requires_a_directory() {
        let engine = ParquetFileEngine::new();
        assert!(matches!(
            engine.open_storage("/definitely/not/here"),
            Err(BridgeError::Engine(_))
        ));
    }

    #[test]
    fn test_release_of_unknown_buffer_is_tolerated() {
        let engine = ParquetFileEngine::new();
        engine.release_buffer(BufferOwnerId::new(1234));
        assert_eq!(engine.retained_buffer_count(), 0);
    }
}
