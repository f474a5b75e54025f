//! Test doubles for exercising the bridge without a real engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use arrow_schema::{DataType, Field, Schema};
use bytes::Bytes;

use crate::batch::BatchDescriptor;
use crate::buffer::{BufferDescriptor, BufferOwnerId};
use crate::engine::{NativeEngine, ReaderHandle, Selection, StorageHandle, WriterHandle};
use crate::error::{BridgeError, Result};
use crate::schema::{decode_schema, encode_schema};

/// A single-column schema most stub-driven tests share.
pub fn test_schema() -> Schema {
    Schema::new(vec![Field::new("n", DataType::Int64, true)])
}

/// Engine double: serves scripted descriptors over heap allocations it keeps
/// alive until released, and counts every boundary call.
#[derive(Default)]
pub struct StubEngine {
    allocations: Mutex<HashMap<u64, Vec<u8>>>,
    next_id: AtomicU64,
    schema_message: Mutex<Option<Bytes>>,
    scripted: Mutex<Vec<BatchDescriptor>>,
    reads: AtomicUsize,
    schema_fetches: AtomicUsize,
    reader_closes: AtomicUsize,
    writer_closes: AtomicUsize,
    storage_closes: AtomicUsize,
    releases: AtomicUsize,
    writes: Mutex<Vec<usize>>,
}

impl StubEngine {
    pub fn new() -> Self {
        StubEngine::default()
    }

    /// Script the schema message served to reader sessions.
    pub fn with_schema(self, schema: &Schema) -> Self {
        let message = encode_schema(schema).expect("encodable test schema");
        *self.schema_message.lock().unwrap() = Some(Bytes::from(message));
        self
    }

    /// Pin `bytes` as a fake native allocation and describe it.
    pub fn register(&self, bytes: Vec<u8>) -> BufferDescriptor {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let descriptor = BufferDescriptor {
            owner: BufferOwnerId::new(id),
            address: bytes.as_ptr() as u64,
            size: bytes.len() as u64,
        };
        self.allocations.lock().unwrap().insert(id, bytes);
        descriptor
    }

    /// Queue a descriptor for `read_next`; once the queue drains, the stub
    /// serves the end-of-stream sentinel.
    pub fn push_batch(&self, descriptor: BatchDescriptor) {
        self.scripted.lock().unwrap().push(descriptor);
    }

    pub fn live_allocations(&self) -> usize {
        self.allocations.lock().unwrap().len()
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn schema_fetches(&self) -> usize {
        self.schema_fetches.load(Ordering::Relaxed)
    }

    pub fn reader_closes(&self) -> usize {
        self.reader_closes.load(Ordering::Relaxed)
    }

    pub fn writer_closes(&self) -> usize {
        self.writer_closes.load(Ordering::Relaxed)
    }

    pub fn storage_closes(&self) -> usize {
        self.storage_closes.load(Ordering::Relaxed)
    }

    /// Row counts handed to `write_next`, in order.
    pub fn recorded_writes(&self) -> Vec<usize> {
        self.writes.lock().unwrap().clone()
    }
}

impl NativeEngine for StubEngine {
    fn open_storage(&self, _uri: &str) -> Result<StorageHandle> {
        Ok(StorageHandle::new(7))
    }

    fn close_storage(&self, _storage: StorageHandle) -> Result<()> {
        self.storage_closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn open_reader(
        &self,
        _storage: Option<&StorageHandle>,
        _path: &str,
        _selection: &Selection,
    ) -> Result<ReaderHandle> {
        Ok(ReaderHandle::new(1))
    }

    fn close_reader(&self, _reader: ReaderHandle) -> Result<()> {
        self.reader_closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn schema_bytes(&self, _reader: &ReaderHandle) -> Result<Bytes> {
        self.schema_fetches.fetch_add(1, Ordering::Relaxed);
        self.schema_message
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BridgeError::schema("no schema scripted"))
    }

    fn read_next(&self, _reader: &ReaderHandle) -> Result<BatchDescriptor> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut scripted = self.scripted.lock().unwrap();
        if scripted.is_empty() {
            Ok(BatchDescriptor::end_of_stream())
        } else {
            Ok(scripted.remove(0))
        }
    }

    fn open_writer(&self, _destination: &str, schema: &[u8]) -> Result<WriterHandle> {
        decode_schema(schema)?;
        Ok(WriterHandle::new(1))
    }

    fn close_writer(&self, _writer: WriterHandle) -> Result<()> {
        self.writer_closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_next(
        &self,
        _writer: &WriterHandle,
        row_count: usize,
        addresses: &[u64],
        sizes: &[u64],
    ) -> Result<()> {
        if addresses.len() != sizes.len() {
            return Err(BridgeError::malformed_batch(
                "address and size arrays differ in length",
            ));
        }
        self.writes.lock().unwrap().push(row_count);
        Ok(())
    }

    fn release_buffer(&self, owner: BufferOwnerId) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.allocations.lock().unwrap().remove(&owner.raw());
    }
}
